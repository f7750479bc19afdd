//! Workflow controller: owns the try-on state and sequences the flow.
//!
//! Four events drive the state: select an image, clear an image, generate,
//! and reset. Generation is split in two halves ([`begin_generation`] and
//! [`complete_generation`]) joined by a [`GenerationTicket`]. A reset bumps
//! the attempt counter, so a response that arrives for an older ticket is
//! dropped instead of overwriting the fresh state.
//!
//! [`begin_generation`]: WorkflowController::begin_generation
//! [`complete_generation`]: WorkflowController::complete_generation

use crate::client::{TryOnGenerator, TryOnGeneratorExt};
use crate::error::{Result, TryOnError};
use crate::gate::{ConnectionGate, ConnectionStatus};
use crate::image::{decode_data_uri, EncodedImage, ImageSlot};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Filename used when saving the result into a directory.
pub const DOWNLOAD_FILE_NAME: &str = "saree-try-on.png";

/// UI-facing state of a try-on session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowState {
    /// Photo of the person.
    pub human_image: Option<EncodedImage>,
    /// Photo of the saree.
    pub garment_image: Option<EncodedImage>,
    /// Generated image as a `data:` URI.
    pub result_image: Option<String>,
    /// True while a generation is in flight.
    pub is_generating: bool,
    /// Last user-visible error message.
    pub last_error: Option<String>,
}

impl WorkflowState {
    /// Returns the image in `slot`.
    pub fn image(&self, slot: ImageSlot) -> Option<&EncodedImage> {
        match slot {
            ImageSlot::Human => self.human_image.as_ref(),
            ImageSlot::Garment => self.garment_image.as_ref(),
        }
    }

    fn slot_mut(&mut self, slot: ImageSlot) -> &mut Option<EncodedImage> {
        match slot {
            ImageSlot::Human => &mut self.human_image,
            ImageSlot::Garment => &mut self.garment_image,
        }
    }

    /// Returns true when both images are present and nothing is in flight.
    pub fn can_generate(&self) -> bool {
        self.human_image.is_some() && self.garment_image.is_some() && !self.is_generating
    }
}

/// Handle for one generation attempt.
#[derive(Debug, Clone)]
#[must_use = "a ticket must be passed to complete_generation"]
pub struct GenerationTicket {
    id: u64,
    subject: EncodedImage,
    garment: EncodedImage,
}

impl GenerationTicket {
    /// Person image captured when the attempt started.
    pub fn subject(&self) -> &EncodedImage {
        &self.subject
    }

    /// Garment image captured when the attempt started.
    pub fn garment(&self) -> &EncodedImage {
        &self.garment
    }
}

/// What a call to [`WorkflowController::generate`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// Nothing happened: an image is missing or a generation is in flight.
    Skipped,
    /// No credential; the connect flow ran instead. Generate again to proceed.
    ConnectRequired,
    /// The result image (a `data:` URI).
    Completed(String),
    /// The user-visible error message.
    Failed(String),
    /// The response belonged to an attempt superseded by a reset.
    Stale,
}

/// Drives a try-on session.
pub struct WorkflowController {
    state: WorkflowState,
    gate: ConnectionGate,
    generator: Arc<dyn TryOnGenerator>,
    max_retries: u32,
    attempt: u64,
    reprompted: bool,
}

impl WorkflowController {
    /// Creates a controller with empty state.
    pub fn new(gate: ConnectionGate, generator: Arc<dyn TryOnGenerator>) -> Self {
        Self {
            state: WorkflowState::default(),
            gate,
            generator,
            max_retries: 0,
            attempt: 0,
            reprompted: false,
        }
    }

    /// Retries transient remote failures up to `max_retries` times.
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Current state.
    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Current gate status.
    pub fn status(&self) -> ConnectionStatus {
        self.gate.status()
    }

    /// The connection gate.
    pub fn gate(&self) -> &ConnectionGate {
        &self.gate
    }

    /// The generator backing this session.
    pub fn generator(&self) -> &dyn TryOnGenerator {
        self.generator.as_ref()
    }

    /// Resolves the startup connection status.
    pub async fn initialize(&mut self) -> ConnectionStatus {
        self.gate.initialize().await
    }

    /// Runs the credential selection flow, recording failures.
    pub async fn connect(&mut self) -> Result<()> {
        match self.gate.connect().await {
            Ok(()) => {
                self.state.last_error = None;
                Ok(())
            }
            Err(e) => {
                self.state.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Reads `path` into `slot`.
    ///
    /// On failure the error is recorded and the slot keeps its old image.
    pub async fn select_image(&mut self, slot: ImageSlot, path: impl AsRef<Path>) -> Result<()> {
        match EncodedImage::from_path(path).await {
            Ok(image) => {
                self.set_image(slot, image);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%slot, error = %e, "image selection failed");
                self.state.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Stores an already-encoded image into `slot`.
    pub fn set_image(&mut self, slot: ImageSlot, image: EncodedImage) {
        *self.state.slot_mut(slot) = Some(image);
        self.state.last_error = None;
    }

    /// Empties `slot`.
    pub fn clear_image(&mut self, slot: ImageSlot) {
        *self.state.slot_mut(slot) = None;
    }

    /// Returns to the empty initial state.
    ///
    /// Any in-flight attempt becomes stale.
    pub fn reset(&mut self) {
        self.state = WorkflowState::default();
        self.attempt += 1;
    }

    /// Starts an attempt: marks the state as generating and clears the
    /// previous result and error.
    ///
    /// Returns `None` when an image is missing or an attempt is already in
    /// flight. Does not consult the gate.
    pub fn begin_generation(&mut self) -> Option<GenerationTicket> {
        if !self.state.can_generate() {
            return None;
        }
        let subject = self.state.human_image.clone()?;
        let garment = self.state.garment_image.clone()?;

        self.attempt += 1;
        self.reprompted = false;
        self.state.is_generating = true;
        self.state.result_image = None;
        self.state.last_error = None;
        tracing::debug!(attempt = self.attempt, "generation started");

        Some(GenerationTicket {
            id: self.attempt,
            subject,
            garment,
        })
    }

    /// Applies the outcome of an attempt.
    ///
    /// Failures run the gate's auth re-check before the error is recorded.
    pub async fn complete_generation(
        &mut self,
        ticket: GenerationTicket,
        result: Result<String>,
    ) -> GenerateOutcome {
        if ticket.id != self.attempt || !self.state.is_generating {
            tracing::debug!(
                ticket = ticket.id,
                current = self.attempt,
                "discarding stale generation result"
            );
            return GenerateOutcome::Stale;
        }

        self.state.is_generating = false;
        match result {
            Ok(uri) => {
                self.state.result_image = Some(uri.clone());
                GenerateOutcome::Completed(uri)
            }
            Err(e) => {
                tracing::warn!(kind = %e.kind(), error = %e, "generation failed");
                self.reprompted = self.gate.handle_generation_failure(&e).await;
                let message = e.to_string();
                self.state.last_error = Some(message.clone());
                GenerateOutcome::Failed(message)
            }
        }
    }

    /// Runs a full generation.
    ///
    /// Without a credential, runs the connect flow instead and returns
    /// [`GenerateOutcome::ConnectRequired`]; the caller generates again once
    /// connected.
    pub async fn generate(&mut self) -> GenerateOutcome {
        if !self.state.can_generate() {
            return GenerateOutcome::Skipped;
        }

        if self.gate.requires_connect() {
            // Failure is already recorded in last_error
            let _ = self.connect().await;
            return GenerateOutcome::ConnectRequired;
        }

        let Some(ticket) = self.begin_generation() else {
            return GenerateOutcome::Skipped;
        };

        let generator = Arc::clone(&self.generator);
        let result = if self.max_retries > 0 {
            generator
                .generate_with_retries(ticket.subject(), ticket.garment(), self.max_retries)
                .await
        } else {
            generator.generate(ticket.subject(), ticket.garment()).await
        };

        self.complete_generation(ticket, result).await
    }

    /// Returns true when `outcome` was cut short by the credential flow and
    /// that flow left the gate `Connected`, so one more generate can succeed.
    ///
    /// Covers a connect before the first attempt and a re-prompt after a
    /// rejected key.
    pub fn should_regenerate(&self, outcome: &GenerateOutcome) -> bool {
        if !self.gate.is_connected() {
            return false;
        }
        match outcome {
            GenerateOutcome::ConnectRequired => true,
            GenerateOutcome::Failed(_) => self.reprompted,
            _ => false,
        }
    }

    /// Writes the result image to `path`.
    ///
    /// If `path` is a directory, the file is named [`DOWNLOAD_FILE_NAME`].
    pub async fn save_result(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let uri = self
            .state
            .result_image
            .as_deref()
            .ok_or_else(|| TryOnError::InvalidRequest("no generated image to save".into()))?;
        let (_, bytes) = decode_data_uri(uri)?;

        let path = path.as_ref();
        let target = if tokio::fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            path.join(DOWNLOAD_FILE_NAME)
        } else {
            path.to_path_buf()
        };

        tokio::fs::write(&target, bytes).await?;
        tracing::info!(path = %target.display(), "saved try-on image");
        Ok(target)
    }
}
