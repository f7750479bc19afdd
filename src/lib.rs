#![warn(missing_docs)]
//! saree-tryon - virtual saree try-on via Gemini image generation.
//!
//! Give it a photo of a person and a photo of a saree; it asks a hosted
//! image model to render the person wearing the saree.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use saree_tryon::{
//!     ConnectionGate, GeminiTryOnClient, GenerateOutcome, ImageSlot, WorkflowController,
//! };
//!
//! #[tokio::main]
//! async fn main() -> saree_tryon::Result<()> {
//!     let client = GeminiTryOnClient::builder().build()?;
//!     let mut session = WorkflowController::new(ConnectionGate::from_env(None), Arc::new(client));
//!     session.initialize().await;
//!
//!     session.select_image(ImageSlot::Human, "me.jpg").await?;
//!     session.select_image(ImageSlot::Garment, "saree.jpg").await?;
//!
//!     if let GenerateOutcome::Completed(_) = session.generate().await {
//!         session.save_result(".").await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Layout
//!
//! - [`image`]: file encoding into data URIs, output configuration types.
//! - [`gate`]: credential availability and interactive selection.
//! - [`client`]: request construction and image extraction for Gemini.
//! - [`workflow`]: session state and the generate / reset flow.
//!
//! # Features
//!
//! - `cli` (default): the `saree-tryon` command-line binary.

mod error;

pub mod client;
pub mod gate;
pub mod image;
pub mod workflow;

// Re-export error types at crate root
pub use error::{is_auth_message, ErrorKind, Result, TryOnError, INVALID_KEY_MESSAGE, NO_IMAGE_MESSAGE};

pub use client::{
    GeminiModel, GeminiTryOnClient, GeminiTryOnClientBuilder, TryOnGenerator, TryOnGeneratorExt,
};
pub use gate::{ConnectionGate, ConnectionStatus, CredentialHost, KeyStore};
pub use image::{AspectRatio, EncodedImage, ImageFormat, ImageSize, ImageSlot};
pub use workflow::{
    GenerateOutcome, GenerationTicket, WorkflowController, WorkflowState, DOWNLOAD_FILE_NAME,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::client::{GeminiTryOnClient, TryOnGenerator, TryOnGeneratorExt};
    pub use crate::error::{Result, TryOnError};
    pub use crate::gate::{ConnectionGate, CredentialHost, KeyStore};
    pub use crate::image::{EncodedImage, ImageSlot};
    pub use crate::workflow::{GenerateOutcome, WorkflowController};
}
