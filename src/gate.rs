//! Connection gate: decides whether a credential is available.
//!
//! A credential comes from one of two places. An environment credential,
//! when present, short-circuits everything: the gate is connected and never
//! prompts. Otherwise an optional [`CredentialHost`] is asked whether a key
//! has been selected and, on request, to run its interactive selection.
//!
//! Selection is trusted without verification. Once the host reports
//! success the gate is `Connected`, even though the key itself has not been
//! checked; a bad key surfaces on the next generation as an auth failure,
//! which flips the gate back and re-prompts.

use crate::error::{Result, TryOnError};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

/// Environment variables consulted for the credential, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Message surfaced when connect is requested without a host capability.
pub const NO_HOST_MESSAGE: &str =
    "Key selection environment not detected. Set GEMINI_API_KEY or run interactively.";

/// Reads the environment credential, ignoring empty values.
pub fn env_api_key() -> Option<String> {
    API_KEY_ENV_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.trim().is_empty())
}

/// Gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Startup has not run yet.
    #[default]
    Unknown,
    /// No usable credential.
    Disconnected,
    /// A credential is available (or was selected).
    Connected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Host capability for credential status and interactive selection.
#[async_trait]
pub trait CredentialHost: Send + Sync {
    /// Returns whether a key has already been selected.
    async fn has_selected_api_key(&self) -> Result<bool>;

    /// Runs the interactive key selection. Returning `Ok` means the host
    /// accepted a selection, not that the key is valid.
    async fn open_select_key(&self) -> Result<()>;
}

/// In-memory slot a host writes a selected key into.
///
/// Cloning shares the slot. Nothing is persisted.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    inner: Arc<RwLock<Option<String>>>,
}

impl KeyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the selected key, if any.
    pub fn get(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Stores a selected key.
    pub fn set(&self, key: impl Into<String>) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(key.into());
    }

    /// Forgets the selected key.
    pub fn clear(&self) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    /// Returns true if a key is stored.
    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }
}

/// Tracks whether generation may proceed and drives credential selection.
pub struct ConnectionGate {
    env_key: Option<String>,
    host: Option<Arc<dyn CredentialHost>>,
    status: ConnectionStatus,
}

impl ConnectionGate {
    /// Creates a gate in the `Unknown` state.
    pub fn new(env_key: Option<String>, host: Option<Arc<dyn CredentialHost>>) -> Self {
        Self {
            env_key,
            host,
            status: ConnectionStatus::Unknown,
        }
    }

    /// Creates a gate from the process environment.
    pub fn from_env(host: Option<Arc<dyn CredentialHost>>) -> Self {
        Self::new(env_api_key(), host)
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Returns true if the status is `Connected`.
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Returns true if an environment credential was provisioned.
    pub fn has_env_credential(&self) -> bool {
        self.env_key.is_some()
    }

    /// Returns true if a host capability was injected.
    pub fn has_host(&self) -> bool {
        self.host.is_some()
    }

    /// Resolves the startup status.
    pub async fn initialize(&mut self) -> ConnectionStatus {
        let status = if self.env_key.is_some() {
            ConnectionStatus::Connected
        } else if let Some(host) = &self.host {
            match host.has_selected_api_key().await {
                Ok(true) => ConnectionStatus::Connected,
                Ok(false) => ConnectionStatus::Disconnected,
                Err(e) => {
                    tracing::warn!(error = %e, "credential status query failed");
                    ConnectionStatus::Disconnected
                }
            }
        } else {
            ConnectionStatus::Disconnected
        };
        self.transition(status);
        status
    }

    /// Runs the interactive selection flow.
    ///
    /// On success the gate is `Connected` without re-checking the key.
    pub async fn connect(&mut self) -> Result<()> {
        let Some(host) = self.host.clone() else {
            self.transition(ConnectionStatus::Disconnected);
            return Err(TryOnError::Connection(NO_HOST_MESSAGE.into()));
        };

        match host.open_select_key().await {
            Ok(()) => {
                self.transition(ConnectionStatus::Connected);
                Ok(())
            }
            Err(e) => {
                self.transition(ConnectionStatus::Disconnected);
                Err(match e {
                    TryOnError::Connection(_) => e,
                    other => TryOnError::Connection(format!("Failed to select a key: {other}")),
                })
            }
        }
    }

    /// Returns true if a generation must be replaced by a connect prompt.
    pub fn requires_connect(&self) -> bool {
        self.env_key.is_none() && !self.is_connected()
    }

    /// Reacts to a failed generation.
    ///
    /// When the error looks like a rejected credential and no environment
    /// credential is set, the gate drops to `Disconnected` and re-runs
    /// [`connect`](Self::connect). Returns true if that happened.
    pub async fn handle_generation_failure(&mut self, error: &TryOnError) -> bool {
        if self.env_key.is_some() || !error.is_auth_failure() {
            return false;
        }

        self.transition(ConnectionStatus::Disconnected);
        if let Err(e) = self.connect().await {
            tracing::warn!(error = %e, "re-prompt for credential failed");
        }
        true
    }

    fn transition(&mut self, next: ConnectionStatus) {
        if self.status != next {
            tracing::info!(from = %self.status, to = %next, "connection status changed");
        }
        self.status = next;
    }
}

impl std::fmt::Debug for ConnectionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGate")
            .field("env_key", &self.env_key.as_ref().map(|_| "[REDACTED]"))
            .field("has_host", &self.host.is_some())
            .field("status", &self.status)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scriptable host that counts calls.
    #[derive(Default)]
    pub struct FakeHost {
        pub selected: bool,
        pub fail_select: bool,
        pub fail_status: bool,
        pub status_calls: AtomicUsize,
        pub select_calls: AtomicUsize,
    }

    impl FakeHost {
        pub fn selects() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn refuses() -> Arc<Self> {
            Arc::new(Self {
                fail_select: true,
                ..Self::default()
            })
        }

        pub fn select_count(&self) -> usize {
            self.select_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CredentialHost for FakeHost {
        async fn has_selected_api_key(&self) -> Result<bool> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_status {
                return Err(TryOnError::Connection("host unavailable".into()));
            }
            Ok(self.selected)
        }

        async fn open_select_key(&self) -> Result<()> {
            self.select_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_select {
                return Err(TryOnError::Connection("selection cancelled".into()));
            }
            Ok(())
        }
    }
}
