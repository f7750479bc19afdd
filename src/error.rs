//! Error types for try-on generation.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Message surfaced when the remote service rejects the credential.
pub const INVALID_KEY_MESSAGE: &str =
    "Invalid API key. Select a key from a paid Google Cloud project and try again.";

/// Message surfaced when the response carries no image part.
pub const NO_IMAGE_MESSAGE: &str = "No image generated in the response.";

/// Maximum length of remote error text kept in an error.
const MAX_ERROR_TEXT: usize = 500;

/// Errors that can occur while encoding, connecting, or generating.
#[derive(Debug, thiserror::Error)]
pub enum TryOnError {
    /// The selected image file could not be read.
    #[error("failed to read image {}: {source}", .path.display())]
    Read {
        /// Path of the file that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Interactive credential selection failed or is unavailable.
    #[error("{0}")]
    Connection(String),

    /// Credential missing or rejected by the remote service.
    #[error("{0}")]
    Auth(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Sanitized response text.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Server-suggested delay, if any.
        retry_after: Option<Duration>,
    },

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// The call succeeded but produced no usable image.
    #[error("{0}")]
    Generation(String),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 or a data URI.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., saving the result).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of a [`TryOnError`], as seen by the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A file could not be read or decoded.
    Read,
    /// Credential selection failed.
    Connection,
    /// The remote call failed.
    Remote,
    /// The remote call succeeded without producing an image.
    Generation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Connection => write!(f, "connection"),
            Self::Remote => write!(f, "remote"),
            Self::Generation => write!(f, "generation"),
        }
    }
}

impl TryOnError {
    /// Returns the workflow-level kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Read { .. } | Self::Decode(_) | Self::Io(_) => ErrorKind::Read,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Generation(_) | Self::ContentBlocked(_) => ErrorKind::Generation,
            Self::Auth(_)
            | Self::Api { .. }
            | Self::RateLimited { .. }
            | Self::InvalidRequest(_)
            | Self::Network(_)
            | Self::Json(_) => ErrorKind::Remote,
        }
    }

    /// Returns true if this error is likely transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network(_))
    }

    /// Returns the suggested retry delay, if available.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            Self::Network(_) => Some(Duration::from_secs(2)),
            _ => None,
        }
    }

    /// Returns true if the error looks like a missing or rejected credential.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Auth(_)) || is_auth_message(&self.to_string())
    }
}

/// Returns true if `text` carries an auth-failure signature.
///
/// Matches the entity-not-found message Gemini returns for keys whose
/// project cannot see the model, and anything mentioning an API key.
pub fn is_auth_message(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("requested entity was not found") || lower.contains("api key")
}

/// Redacts API keys from remote error text and caps its length.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let mut out = String::with_capacity(text.len().min(MAX_ERROR_TEXT));
    let mut rest = text.trim();
    while let Some(pos) = rest.find("AIza") {
        out.push_str(&rest[..pos]);
        out.push_str("[REDACTED]");
        let tail = &rest[pos..];
        let end = tail
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(tail.len());
        rest = &tail[end..];
    }
    out.push_str(rest);

    if out.chars().count() > MAX_ERROR_TEXT {
        let truncated: String = out.chars().take(MAX_ERROR_TEXT).collect();
        return format!("{truncated}...");
    }
    out
}

/// Parses a `Retry-After` header given in whole seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Result type alias for try-on operations.
pub type Result<T> = std::result::Result<T, TryOnError>;
