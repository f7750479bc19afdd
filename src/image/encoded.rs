//! Encoding of user-selected files into data URIs.

use crate::error::{Result, TryOnError};
use crate::image::types::{ImageFormat, UNKNOWN_MIME_TYPE};
use base64::Engine;
use std::path::{Path, PathBuf};

/// An image held in memory as a displayable data URI and a raw base64 payload.
///
/// The payload and MIME type always come from the same bytes, and the
/// preview URI embeds the payload behind a `data:<mime>;base64,` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    source: Option<PathBuf>,
    preview_uri: String,
    payload: String,
    mime_type: String,
}

impl EncodedImage {
    /// Reads `path` and encodes its contents.
    ///
    /// No size or type validation happens here; the remote service is left
    /// to reject inputs it cannot use.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(|source| TryOnError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mime_type = detect_mime_type(&data, Some(path));
        let mut image = Self::from_bytes(&data, mime_type);
        image.source = Some(path.to_path_buf());
        tracing::debug!(
            path = %path.display(),
            mime_type = %image.mime_type,
            bytes = data.len(),
            "encoded image"
        );
        Ok(image)
    }

    /// Encodes raw bytes with the given MIME type.
    pub fn from_bytes(data: &[u8], mime_type: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        let preview_uri = to_data_uri(
            &mime_type,
            &base64::engine::general_purpose::STANDARD.encode(data),
        );
        let payload = payload_of(&preview_uri).to_string();
        Self {
            source: None,
            preview_uri,
            payload,
            mime_type,
        }
    }

    /// Path of the file this image was read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Self-contained displayable representation (`data:` URI).
    pub fn preview_uri(&self) -> &str {
        &self.preview_uri
    }

    /// Base64 payload of the raw bytes.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// MIME type of the raw bytes.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

/// Picks a MIME type from magic bytes, then the file extension.
fn detect_mime_type(data: &[u8], path: Option<&Path>) -> String {
    ImageFormat::from_magic_bytes(data)
        .or_else(|| {
            path.and_then(|p| p.extension())
                .and_then(|e| e.to_str())
                .and_then(ImageFormat::from_extension)
        })
        .map(|f| f.mime_type())
        .unwrap_or(UNKNOWN_MIME_TYPE)
        .to_string()
}

/// Builds a `data:<mime>;base64,<data>` URI.
pub fn to_data_uri(mime_type: &str, base64_data: &str) -> String {
    format!("data:{mime_type};base64,{base64_data}")
}

/// Returns everything after the first `,` of a data URI.
fn payload_of(uri: &str) -> &str {
    uri.split_once(',').map(|(_, data)| data).unwrap_or(uri)
}

/// Splits a base64 data URI into its MIME type and decoded bytes.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| TryOnError::Decode("not a data URI".into()))?;
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| TryOnError::Decode("data URI has no payload".into()))?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| TryOnError::Decode("data URI is not base64-encoded".into()))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| TryOnError::Decode(e.to_string()))?;
    Ok((mime_type.to_string(), bytes))
}
