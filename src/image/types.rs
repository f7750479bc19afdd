//! Core types for image handling.

use serde::{Deserialize, Serialize};

/// Fallback MIME type for files whose format cannot be detected.
pub const UNKNOWN_MIME_TYPE: &str = "application/octet-stream";

/// Image formats the encoder recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// PNG format (lossless).
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format.
    WebP,
    /// GIF format.
    Gif,
    /// HEIC/HEIF, as produced by phone cameras.
    Heic,
}

impl ImageFormat {
    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
            Self::Heic => "image/heic",
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            "gif" => Some(Self::Gif),
            "heic" | "heif" => Some(Self::Heic),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }

        // The remaining signatures need 12 bytes
        if data.len() < 12 {
            return None;
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        // ISO-BMFF: ....ftyp<brand>
        if &data[4..8] == b"ftyp" {
            match &data[8..12] {
                b"heic" | b"heix" | b"hevc" | b"heif" | b"mif1" | b"msf1" => {
                    return Some(Self::Heic)
                }
                _ => {}
            }
        }

        None
    }
}

/// Output aspect ratios accepted by the image model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 1:1 square.
    #[serde(rename = "1:1")]
    Square,
    /// 2:3 portrait.
    #[serde(rename = "2:3")]
    Portrait2x3,
    /// 3:2 landscape.
    #[serde(rename = "3:2")]
    Landscape3x2,
    /// 3:4 portrait, suits full-length shots.
    #[default]
    #[serde(rename = "3:4")]
    Portrait3x4,
    /// 4:3 landscape.
    #[serde(rename = "4:3")]
    Landscape4x3,
    /// 4:5 portrait.
    #[serde(rename = "4:5")]
    Portrait4x5,
    /// 5:4 landscape.
    #[serde(rename = "5:4")]
    Landscape5x4,
    /// 9:16 tall portrait.
    #[serde(rename = "9:16")]
    Tall,
    /// 16:9 widescreen.
    #[serde(rename = "16:9")]
    Wide,
    /// 21:9 ultrawide.
    #[serde(rename = "21:9")]
    Ultrawide,
}

impl AspectRatio {
    /// Returns the aspect ratio as a string (e.g., "3:4").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Portrait2x3 => "2:3",
            Self::Landscape3x2 => "3:2",
            Self::Portrait3x4 => "3:4",
            Self::Landscape4x3 => "4:3",
            Self::Portrait4x5 => "4:5",
            Self::Landscape5x4 => "5:4",
            Self::Tall => "9:16",
            Self::Wide => "16:9",
            Self::Ultrawide => "21:9",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output resolution tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageSize {
    /// Roughly 1024px on the long edge.
    #[serde(rename = "1K")]
    OneK,
    /// Roughly 2048px on the long edge.
    #[default]
    #[serde(rename = "2K")]
    TwoK,
    /// Roughly 4096px on the long edge.
    #[serde(rename = "4K")]
    FourK,
}

impl ImageSize {
    /// Returns the wire value (e.g., "2K").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneK => "1K",
            Self::TwoK => "2K",
            Self::FourK => "4K",
        }
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which input image a workflow event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    /// The photo of the person.
    Human,
    /// The photo of the saree.
    Garment,
}

impl ImageSlot {
    /// Label sent to the model ahead of the slot's image.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Human => "Subject image (the person to dress):",
            Self::Garment => "Garment image (the saree to drape on the subject):",
        }
    }
}

impl std::fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Human => write!(f, "person"),
            Self::Garment => write!(f, "garment"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: [u8; 12] = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0];
    const WEBP_MAGIC: [u8; 12] = *b"RIFF\x00\x00\x00\x00WEBP";
    const HEIC_MAGIC: [u8; 12] = *b"\x00\x00\x00\x18ftypheic";

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(
            ImageFormat::from_magic_bytes(&PNG_MAGIC),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&JPEG_MAGIC),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&WEBP_MAGIC),
            Some(ImageFormat::WebP)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&HEIC_MAGIC),
            Some(ImageFormat::Heic)
        );
        assert_eq!(ImageFormat::from_magic_bytes(b"GIF89a\0\0\0\0\0\0"), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::from_magic_bytes(b"short"), None);
        assert_eq!(ImageFormat::from_magic_bytes(b"RIFF\0\0\0\0WEB"), None);
    }

    #[test]
    fn test_format_from_short_signatures() {
        assert_eq!(
            ImageFormat::from_magic_bytes(&[0xFF, 0xD8, 0xFF]),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            ImageFormat::from_magic_bytes(&PNG_MAGIC[..8]),
            Some(ImageFormat::Png)
        );
        assert_eq!(ImageFormat::from_magic_bytes(b"GIF87a"), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::from_magic_bytes(b"RIFF"), None);
        assert_eq!(ImageFormat::from_magic_bytes(&[]), None);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ImageFormat::from_extension("PNG"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_extension("jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension("heif"), Some(ImageFormat::Heic));
        assert_eq!(ImageFormat::from_extension("txt"), None);
    }

    #[test]
    fn test_aspect_ratio_wire_format() {
        assert_eq!(AspectRatio::default().as_str(), "3:4");
        assert_eq!(
            serde_json::to_value(AspectRatio::Wide).unwrap(),
            serde_json::json!("16:9")
        );
    }

    #[test]
    fn test_image_size_wire_format() {
        assert_eq!(ImageSize::default(), ImageSize::TwoK);
        assert_eq!(
            serde_json::to_value(ImageSize::FourK).unwrap(),
            serde_json::json!("4K")
        );
    }
}
