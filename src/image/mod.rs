//! Image encoding and output configuration types.

mod encoded;
mod types;

pub use encoded::{decode_data_uri, to_data_uri, EncodedImage};
pub use types::{AspectRatio, ImageFormat, ImageSize, ImageSlot, UNKNOWN_MIME_TYPE};
