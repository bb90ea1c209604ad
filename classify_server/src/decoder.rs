//! Turn transport-encoded images into pixel grids.
//!
use common::data_url;
use image::{DynamicImage, RgbImage};
use thiserror::Error;

/// Default upper bound for a decoded image payload (10 MiB).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("image payload is empty")]
    Empty,

    #[error("invalid base64 encoding: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("not a decodable image: {0}")]
    InvalidImage(#[from] image::ImageError),

    #[error(transparent)]
    SizeLimit(#[from] SizeLimitError),
}

#[derive(Debug, Error)]
#[error("image is {size} bytes, larger than the limit of {max} bytes")]
pub struct SizeLimitError {
    pub size: usize,
    pub max: usize,
}

/// Decode a `data:image/<fmt>;base64,<payload>` string (or a bare base64 payload).
pub fn decode_data_url(input: &str, max_bytes: usize) -> Result<DynamicImage, DecodeError> {
    let bytes = data_url::decode_payload(input)?;
    decode_bytes(&bytes, max_bytes)
}

/// Decode a frame as delivered by the capture device (MJPEG).
pub fn decode_frame(frame: &[u8], max_bytes: usize) -> Result<RgbImage, DecodeError> {
    Ok(decode_bytes(frame, max_bytes)?.to_rgb8())
}

fn decode_bytes(bytes: &[u8], max_bytes: usize) -> Result<DynamicImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(SizeLimitError {
            size: bytes.len(),
            max: max_bytes,
        }
        .into());
    }

    Ok(image::load_from_memory(bytes)?)
}
