//! Common code shared between `classify_server` and `predict_client`.
use sha2::{Digest, Sha256};

pub mod data_url;
pub mod protocol;

/// Error type.
pub type Error = Box<dyn std::error::Error>;

/// Label reported when the best prediction is below the confidence threshold.
pub const UNIDENTIFIED_LABEL: &str = "unidentified";

/// Key for on-disk caches: the first 8 bytes of the SHA-256 digest, big endian.
pub fn hashed(data: impl AsRef<[u8]>) -> u64 {
    let digest = Sha256::digest(data.as_ref());
    let mut key = [0_u8; 8];
    key.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(key)
}
