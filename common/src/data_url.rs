//! Data URLs of the form `data:image/<fmt>;base64,<payload>`.
//!
use base64::{engine::general_purpose::STANDARD, Engine as _};

const DATA_SCHEME: &str = "data:";

/// Wrap raw bytes into a base64 data URL.
pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("{DATA_SCHEME}{mime};base64,{}", STANDARD.encode(bytes))
}

/// Split a data URL into its MIME declaration and payload.
///
/// Strings without a `data:` prefix are treated as a bare payload.
pub fn split(input: &str) -> (Option<&str>, &str) {
    let input = input.trim();
    match input.strip_prefix(DATA_SCHEME) {
        Some(rest) => match rest.split_once(',') {
            Some((header, payload)) => {
                let mime = header.split(';').next().filter(|mime| !mime.is_empty());
                (mime, payload)
            }
            // A header without a payload separator carries no data
            None => (None, ""),
        },
        None => (None, input),
    }
}

/// Decode the base64 payload of a data URL (or of a bare base64 string).
pub fn decode_payload(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let (_mime, payload) = split(input);
    STANDARD.decode(payload.trim())
}

/// Guess the image MIME type from magic bytes.
pub fn guess_mime(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        [0x42, 0x4D, ..] => Some("image/bmp"),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_split_strips_mime_prefix() {
        assert_eq!(
            split("data:image/png;base64,iVBORw0KGgo="),
            (Some("image/png"), "iVBORw0KGgo=")
        );
        assert_eq!(split("iVBORw0KGgo="), (None, "iVBORw0KGgo="));
        assert_eq!(split("data:image/png;base64"), (None, ""));
    }

    #[test]
    fn test_encode_then_decode_payload() {
        let bytes = [0x89, 0x50, 0x4E, 0x47, 1, 2, 3];
        let url = encode("image/png", &bytes);
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(decode_payload(&url).unwrap(), bytes);
    }

    #[test]
    fn test_malformed_base64_is_rejected() {
        assert!(decode_payload("data:image/png;base64,@@not base64@@").is_err());
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(guess_mime(b"hello world"), None);
    }
}
