//! Binary-to-text codec for moving image payloads through JSON.
//!
//! Images are carried as `data:` URLs with a standard base64 payload, e.g.
//! `data:image/jpeg;base64,/9j/4AAQ...`. The alphabet (`A-Z a-z 0-9 + / =`)
//! and the prefix never need escaping inside a JSON string.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use thiserror::Error;

/// Standard alphabet. Output is padded; input may be padded or not, as with
/// browser data-URL decoding.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// MIME type used when the payload is not a recognised image format.
pub const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("not a data URL")]
    NotDataUrl,

    #[error("data URL has no payload separator")]
    MissingPayload,

    #[error("data URL is not base64 encoded")]
    NotBase64,

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),
}

/// Encode raw bytes as a base64 data URL.
pub fn encode(bytes: &[u8]) -> String {
    format!("data:{};base64,{}", sniff_mime(bytes), BASE64.encode(bytes))
}

/// Decode a base64 data URL back to the original bytes.
pub fn decode(text: &str) -> Result<Vec<u8>, DecodeError> {
    let (_, payload) = split_data_url(text)?;
    // Line-wrapped payloads are accepted, as browsers do.
    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))
}

/// MIME type declared by a data URL (`text/plain` if the URL omits it).
pub fn mime_type(text: &str) -> Result<String, DecodeError> {
    let (mime, _) = split_data_url(text)?;
    if mime.is_empty() {
        Ok("text/plain".to_string())
    } else {
        Ok(mime.to_string())
    }
}

/// Best-effort MIME type for an image payload.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(format) => format.to_mime_type(),
        Err(_) => FALLBACK_MIME,
    }
}

fn split_data_url(text: &str) -> Result<(&str, &str), DecodeError> {
    let text = text.trim();
    let rest = match text.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("data:") => &text[5..],
        _ => return Err(DecodeError::NotDataUrl),
    };

    let (meta, payload) = rest.split_once(',').ok_or(DecodeError::MissingPayload)?;

    let mut parts = meta.split(';');
    let mime = parts.next().unwrap_or("").trim();
    let is_base64 = parts.any(|p| p.trim().eq_ignore_ascii_case("base64"));
    if !is_base64 {
        return Err(DecodeError::NotBase64);
    }

    Ok((mime, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

    #[test]
    fn test_round_trip_arbitrary_bytes() {
        let payloads: Vec<Vec<u8>> = vec![
            Vec::new(),
            vec![0],
            vec![0xFF; 3],
            (0..=255u8).collect(),
            PNG_MAGIC.to_vec(),
        ];
        for bytes in payloads {
            assert_eq!(decode(&encode(&bytes)).unwrap(), bytes);
        }
    }

    #[test]
    fn test_empty_payload_encoding() {
        assert_eq!(encode(&[]), "data:application/octet-stream;base64,");
        assert_eq!(decode("data:application/octet-stream;base64,").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_encode_sniffs_image_type() {
        assert!(encode(PNG_MAGIC).starts_with("data:image/png;base64,"));
        assert!(encode(JPEG_MAGIC).starts_with("data:image/jpeg;base64,"));
        assert!(encode(b"hello").starts_with("data:application/octet-stream;base64,"));
    }

    #[test]
    fn test_encoding_is_json_safe() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
        let encoded = encode(&bytes);
        let json = serde_json::to_string(&encoded).unwrap();
        // Only the surrounding quotes are added; nothing inside is escaped.
        assert_eq!(json.len(), encoded.len() + 2);
    }

    #[test]
    fn test_decode_accepts_browser_style_urls() {
        assert_eq!(decode("DATA:image/png;BASE64,aGk=").unwrap(), b"hi");
        assert_eq!(decode("  data:;base64,aGk=\n").unwrap(), b"hi");
        assert_eq!(decode("data:image/jpeg;name=a.jpg;base64,aG\nk=").unwrap(), b"hi");
    }

    #[test]
    fn test_decode_accepts_unpadded_payloads() {
        assert_eq!(decode("data:image/png;base64,aGk").unwrap(), b"hi");
        assert_eq!(decode("data:image/png;base64,aA").unwrap(), b"h");
        assert_eq!(encode(b"hi"), "data:application/octet-stream;base64,aGk=");
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        assert_eq!(decode("aGk="), Err(DecodeError::NotDataUrl));
        assert_eq!(decode(""), Err(DecodeError::NotDataUrl));
        assert_eq!(decode("data:image/png;base64"), Err(DecodeError::MissingPayload));
        assert_eq!(decode("data:text/plain,hi"), Err(DecodeError::NotBase64));
        assert!(matches!(
            decode("data:image/png;base64,!!!"),
            Err(DecodeError::InvalidBase64(_))
        ));
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(mime_type("data:image/webp;base64,").unwrap(), "image/webp");
        assert_eq!(mime_type("data:;base64,").unwrap(), "text/plain");
        assert!(mime_type("nope").is_err());
    }
}
