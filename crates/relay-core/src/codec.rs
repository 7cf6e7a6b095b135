//! Decodes base64/raw-compressed upstream payloads into JSON trees.
//!
//! An upstream feed name ending in `.z` indicates a compressed payload;
//! after decoding, the effective feed name is the suffix-stripped form.

use base64::Engine as _;
use flate2::read::DeflateDecoder;
use std::io::Read;

/// Either a base64-encoded text payload or a raw binary payload.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
}

/// Decode a `.z`-style payload: base64-decode (text case only), raw-deflate
/// decompress (no zlib header), then parse as JSON.
///
/// Returns `None` on any error — the caller silently ignores undecodable
/// payloads per the upstream contract.
#[must_use]
pub fn decode(payload: Payload<'_>) -> Option<serde_json::Value> {
    let bytes = match payload {
        Payload::Text(s) => base64::engine::general_purpose::STANDARD
            .decode(s.trim())
            .ok()?,
        Payload::Bytes(b) => b.to_vec(),
    };
    let mut decoder = DeflateDecoder::new(&bytes[..]);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).ok()?;
    serde_json::from_slice(&decompressed).ok()
}

/// Strip a `.z` suffix, returning `(effective_name, was_compressed)`.
#[must_use]
pub fn strip_compressed_suffix(feed_name: &str) -> (&str, bool) {
    match feed_name.strip_suffix(".z") {
        Some(stripped) => (stripped, true),
        None => (feed_name, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use serde_json::json;
    use std::io::Write;

    fn deflate_raw(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn decode_round_trips_base64_raw_deflate_json() {
        let tree = json!({"Entries": [{"a": 1}, {"b": 2}]});
        let compressed = deflate_raw(tree.to_string().as_bytes());
        let encoded = base64::engine::general_purpose::STANDARD.encode(&compressed);

        let decoded = decode(Payload::Text(&encoded)).unwrap();
        assert_eq!(decoded, tree);

        let decoded_bytes = decode(Payload::Bytes(&compressed)).unwrap();
        assert_eq!(decoded_bytes, tree);
    }

    #[test]
    fn decode_returns_none_on_garbage_input() {
        assert!(decode(Payload::Text("not valid base64!!")).is_none());
        assert!(decode(Payload::Bytes(b"not deflate data")).is_none());
    }

    #[test]
    fn strip_compressed_suffix_only_strips_dot_z() {
        assert_eq!(strip_compressed_suffix("CarData.z"), ("CarData", true));
        assert_eq!(strip_compressed_suffix("SessionInfo"), ("SessionInfo", false));
    }
}
