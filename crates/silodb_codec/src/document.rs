//! Document field payloads.
//!
//! Document fields hold arbitrary serde-serializable values as CBOR blobs.
//! The engine treats them as opaque bytes; only the application interprets
//! them.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serializes a value into a CBOR document payload.
///
/// # Errors
///
/// Returns a `Document` error when CBOR serialization fails.
pub fn encode_document<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| CodecError::document(e.to_string()))?;
    Ok(buf)
}

/// Deserializes a CBOR document payload back into a value.
///
/// # Errors
///
/// Returns a `Document` error when the payload is not valid CBOR for `T`.
pub fn decode_document<T: DeserializeOwned>(payload: &[u8]) -> CodecResult<T> {
    ciborium::de::from_reader(payload).map_err(|e| CodecError::document(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        title: String,
        tags: Vec<String>,
        pinned: bool,
    }

    #[test]
    fn document_round_trip() {
        let note = Note {
            title: "groceries".into(),
            tags: vec!["errand".into(), "home".into()],
            pinned: true,
        };

        let payload = encode_document(&note).unwrap();
        let decoded: Note = decode_document(&payload).unwrap();
        assert_eq!(decoded, note);
    }

    #[test]
    fn garbage_payload_fails() {
        let result: CodecResult<Note> = decode_document(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(CodecError::Document { .. })));
    }
}
