//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during record encoding or decoding.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The record buffer ended before the expected field data.
    #[error("unexpected end of record data")]
    UnexpectedEof,

    /// A text payload was not valid UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// A value's runtime kind did not match the field's declared kind.
    #[error("kind mismatch: field is {expected}, value is {actual}")]
    KindMismatch {
        /// The field's declared kind.
        expected: &'static str,
        /// The kind of the supplied value.
        actual: &'static str,
    },

    /// An unknown kind tag was found in encoded data.
    #[error("invalid kind tag: {0}")]
    InvalidKindTag(u8),

    /// Encoded data did not have the expected structure.
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// A document payload could not be encoded or decoded as CBOR.
    #[error("document codec failed: {message}")]
    Document {
        /// Description of the CBOR error.
        message: String,
    },

    /// A raw-pool read or write failed.
    #[error("raw pool error: {message}")]
    RawPool {
        /// Description of the raw-pool error.
        message: String,
    },
}

impl CodecError {
    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates a document codec error.
    pub fn document(message: impl Into<String>) -> Self {
        Self::Document {
            message: message.into(),
        }
    }

    /// Creates a raw-pool error.
    pub fn raw_pool(message: impl Into<String>) -> Self {
        Self::RawPool {
            message: message.into(),
        }
    }
}
