//! Document error types.

use thiserror::Error;

use crate::value::ValueType;

/// Errors raised by the value model and the codecs.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested field does not exist in the document.
    #[error("field not found")]
    FieldNotFound,

    /// The requested index is out of the array bounds.
    #[error("value not found")]
    ValueNotFound,

    /// The encoded bytes are truncated or structurally invalid.
    #[error("corrupt encoding: {0}")]
    CorruptEncoding(String),

    /// A value of this type cannot be represented by the encoder.
    #[error("unsupported type: {0}")]
    UnsupportedType(ValueType),

    /// A typed accessor was used on a value of another type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ValueType,
        actual: ValueType,
    },

    /// A value or name exceeds the limits of the encoding.
    #[error("too large: {0}")]
    TooLarge(String),

    /// Malformed field path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Writing to the encoder's sink failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON conversion failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true for the recoverable "not found" conditions.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::FieldNotFound | Error::ValueNotFound)
    }
}
