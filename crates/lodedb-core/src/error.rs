//! Core error types.

use thiserror::Error;

/// Core database errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Value model or codec error.
    #[error(transparent)]
    Document(#[from] lodedb_document::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The statement has no stream to explain.
    #[error("unsupported statement: {0}")]
    UnsupportedStatement(String),

    /// The table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// A table with this name already exists.
    #[error("table already exists: {0}")]
    TableAlreadyExists(String),

    /// The index does not exist.
    #[error("index not found: {0}")]
    IndexNotFound(String),

    /// An index with this name already exists.
    #[error("index already exists: {0}")]
    IndexAlreadyExists(String),

    /// A document with the same key or unique value already exists.
    #[error("duplicate document")]
    DuplicateDocument,

    /// No document is stored under the key.
    #[error("document not found")]
    DocumentNotFound,

    /// A write was attempted in a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnlyTransaction,

    /// A query parameter was referenced but not supplied.
    #[error("parameter not found: {0}")]
    ParamNotFound(String),

    /// An expression evaluated to a value its operator cannot use.
    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    /// The stream cannot be executed as built.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

impl Error {
    /// Returns true if the error is a missing field or array element.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Document(e) if e.is_not_found())
    }
}
