//! Table and index definitions.

use lodedb_document::Path;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};

use crate::error::Error;

/// Copy stored bytes into a buffer aligned for rkyv access.
fn aligned(bytes: &[u8]) -> AlignedVec {
    let mut buf = AlignedVec::with_capacity(bytes.len());
    buf.extend_from_slice(bytes);
    buf
}

/// Definition of a table.
#[derive(
    Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize,
)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Path of the primary key, if documents are keyed by one of their values.
    ///
    /// Without a primary key, documents are keyed by a generated sequence.
    pub primary_key: Option<String>,
}

impl TableInfo {
    /// Create a table definition without a primary key.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: None,
        }
    }

    /// Key documents by the value at `path`.
    pub fn with_primary_key(mut self, path: impl Into<String>) -> Self {
        self.primary_key = Some(path.into());
        self
    }

    /// Parse the primary key path.
    pub fn primary_key_path(&self) -> Result<Option<Path>, Error> {
        self.primary_key
            .as_deref()
            .map(Path::parse)
            .transpose()
            .map_err(Error::from)
    }

    /// Serialize the definition using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a definition from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned(bytes))
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Definition of a secondary index over one path of a table.
#[derive(
    Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize, serde::Serialize, serde::Deserialize,
)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Indexed table.
    pub table: String,
    /// Indexed path, e.g. `address.city`.
    pub path: String,
    /// Reject two documents with the same non-null value.
    pub unique: bool,
}

impl IndexInfo {
    /// Create a non-unique index definition.
    pub fn new(name: impl Into<String>, table: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            path: path.into(),
            unique: false,
        }
    }

    /// Make the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Parse the indexed path.
    pub fn parsed_path(&self) -> Result<Path, Error> {
        Ok(Path::parse(&self.path)?)
    }

    /// Serialize the definition using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a definition from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned(bytes))
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}
