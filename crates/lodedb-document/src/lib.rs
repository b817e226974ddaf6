//! LodeDB document model.
//!
//! This crate defines the typed values stored by LodeDB and the binary
//! encoding used to persist them.
//!
//! # Modules
//!
//! - [`value`] - Typed values and their comparison rules
//! - [`document`] - The [`Document`] capability and the [`FieldBuffer`] builder
//! - [`array`] - The [`Array`] capability and the [`ValueBuffer`] builder
//! - [`path`] - Paths into nested documents and arrays
//! - [`encoding`] - Codecs, with lazily decoded documents and arrays
//! - [`json`] - JSON rendering and parsing
//! - [`error`] - Error types
//!
//! # Encoding
//!
//! ```
//! use bytes::Bytes;
//! use lodedb_document::{BinaryCodec, Codec, Document, FieldBuffer, Value};
//!
//! let doc = FieldBuffer::new().with_field("name", "john").with_field("age", 10);
//! let bytes = BinaryCodec.encode(&doc).unwrap();
//!
//! let decoded = BinaryCodec.new_document(Bytes::from(bytes));
//! assert_eq!(decoded.get_by_field("age").unwrap(), Value::Integer(10));
//! ```

pub mod array;
pub mod document;
pub mod encoding;
pub mod error;
pub mod json;
pub mod path;
pub mod value;

pub use array::{Array, ValueBuffer, Values};
pub use document::{Document, FieldBuffer, Fields};
pub use encoding::{BinaryCodec, BinaryEncoder, Codec, EncodedArray, EncodedDocument, Encoder};
pub use error::Error;
pub use json::{to_json, to_json_value};
pub use path::{Path, PathFragment};
pub use value::{Value, ValueType};
