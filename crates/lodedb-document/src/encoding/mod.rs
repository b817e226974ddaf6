//! Document encodings.
//!
//! A [`Codec`] turns documents into bytes through an [`Encoder`], and wraps
//! previously encoded bytes into a lazy [`Document`] view. The only codec
//! shipped is [`BinaryCodec`].

mod binary;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;

use crate::document::Document;
use crate::error::Error;

pub use binary::{BinaryCodec, BinaryEncoder, EncodedArray, EncodedDocument};

/// Encodes documents into an output sink.
pub trait Encoder {
    /// Encode a document and write it to the sink.
    ///
    /// Nothing is written if encoding fails.
    fn encode_document(&mut self, document: &dyn Document) -> Result<(), Error>;
}

/// A stateless factory for encoders and decoded views.
pub trait Codec: Send + Sync {
    /// Create an encoder writing to `w`.
    fn new_encoder<'w>(&self, w: &'w mut dyn Write) -> Box<dyn Encoder + 'w>;

    /// Wrap encoded bytes without parsing them.
    ///
    /// Structural problems surface as [`Error::CorruptEncoding`] when the
    /// returned document is read.
    fn new_document(&self, data: Bytes) -> Arc<dyn Document>;

    /// Encode a document into a fresh buffer.
    fn encode(&self, document: &dyn Document) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        self.new_encoder(&mut buf).encode_document(document)?;
        Ok(buf)
    }
}
