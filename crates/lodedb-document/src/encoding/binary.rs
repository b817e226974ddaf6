//! Binary document encoding with lazy decoding.
//!
//! All integers are little-endian. Offsets are relative to the start of the
//! enclosing document or array, so a nested value is a self-contained slice
//! that can be wrapped without copying.
//!
//! Document:
//! - Total size (4 bytes)
//! - Field count (4 bytes)
//! - Payload start (4 bytes)
//! - For each field:
//!   - Value offset (4 bytes)
//!   - Value tag (1 byte)
//!   - Field name length (2 bytes)
//!   - Field name (UTF-8 bytes)
//! - Payload: the encoded values, back to back
//!
//! Array:
//! - Total size (4 bytes)
//! - Element count (4 bytes)
//! - For each element: value tag (1 byte), value offset (4 bytes)
//! - Payload
//!
//! A value ends where the next one starts, or at the end of its container.
//! Array entries have a fixed width, so an element is located in constant
//! time.

use std::borrow::Cow;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;

use super::{Codec, Encoder};
use crate::array::{Array, Values};
use crate::document::{Document, Fields};
use crate::error::Error;
use crate::value::{Value, ValueType};

const DOCUMENT_HEADER_LEN: usize = 12;
const DOCUMENT_ENTRY_LEN: usize = 7;
const ARRAY_HEADER_LEN: usize = 8;
const ARRAY_ENTRY_LEN: usize = 5;

/// Type tag for encoded values.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueTag {
    Null = 0,
    Bool = 1,
    Integer = 2,
    Double = 3,
    Text = 4,
    Blob = 5,
    Duration = 6,
    Array = 7,
    Document = 8,
}

impl TryFrom<u8> for ValueTag {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ValueTag::Null),
            1 => Ok(ValueTag::Bool),
            2 => Ok(ValueTag::Integer),
            3 => Ok(ValueTag::Double),
            4 => Ok(ValueTag::Text),
            5 => Ok(ValueTag::Blob),
            6 => Ok(ValueTag::Duration),
            7 => Ok(ValueTag::Array),
            8 => Ok(ValueTag::Document),
            _ => Err(corrupt(format!("unknown value tag {}", value))),
        }
    }
}

impl From<ValueType> for ValueTag {
    fn from(ty: ValueType) -> Self {
        match ty {
            ValueType::Null => ValueTag::Null,
            ValueType::Bool => ValueTag::Bool,
            ValueType::Integer => ValueTag::Integer,
            ValueType::Double => ValueTag::Double,
            ValueType::Text => ValueTag::Text,
            ValueType::Blob => ValueTag::Blob,
            ValueType::Duration => ValueTag::Duration,
            ValueType::Array => ValueTag::Array,
            ValueType::Document => ValueTag::Document,
        }
    }
}

fn corrupt(msg: impl Into<String>) -> Error {
    Error::CorruptEncoding(msg.into())
}

fn read_u32(data: &[u8], at: usize) -> Result<usize, Error> {
    let bytes = at
        .checked_add(4)
        .and_then(|end| data.get(at..end))
        .ok_or_else(|| corrupt("unexpected end of data"))?;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    Ok(u32::from_le_bytes(raw) as usize)
}

fn read_u16(data: &[u8], at: usize) -> Result<usize, Error> {
    let bytes = data
        .get(at..at + 2)
        .ok_or_else(|| corrupt("unexpected end of data"))?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]) as usize)
}

fn read_u8(data: &[u8], at: usize) -> Result<u8, Error> {
    data.get(at)
        .copied()
        .ok_or_else(|| corrupt("unexpected end of data"))
}

fn read_fixed8(span: &[u8]) -> Result<[u8; 8], Error> {
    span.try_into()
        .map_err(|_| corrupt(format!("expected 8 bytes, found {}", span.len())))
}

/// Decode the value stored in `data[start..end]`.
///
/// Composite values are wrapped lazily around a slice of `data`.
fn decode_value(data: &Bytes, tag: ValueTag, start: usize, end: usize) -> Result<Value, Error> {
    let span = data
        .get(start..end)
        .ok_or_else(|| corrupt("value span out of bounds"))?;
    Ok(match tag {
        ValueTag::Null => {
            if !span.is_empty() {
                return Err(corrupt("null value with a payload"));
            }
            Value::Null
        }
        ValueTag::Bool => match span {
            [0] => Value::Bool(false),
            [1] => Value::Bool(true),
            _ => return Err(corrupt("invalid bool payload")),
        },
        ValueTag::Integer => Value::Integer(i64::from_le_bytes(read_fixed8(span)?)),
        ValueTag::Double => Value::Double(f64::from_bits(u64::from_le_bytes(read_fixed8(span)?))),
        ValueTag::Duration => Value::Duration(i64::from_le_bytes(read_fixed8(span)?)),
        ValueTag::Text => Value::Text(
            std::str::from_utf8(span)
                .map_err(|_| corrupt("invalid UTF-8 in text value"))?
                .to_string(),
        ),
        ValueTag::Blob => Value::Blob(span.to_vec()),
        ValueTag::Array => Value::Array(Arc::new(EncodedArray::new(data.slice(start..end)))),
        ValueTag::Document => {
            Value::Document(Arc::new(EncodedDocument::new(data.slice(start..end))))
        }
    })
}

/// The binary codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl BinaryCodec {
    /// Create the codec.
    pub fn new() -> Self {
        BinaryCodec
    }
}

impl Codec for BinaryCodec {
    fn new_encoder<'w>(&self, w: &'w mut dyn Write) -> Box<dyn Encoder + 'w> {
        Box::new(BinaryEncoder::new(w))
    }

    fn new_document(&self, data: Bytes) -> Arc<dyn Document> {
        Arc::new(EncodedDocument::new(data))
    }
}

/// Writes binary-encoded documents to a sink.
///
/// The scratch buffer is kept between calls.
pub struct BinaryEncoder<'w> {
    w: &'w mut dyn Write,
    buf: Vec<u8>,
}

impl<'w> BinaryEncoder<'w> {
    /// Create an encoder writing to `w`.
    pub fn new(w: &'w mut dyn Write) -> Self {
        Self { w, buf: Vec::new() }
    }
}

impl Encoder for BinaryEncoder<'_> {
    fn encode_document(&mut self, document: &dyn Document) -> Result<(), Error> {
        self.buf.clear();
        write_document(&mut self.buf, document)?;
        self.w.write_all(&self.buf)?;
        Ok(())
    }
}

fn to_u32(n: usize, what: &str) -> Result<u32, Error> {
    u32::try_from(n).map_err(|_| Error::TooLarge(format!("{} exceeds {} bytes", what, u32::MAX)))
}

fn write_document(out: &mut Vec<u8>, document: &dyn Document) -> Result<(), Error> {
    let fields = document.fields().collect::<Result<Vec<_>, Error>>()?;

    let mut header_len = DOCUMENT_HEADER_LEN;
    for (name, _) in &fields {
        if name.len() > u16::MAX as usize {
            return Err(Error::TooLarge(format!("field name of {} bytes", name.len())));
        }
        header_len += DOCUMENT_ENTRY_LEN + name.len();
    }

    let mut payload = Vec::new();
    let mut entries = Vec::with_capacity(fields.len());
    for (_, value) in &fields {
        let offset = header_len + payload.len();
        let tag = write_value(&mut payload, value)?;
        entries.push((to_u32(offset, "document")?, tag));
    }

    let size = to_u32(header_len + payload.len(), "document")?;
    out.reserve(size as usize);
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&to_u32(fields.len(), "field count")?.to_le_bytes());
    out.extend_from_slice(&to_u32(header_len, "document")?.to_le_bytes());
    for ((name, _), (offset, tag)) in fields.iter().zip(entries) {
        out.extend_from_slice(&offset.to_le_bytes());
        out.push(tag as u8);
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
    }
    out.extend_from_slice(&payload);
    Ok(())
}

fn write_array(out: &mut Vec<u8>, array: &dyn Array) -> Result<(), Error> {
    let values = array.values().collect::<Result<Vec<_>, Error>>()?;

    let header_len = ARRAY_HEADER_LEN + ARRAY_ENTRY_LEN * values.len();
    let mut payload = Vec::new();
    let mut entries = Vec::with_capacity(values.len());
    for value in &values {
        let offset = header_len + payload.len();
        let tag = write_value(&mut payload, value)?;
        entries.push((tag, to_u32(offset, "array")?));
    }

    let size = to_u32(header_len + payload.len(), "array")?;
    out.reserve(size as usize);
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&to_u32(values.len(), "element count")?.to_le_bytes());
    for (tag, offset) in entries {
        out.push(tag as u8);
        out.extend_from_slice(&offset.to_le_bytes());
    }
    out.extend_from_slice(&payload);
    Ok(())
}

/// Append the payload of `value` and return its tag.
fn write_value(out: &mut Vec<u8>, value: &Value) -> Result<ValueTag, Error> {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push(*b as u8),
        Value::Integer(i) => out.extend_from_slice(&i.to_le_bytes()),
        Value::Double(f) => out.extend_from_slice(&f.to_bits().to_le_bytes()),
        Value::Duration(d) => out.extend_from_slice(&d.to_le_bytes()),
        Value::Text(s) => out.extend_from_slice(s.as_bytes()),
        Value::Blob(b) => out.extend_from_slice(b),
        Value::Array(a) => write_array(out, a.as_ref())?,
        Value::Document(d) => write_document(out, d.as_ref())?,
    }
    Ok(ValueTag::from(value.value_type()))
}

/// A document read lazily from its binary encoding.
///
/// Every read parses the header again; no state is cached between calls.
#[derive(Clone)]
pub struct EncodedDocument {
    data: Bytes,
}

#[derive(Debug, Clone, Copy)]
struct DocumentHeader {
    field_count: usize,
    payload_start: usize,
}

#[derive(Debug, Clone, Copy)]
struct FieldEntry<'a> {
    name: &'a str,
    tag: ValueTag,
    offset: usize,
}

impl EncodedDocument {
    /// Wrap encoded bytes.
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    /// The encoded bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    fn header(&self) -> Result<DocumentHeader, Error> {
        let data = &self.data[..];
        let size = read_u32(data, 0)?;
        if size != data.len() {
            return Err(corrupt(format!(
                "document size is {} but {} bytes are available",
                size,
                data.len()
            )));
        }
        let field_count = read_u32(data, 4)?;
        let payload_start = read_u32(data, 8)?;
        let min_header = field_count
            .checked_mul(DOCUMENT_ENTRY_LEN)
            .and_then(|n| n.checked_add(DOCUMENT_HEADER_LEN));
        match min_header {
            Some(min) if min <= payload_start && payload_start <= data.len() => Ok(DocumentHeader {
                field_count,
                payload_start,
            }),
            _ => Err(corrupt("invalid document header")),
        }
    }

    fn entries(&self) -> Result<EntryReader<'_>, Error> {
        let header = self.header()?;
        Ok(EntryReader {
            data: &self.data,
            header,
            cursor: DOCUMENT_HEADER_LEN,
            read: 0,
            last_offset: header.payload_start,
        })
    }

    /// Find the field and the end of its value without decoding anything.
    fn locate(&self, field: &str) -> Result<Option<(FieldEntry<'_>, usize)>, Error> {
        let mut reader = self.entries()?;
        while let Some(entry) = reader.next_entry()? {
            if entry.name == field {
                let end = reader.next_entry()?.map_or(self.data.len(), |e| e.offset);
                return Ok(Some((entry, end)));
            }
        }
        Ok(None)
    }
}

struct EntryReader<'a> {
    data: &'a [u8],
    header: DocumentHeader,
    cursor: usize,
    read: usize,
    last_offset: usize,
}

impl<'a> EntryReader<'a> {
    fn next_entry(&mut self) -> Result<Option<FieldEntry<'a>>, Error> {
        if self.read == self.header.field_count {
            return Ok(None);
        }
        let offset = read_u32(self.data, self.cursor)?;
        let tag = ValueTag::try_from(read_u8(self.data, self.cursor + 4)?)?;
        let name_len = read_u16(self.data, self.cursor + 5)?;
        let name_start = self.cursor + DOCUMENT_ENTRY_LEN;
        let name_end = name_start + name_len;
        if name_end > self.header.payload_start {
            return Err(corrupt("field directory overlaps payload"));
        }
        let name = std::str::from_utf8(&self.data[name_start..name_end])
            .map_err(|_| corrupt("invalid UTF-8 in field name"))?;
        if offset < self.last_offset || offset > self.data.len() {
            return Err(corrupt(format!("invalid offset for field {:?}", name)));
        }
        self.cursor = name_end;
        self.read += 1;
        self.last_offset = offset;
        Ok(Some(FieldEntry { name, tag, offset }))
    }
}

/// Walks the fields, decoding each value from its own span only.
struct FieldIter<'a> {
    data: &'a Bytes,
    reader: EntryReader<'a>,
    pending: Option<FieldEntry<'a>>,
    done: bool,
}

impl<'a> FieldIter<'a> {
    fn step(&mut self) -> Result<Option<(Cow<'a, str>, Value)>, Error> {
        let current = match self.pending.take() {
            Some(entry) => entry,
            None => match self.reader.next_entry()? {
                Some(entry) => entry,
                None => return Ok(None),
            },
        };
        self.pending = self.reader.next_entry()?;
        let end = self.pending.map_or(self.data.len(), |e| e.offset);
        let value = decode_value(self.data, current.tag, current.offset, end)?;
        Ok(Some((Cow::Borrowed(current.name), value)))
    }
}

impl<'a> Iterator for FieldIter<'a> {
    type Item = Result<(Cow<'a, str>, Value), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(field)) => Some(Ok(field)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl Document for EncodedDocument {
    fn fields(&self) -> Fields<'_> {
        match self.entries() {
            Ok(reader) => Box::new(FieldIter {
                data: &self.data,
                reader,
                pending: None,
                done: false,
            }),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn get_by_field(&self, field: &str) -> Result<Value, Error> {
        let (entry, end) = self.locate(field)?.ok_or(Error::FieldNotFound)?;
        decode_value(&self.data, entry.tag, entry.offset, end)
    }

    fn len(&self) -> Result<usize, Error> {
        Ok(self.header()?.field_count)
    }
}

impl fmt::Debug for EncodedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedDocument")
            .field("size", &self.data.len())
            .finish()
    }
}

/// An array read lazily from its binary encoding.
#[derive(Clone)]
pub struct EncodedArray {
    data: Bytes,
}

impl EncodedArray {
    /// Wrap encoded bytes.
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    /// Element count, after checking the header is consistent.
    fn header(&self) -> Result<usize, Error> {
        let data = &self.data[..];
        let size = read_u32(data, 0)?;
        if size != data.len() {
            return Err(corrupt(format!(
                "array size is {} but {} bytes are available",
                size,
                data.len()
            )));
        }
        let count = read_u32(data, 4)?;
        match count
            .checked_mul(ARRAY_ENTRY_LEN)
            .and_then(|n| n.checked_add(ARRAY_HEADER_LEN))
        {
            Some(payload_start) if payload_start <= data.len() => Ok(count),
            _ => Err(corrupt("invalid array header")),
        }
    }

    fn entry(&self, index: usize) -> Result<(ValueTag, usize), Error> {
        let at = ARRAY_HEADER_LEN + index * ARRAY_ENTRY_LEN;
        let tag = ValueTag::try_from(read_u8(&self.data, at)?)?;
        let offset = read_u32(&self.data, at + 1)?;
        Ok((tag, offset))
    }

    fn element(&self, index: usize, count: usize) -> Result<Value, Error> {
        let payload_start = ARRAY_HEADER_LEN + count * ARRAY_ENTRY_LEN;
        let (tag, start) = self.entry(index)?;
        let end = if index + 1 < count {
            self.entry(index + 1)?.1
        } else {
            self.data.len()
        };
        if start < payload_start || start > end {
            return Err(corrupt(format!("invalid offset for element {}", index)));
        }
        decode_value(&self.data, tag, start, end)
    }
}

impl Array for EncodedArray {
    fn values(&self) -> Values<'_> {
        match self.header() {
            Ok(count) => Box::new((0..count).map(move |i| self.element(i, count))),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn get_by_index(&self, index: usize) -> Result<Value, Error> {
        let count = self.header()?;
        if index >= count {
            return Err(Error::ValueNotFound);
        }
        self.element(index, count)
    }

    fn len(&self) -> Result<usize, Error> {
        self.header()
    }
}

impl fmt::Debug for EncodedArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedArray")
            .field("size", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldBuffer, ValueBuffer};

    fn encode(doc: &dyn Document) -> Bytes {
        Bytes::from(BinaryCodec.encode(doc).unwrap())
    }

    fn sample() -> FieldBuffer {
        FieldBuffer::new()
            .with_field("a", 1)
            .with_field("b", "hello")
            .with_field("c", ValueBuffer::new().with_value(true).with_value(2.5))
            .with_field("d", FieldBuffer::new().with_field("e", Value::Null))
    }

    #[test]
    fn test_codec_entry_points() {
        let codec: &dyn Codec = &BinaryCodec::new();
        let mut out = Vec::new();
        codec.new_encoder(&mut out).encode_document(&sample()).unwrap();
        let doc = codec.new_document(Bytes::from(out));
        assert_eq!(doc.get_by_field("b").unwrap(), Value::text("hello"));
    }

    #[test]
    fn test_header_layout() {
        let data = encode(&FieldBuffer::new().with_field("x", 7));
        // 12 header + 7 entry + 1 name + 8 payload
        assert_eq!(data.len(), 28);
        assert_eq!(read_u32(&data, 0).unwrap(), 28);
        assert_eq!(read_u32(&data, 4).unwrap(), 1);
        assert_eq!(read_u32(&data, 8).unwrap(), 20);
        assert_eq!(read_u32(&data, 12).unwrap(), 20);
        assert_eq!(data[16], ValueTag::Integer as u8);
    }

    #[test]
    fn test_empty_containers() {
        let doc = FieldBuffer::new()
            .with_field("d", FieldBuffer::new())
            .with_field("a", ValueBuffer::new())
            .with_field("t", "")
            .with_field("b", Vec::<u8>::new());
        let decoded = EncodedDocument::new(encode(&doc));
        assert_eq!(decoded.len().unwrap(), 4);
        assert_eq!(decoded.get_by_field("d").unwrap().as_document().unwrap().len().unwrap(), 0);
        assert_eq!(decoded.get_by_field("a").unwrap().as_array().unwrap().len().unwrap(), 0);
        assert_eq!(decoded.get_by_field("t").unwrap(), Value::text(""));
        assert_eq!(decoded.get_by_field("b").unwrap(), Value::Blob(vec![]));
    }

    #[test]
    fn test_nested_values_stay_encoded() {
        let decoded = EncodedDocument::new(encode(&sample()));
        let nested = decoded.get_by_field("d").unwrap();
        let nested = nested.as_document().unwrap();
        assert!(format!("{:?}", nested).starts_with("EncodedDocument"));

        let arr = decoded.get_by_field("c").unwrap();
        assert!(format!("{:?}", arr.as_array().unwrap()).starts_with("EncodedArray"));
    }

    #[test]
    fn test_reads_are_repeatable() {
        let data = encode(&sample());
        let snapshot = data.clone();
        let decoded = EncodedDocument::new(data);
        for _ in 0..3 {
            assert_eq!(decoded.get_by_field("a").unwrap(), Value::Integer(1));
            assert_eq!(decoded.len().unwrap(), 4);
            let names: Vec<String> = decoded
                .fields()
                .map(|f| f.unwrap().0.into_owned())
                .collect();
            assert_eq!(names, vec!["a", "b", "c", "d"]);
        }
        assert_eq!(decoded.bytes(), &snapshot);
    }

    #[test]
    fn test_truncated_input_is_corrupt() {
        let data = encode(&sample());
        for cut in 0..data.len() {
            let decoded = EncodedDocument::new(data.slice(..cut));
            let results: Vec<_> = decoded.fields().collect();
            assert!(
                results
                    .iter()
                    .any(|r| matches!(r, Err(Error::CorruptEncoding(_)))),
                "prefix of {} bytes decoded without error",
                cut
            );
            assert!(matches!(
                decoded.get_by_field("a"),
                Err(Error::CorruptEncoding(_))
            ));
        }
    }

    #[test]
    fn test_unknown_tag_is_corrupt() {
        let mut raw = encode(&FieldBuffer::new().with_field("x", 7)).to_vec();
        raw[16] = 42;
        let decoded = EncodedDocument::new(Bytes::from(raw));
        assert!(matches!(
            decoded.get_by_field("x"),
            Err(Error::CorruptEncoding(_))
        ));
    }

    #[test]
    fn test_invalid_bool_is_corrupt() {
        let mut raw = encode(&FieldBuffer::new().with_field("x", true)).to_vec();
        let last = raw.len() - 1;
        raw[last] = 7;
        let decoded = EncodedDocument::new(Bytes::from(raw));
        assert!(matches!(
            decoded.get_by_field("x"),
            Err(Error::CorruptEncoding(_))
        ));
    }

    #[test]
    fn test_array_out_of_range() {
        let arr = ValueBuffer::new().with_value(1).with_value("x");
        let decoded = EncodedDocument::new(encode(&FieldBuffer::new().with_field("arr", arr)));
        let value = decoded.get_by_field("arr").unwrap();
        let arr = value.as_array().unwrap();
        assert_eq!(arr.get_by_index(1).unwrap(), Value::text("x"));
        assert!(matches!(arr.get_by_index(2), Err(Error::ValueNotFound)));
        assert!(matches!(arr.get_by_index(usize::MAX), Err(Error::ValueNotFound)));
    }

    #[test]
    fn test_field_name_too_long() {
        let name = "n".repeat(u16::MAX as usize + 1);
        let doc = FieldBuffer::new().with_field(name, 1);
        let mut out = Vec::new();
        let err = BinaryCodec.new_encoder(&mut out).encode_document(&doc).unwrap_err();
        assert!(matches!(err, Error::TooLarge(_)));
        assert!(out.is_empty());
    }
}
