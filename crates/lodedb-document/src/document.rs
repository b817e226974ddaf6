//! The document capability and its in-memory realization.

use std::borrow::Cow;
use std::fmt;

use crate::array::ValueBuffer;
use crate::error::Error;
use crate::path::{Path, PathFragment};
use crate::value::Value;

/// Iterator over the fields of a document, in the order they were written.
pub type Fields<'a> = Box<dyn Iterator<Item = Result<(Cow<'a, str>, Value), Error>> + 'a>;

/// An ordered collection of uniquely named fields.
///
/// Implementations never mutate their backing storage when read, and every
/// read is independent: iterating twice yields the same fields.
pub trait Document: fmt::Debug + Send + Sync {
    /// Iterate over the fields in written order.
    ///
    /// Dropping the iterator stops the walk early.
    fn fields(&self) -> Fields<'_>;

    /// Get the value of a field.
    ///
    /// Fails with [`Error::FieldNotFound`] if the document has no such field.
    fn get_by_field(&self, field: &str) -> Result<Value, Error> {
        for entry in self.fields() {
            let (name, value) = entry?;
            if name == field {
                return Ok(value);
            }
        }
        Err(Error::FieldNotFound)
    }

    /// Call `visit` for each field in written order.
    ///
    /// Stops at, and returns, the first error raised by the visitor.
    fn iterate(&self, visit: &mut dyn FnMut(&str, Value) -> Result<(), Error>) -> Result<(), Error> {
        for entry in self.fields() {
            let (name, value) = entry?;
            visit(&name, value)?;
        }
        Ok(())
    }

    /// Number of fields.
    fn len(&self) -> Result<usize, Error> {
        let mut count = 0;
        for entry in self.fields() {
            entry?;
            count += 1;
        }
        Ok(count)
    }
}

/// A mutable, insertion-ordered document held in memory.
///
/// Used to build documents before they are encoded, and to hold the output of
/// projections and updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldBuffer {
    fields: Vec<(String, Value)>,
}

impl FieldBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` fields.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Append a field, builder style.
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add(field, value);
        self
    }

    /// Append a field.
    ///
    /// The name is not checked against existing fields; use [`set`](Self::set)
    /// to overwrite.
    pub fn add(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.push((field.into(), value.into()));
        self
    }

    /// Replace the value of a field, or append it if absent.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((field, value)),
        }
        self
    }

    /// Replace the value of an existing field.
    pub fn replace(&mut self, field: &str, value: impl Into<Value>) -> Result<(), Error> {
        let slot = self
            .fields
            .iter_mut()
            .find(|(name, _)| name == field)
            .ok_or(Error::FieldNotFound)?;
        slot.1 = value.into();
        Ok(())
    }

    /// Remove a field and return its value.
    pub fn delete(&mut self, field: &str) -> Result<Value, Error> {
        let idx = self
            .fields
            .iter()
            .position(|(name, _)| name == field)
            .ok_or(Error::FieldNotFound)?;
        Ok(self.fields.remove(idx).1)
    }

    /// Borrow the value of a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, v)| v)
    }

    /// Iterate over the fields without cloning.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Check if the buffer has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Remove every field.
    pub fn reset(&mut self) {
        self.fields.clear();
    }

    /// Consume the buffer and return its fields.
    pub fn into_inner(self) -> Vec<(String, Value)> {
        self.fields
    }

    /// Copy any document into a buffer.
    ///
    /// Nested documents and arrays are copied too, so the result does not
    /// borrow from encoded bytes.
    pub fn copy_from(document: &dyn Document) -> Result<Self, Error> {
        let mut buf = FieldBuffer::new();
        for entry in document.fields() {
            let (name, value) = entry?;
            buf.add(name.into_owned(), copy_value(value)?);
        }
        Ok(buf)
    }

    /// Set the value at `path`, creating the last field if needed.
    ///
    /// Intermediate fields must exist; otherwise [`Error::FieldNotFound`] or
    /// [`Error::ValueNotFound`] is returned.
    pub fn set_path(&mut self, path: &Path, value: Value) -> Result<(), Error> {
        let (name, rest) = split_root(path)?;
        let updated = if rest.is_empty() {
            value
        } else {
            let current = self.get(name).cloned().ok_or(Error::FieldNotFound)?;
            set_in_value(current, rest, value)?
        };
        self.set(name.to_string(), updated);
        Ok(())
    }

    /// Remove the value at `path`.
    pub fn delete_path(&mut self, path: &Path) -> Result<(), Error> {
        let (name, rest) = split_root(path)?;
        if rest.is_empty() {
            self.delete(name)?;
            return Ok(());
        }
        let current = self.get(name).cloned().ok_or(Error::FieldNotFound)?;
        let updated = delete_in_value(current, rest)?;
        self.replace(name, updated)
    }
}

fn split_root(path: &Path) -> Result<(&str, &[PathFragment]), Error> {
    match path.fragments().split_first() {
        Some((PathFragment::Field(name), rest)) => Ok((name.as_str(), rest)),
        Some((PathFragment::Index(_), _)) => Err(Error::InvalidPath(format!(
            "document path must start with a field: {}",
            path
        ))),
        None => Err(Error::InvalidPath("empty path".into())),
    }
}

fn set_in_value(current: Value, path: &[PathFragment], value: Value) -> Result<Value, Error> {
    let Some((fragment, rest)) = path.split_first() else {
        return Ok(value);
    };
    match (fragment, current) {
        (PathFragment::Field(name), Value::Document(doc)) => {
            let mut buf = FieldBuffer::copy_from(doc.as_ref())?;
            let updated = if rest.is_empty() {
                value
            } else {
                let child = buf.get(name).cloned().ok_or(Error::FieldNotFound)?;
                set_in_value(child, rest, value)?
            };
            buf.set(name.clone(), updated);
            Ok(Value::document(buf))
        }
        (PathFragment::Index(idx), Value::Array(arr)) => {
            let mut buf = ValueBuffer::copy_from(arr.as_ref())?;
            let child = buf.get(*idx).cloned().ok_or(Error::ValueNotFound)?;
            let updated = set_in_value(child, rest, value)?;
            buf.replace(*idx, updated)?;
            Ok(Value::array(buf))
        }
        (PathFragment::Field(_), _) => Err(Error::FieldNotFound),
        (PathFragment::Index(_), _) => Err(Error::ValueNotFound),
    }
}

fn delete_in_value(current: Value, path: &[PathFragment]) -> Result<Value, Error> {
    let Some((fragment, rest)) = path.split_first() else {
        return Ok(current);
    };
    match (fragment, current) {
        (PathFragment::Field(name), Value::Document(doc)) => {
            let mut buf = FieldBuffer::copy_from(doc.as_ref())?;
            if rest.is_empty() {
                buf.delete(name)?;
            } else {
                let child = buf.get(name).cloned().ok_or(Error::FieldNotFound)?;
                buf.replace(name, delete_in_value(child, rest)?)?;
            }
            Ok(Value::document(buf))
        }
        (PathFragment::Index(idx), Value::Array(arr)) => {
            let mut buf = ValueBuffer::copy_from(arr.as_ref())?;
            if rest.is_empty() {
                buf.delete(*idx)?;
            } else {
                let child = buf.get(*idx).cloned().ok_or(Error::ValueNotFound)?;
                buf.replace(*idx, delete_in_value(child, rest)?)?;
            }
            Ok(Value::array(buf))
        }
        (PathFragment::Field(_), _) => Err(Error::FieldNotFound),
        (PathFragment::Index(_), _) => Err(Error::ValueNotFound),
    }
}

/// Deep-copy composite values into in-memory buffers.
pub(crate) fn copy_value(value: Value) -> Result<Value, Error> {
    Ok(match value {
        Value::Document(doc) => Value::document(FieldBuffer::copy_from(doc.as_ref())?),
        Value::Array(arr) => Value::array(ValueBuffer::copy_from(arr.as_ref())?),
        other => other,
    })
}

impl Document for FieldBuffer {
    fn fields(&self) -> Fields<'_> {
        Box::new(
            self.fields
                .iter()
                .map(|(name, value)| Ok((Cow::Borrowed(name.as_str()), value.clone()))),
        )
    }

    fn get_by_field(&self, field: &str) -> Result<Value, Error> {
        self.get(field).cloned().ok_or(Error::FieldNotFound)
    }

    fn len(&self) -> Result<usize, Error> {
        Ok(self.fields.len())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for FieldBuffer {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut buf = FieldBuffer::new();
        for (k, v) in iter {
            buf.add(k, v);
        }
        buf
    }
}
