//! The array capability and its in-memory realization.

use std::fmt;

use crate::document::copy_value;
use crate::error::Error;
use crate::value::Value;

/// Iterator over the elements of an array, in order.
pub type Values<'a> = Box<dyn Iterator<Item = Result<Value, Error>> + 'a>;

/// An ordered sequence of values addressable by zero-based index.
pub trait Array: fmt::Debug + Send + Sync {
    /// Iterate over the elements in order.
    fn values(&self) -> Values<'_>;

    /// Get the element at `index`.
    ///
    /// Fails with [`Error::ValueNotFound`] when `index` is out of bounds.
    fn get_by_index(&self, index: usize) -> Result<Value, Error> {
        self.values().nth(index).unwrap_or(Err(Error::ValueNotFound))
    }

    /// Call `visit` for each element, stopping at the first error.
    fn iterate(&self, visit: &mut dyn FnMut(usize, Value) -> Result<(), Error>) -> Result<(), Error> {
        for (i, value) in self.values().enumerate() {
            visit(i, value?)?;
        }
        Ok(())
    }

    /// Number of elements.
    fn len(&self) -> Result<usize, Error> {
        let mut count = 0;
        for value in self.values() {
            value?;
            count += 1;
        }
        Ok(count)
    }
}

/// A mutable array held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueBuffer {
    values: Vec<Value>,
}

impl ValueBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, builder style.
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.append(value);
        self
    }

    /// Append a value.
    pub fn append(&mut self, value: impl Into<Value>) -> &mut Self {
        self.values.push(value.into());
        self
    }

    /// Borrow the element at `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Replace the element at `index`.
    pub fn replace(&mut self, index: usize, value: impl Into<Value>) -> Result<(), Error> {
        let slot = self.values.get_mut(index).ok_or(Error::ValueNotFound)?;
        *slot = value.into();
        Ok(())
    }

    /// Remove the element at `index`, shifting the following ones.
    pub fn delete(&mut self, index: usize) -> Result<Value, Error> {
        if index >= self.values.len() {
            return Err(Error::ValueNotFound);
        }
        Ok(self.values.remove(index))
    }

    /// Number of elements.
    pub fn element_count(&self) -> usize {
        self.values.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume the buffer and return its elements.
    pub fn into_inner(self) -> Vec<Value> {
        self.values
    }

    /// Deep-copy any array into a buffer.
    pub fn copy_from(array: &dyn Array) -> Result<Self, Error> {
        let mut buf = ValueBuffer::new();
        for value in array.values() {
            buf.append(copy_value(value?)?);
        }
        Ok(buf)
    }
}

impl Array for ValueBuffer {
    fn values(&self) -> Values<'_> {
        Box::new(self.values.iter().cloned().map(Ok))
    }

    fn get_by_index(&self, index: usize) -> Result<Value, Error> {
        self.values.get(index).cloned().ok_or(Error::ValueNotFound)
    }

    fn len(&self) -> Result<usize, Error> {
        Ok(self.values.len())
    }
}

impl<V: Into<Value>> FromIterator<V> for ValueBuffer {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(Into::into).collect(),
        }
    }
}
