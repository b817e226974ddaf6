//! Runtime value types for documents.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::array::{Array, ValueBuffer};
use crate::document::{Document, FieldBuffer};
use crate::error::Error;

/// The type tag of a [`Value`].
///
/// Variants are declared in sort order: when values of different types are
/// sorted, they are grouped by type following this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    Null,
    Bool,
    Integer,
    Double,
    Text,
    Blob,
    Duration,
    Array,
    Document,
}

impl ValueType {
    /// Integers and doubles.
    pub fn is_number(self) -> bool {
        matches!(self, ValueType::Integer | ValueType::Double)
    }

    /// Arrays and documents.
    pub fn is_composite(self) -> bool {
        matches!(self, ValueType::Array | ValueType::Document)
    }

    /// Lower-case name of the type.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Integer => "integer",
            ValueType::Double => "double",
            ValueType::Text => "text",
            ValueType::Blob => "blob",
            ValueType::Duration => "duration",
            ValueType::Array => "array",
            ValueType::Document => "document",
        }
    }

    /// Rank used to order values of different types. Numbers share a rank.
    fn sort_rank(self) -> u8 {
        match self {
            ValueType::Null => 0,
            ValueType::Bool => 1,
            ValueType::Integer | ValueType::Double => 2,
            ValueType::Text => 3,
            ValueType::Blob => 4,
            ValueType::Duration => 5,
            ValueType::Array => 6,
            ValueType::Document => 7,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single typed datum.
///
/// Composite values hold a shared handle to their array or document, so
/// wrapping a buffer (or an encoded view) in a `Value` never copies it.
#[derive(Debug, Clone)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit floating point.
    Double(f64),
    /// UTF-8 text.
    Text(String),
    /// Binary data.
    Blob(Vec<u8>),
    /// Duration in nanoseconds.
    Duration(i64),
    /// Ordered sequence of values.
    Array(Arc<dyn Array>),
    /// Nested document.
    Document(Arc<dyn Document>),
}

impl Value {
    /// Wrap an array.
    pub fn array(array: impl Array + 'static) -> Self {
        Value::Array(Arc::new(array))
    }

    /// Wrap a document.
    pub fn document(document: impl Document + 'static) -> Self {
        Value::Document(Arc::new(document))
    }

    /// Create a text value.
    pub fn text(text: impl Into<String>) -> Self {
        Value::Text(text.into())
    }

    /// The type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Integer(_) => ValueType::Integer,
            Value::Double(_) => ValueType::Double,
            Value::Text(_) => ValueType::Text,
            Value::Blob(_) => ValueType::Blob,
            Value::Duration(_) => ValueType::Duration,
            Value::Array(_) => ValueType::Array,
            Value::Document(_) => ValueType::Document,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn mismatch(&self, expected: ValueType) -> Error {
        Error::TypeMismatch {
            expected,
            actual: self.value_type(),
        }
    }

    /// Get as bool.
    pub fn as_bool(&self) -> Result<bool, Error> {
        match self {
            Value::Bool(b) => Ok(*b),
            _ => Err(self.mismatch(ValueType::Bool)),
        }
    }

    /// Get as integer.
    pub fn as_integer(&self) -> Result<i64, Error> {
        match self {
            Value::Integer(i) => Ok(*i),
            _ => Err(self.mismatch(ValueType::Integer)),
        }
    }

    /// Get as double. Integers are widened.
    pub fn as_double(&self) -> Result<f64, Error> {
        match self {
            Value::Double(f) => Ok(*f),
            Value::Integer(i) => Ok(*i as f64),
            _ => Err(self.mismatch(ValueType::Double)),
        }
    }

    /// Get as text.
    pub fn as_text(&self) -> Result<&str, Error> {
        match self {
            Value::Text(s) => Ok(s),
            _ => Err(self.mismatch(ValueType::Text)),
        }
    }

    /// Get as blob.
    pub fn as_blob(&self) -> Result<&[u8], Error> {
        match self {
            Value::Blob(b) => Ok(b),
            _ => Err(self.mismatch(ValueType::Blob)),
        }
    }

    /// Get as duration in nanoseconds.
    pub fn as_duration(&self) -> Result<i64, Error> {
        match self {
            Value::Duration(d) => Ok(*d),
            _ => Err(self.mismatch(ValueType::Duration)),
        }
    }

    /// Get as array.
    pub fn as_array(&self) -> Result<&Arc<dyn Array>, Error> {
        match self {
            Value::Array(a) => Ok(a),
            _ => Err(self.mismatch(ValueType::Array)),
        }
    }

    /// Get as document.
    pub fn as_document(&self) -> Result<&Arc<dyn Document>, Error> {
        match self {
            Value::Document(d) => Ok(d),
            _ => Err(self.mismatch(ValueType::Document)),
        }
    }

    /// Whether the value counts as true in a boolean context.
    ///
    /// Null, zero, empty text/blob and empty composites are falsy.
    pub fn is_truthy(&self) -> Result<bool, Error> {
        Ok(match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Double(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Blob(b) => !b.is_empty(),
            Value::Duration(d) => *d != 0,
            Value::Array(a) => a.len()? > 0,
            Value::Document(d) => d.len()? > 0,
        })
    }

    /// Type-aware equality used by expressions.
    ///
    /// Numbers compare by numeric value regardless of width; composites
    /// compare element by element. Values of other differing types are never
    /// equal.
    pub fn is_equal(&self, other: &Value) -> Result<bool, Error> {
        match (self, other) {
            (Value::Integer(a), Value::Double(b)) => Ok((*a as f64) == *b),
            (Value::Double(a), Value::Integer(b)) => Ok(*a == (*b as f64)),
            (Value::Array(a), Value::Array(b)) => {
                let mut left = a.values();
                let mut right = b.values();
                loop {
                    match (left.next(), right.next()) {
                        (None, None) => return Ok(true),
                        (Some(l), Some(r)) => {
                            if !l?.is_equal(&r?)? {
                                return Ok(false);
                            }
                        }
                        _ => return Ok(false),
                    }
                }
            }
            (Value::Document(a), Value::Document(b)) => {
                let mut left = a.fields();
                let mut right = b.fields();
                loop {
                    match (left.next(), right.next()) {
                        (None, None) => return Ok(true),
                        (Some(l), Some(r)) => {
                            let (ln, lv) = l?;
                            let (rn, rv) = r?;
                            if ln != rn || !lv.is_equal(&rv)? {
                                return Ok(false);
                            }
                        }
                        _ => return Ok(false),
                    }
                }
            }
            _ => Ok(self == other),
        }
    }

    /// Type-aware ordering used by comparison operators.
    ///
    /// Returns `None` when the values are not comparable: either side is
    /// null, the types differ (numbers excepted), or one side is a document.
    pub fn compare(&self, other: &Value) -> Result<Option<Ordering>, Error> {
        Ok(match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
            (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
            (Value::Array(a), Value::Array(b)) => {
                let mut left = a.values();
                let mut right = b.values();
                loop {
                    match (left.next(), right.next()) {
                        (None, None) => break Some(Ordering::Equal),
                        (None, Some(_)) => break Some(Ordering::Less),
                        (Some(_), None) => break Some(Ordering::Greater),
                        (Some(l), Some(r)) => match l?.compare(&r?)? {
                            Some(Ordering::Equal) => continue,
                            other => break other,
                        },
                    }
                }
            }
            _ => None,
        })
    }

    /// Total order used for sorting.
    ///
    /// Values are grouped by type first; incomparable values of the same
    /// group are considered equal so that sorting stays stable.
    pub fn sort_cmp(&self, other: &Value) -> Result<Ordering, Error> {
        let (lr, rr) = (
            self.value_type().sort_rank(),
            other.value_type().sort_rank(),
        );
        if lr != rr {
            return Ok(lr.cmp(&rr));
        }
        Ok(self.compare(other)?.unwrap_or(Ordering::Equal))
    }
}

impl PartialEq for Value {
    /// Strict equality: same type and same payload, recursively.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                let mut left = a.values();
                let mut right = b.values();
                loop {
                    match (left.next(), right.next()) {
                        (None, None) => return true,
                        (Some(Ok(l)), Some(Ok(r))) if l == r => continue,
                        _ => return false,
                    }
                }
            }
            (Value::Document(a), Value::Document(b)) => {
                let mut left = a.fields();
                let mut right = b.fields();
                loop {
                    match (left.next(), right.next()) {
                        (None, None) => return true,
                        (Some(Ok((ln, lv))), Some(Ok((rn, rv)))) if ln == rn && lv == rv => {
                            continue
                        }
                        _ => return false,
                    }
                }
            }
            _ => false,
        }
    }
}

/// Format a duration the way it is rendered in JSON and plans.
pub fn format_duration(nanos: i64) -> String {
    format!("{}ns", nanos)
}

fn write_text_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("\"")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Double(d) => {
                if d.is_finite() && d.fract() == 0.0 {
                    write!(f, "{:.1}", d)
                } else {
                    write!(f, "{}", d)
                }
            }
            Value::Text(s) => write_text_literal(f, s),
            Value::Blob(b) => write!(f, "\"\\x{}\"", hex::encode(b)),
            Value::Duration(d) => f.write_str(&format_duration(*d)),
            Value::Array(a) => {
                f.write_str("[")?;
                for (i, v) in a.values().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    let v = v.map_err(|_| fmt::Error)?;
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
            Value::Document(d) => {
                f.write_str("{")?;
                for (i, entry) in d.fields().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    let (name, v) = entry.map_err(|_| fmt::Error)?;
                    write!(f, "{}: {}", name, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

// Conversion implementations
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<std::time::Duration> for Value {
    fn from(v: std::time::Duration) -> Self {
        Value::Duration(i64::try_from(v.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl From<FieldBuffer> for Value {
    fn from(v: FieldBuffer) -> Self {
        Value::document(v)
    }
}

impl From<ValueBuffer> for Value {
    fn from(v: ValueBuffer) -> Self {
        Value::array(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Bool(true).as_bool().unwrap(), true);
        assert_eq!(Value::Integer(42).as_integer().unwrap(), 42);
        assert_eq!(Value::Integer(42).as_double().unwrap(), 42.0);
        assert_eq!(Value::text("hello").as_text().unwrap(), "hello");
        assert_eq!(Value::Blob(vec![1, 2]).as_blob().unwrap(), &[1, 2][..]);
        assert_eq!(Value::Duration(10).as_duration().unwrap(), 10);
    }

    #[test]
    fn test_accessor_type_mismatch() {
        let err = Value::text("x").as_integer().unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch {
                expected: ValueType::Integer,
                actual: ValueType::Text
            }
        ));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_strict_equality() {
        assert_eq!(Value::Integer(10), Value::Integer(10));
        assert_ne!(Value::Integer(10), Value::Double(10.0));
        assert_ne!(Value::Null, Value::Bool(false));

        let a = Value::from(ValueBuffer::new().with_value(1).with_value("a"));
        let b = Value::from(ValueBuffer::new().with_value(1).with_value("a"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_numeric_comparison_ignores_width() {
        assert!(Value::Integer(10).is_equal(&Value::Double(10.0)).unwrap());
        assert_eq!(
            Value::Integer(1).compare(&Value::Double(1.5)).unwrap(),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Integer(1).compare(&Value::text("1")).unwrap(), None);
        assert_eq!(Value::Null.compare(&Value::Null).unwrap(), None);
    }

    #[test]
    fn test_sort_groups_types() {
        let mut values = vec![
            Value::text("b"),
            Value::Integer(3),
            Value::Null,
            Value::Double(1.5),
            Value::Bool(true),
            Value::text("a"),
        ];
        values.sort_by(|a, b| a.sort_cmp(b).unwrap());
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Double(1.5),
                Value::Integer(3),
                Value::text("a"),
                Value::text("b"),
            ]
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy().unwrap());
        assert!(!Value::Integer(0).is_truthy().unwrap());
        assert!(Value::Double(0.5).is_truthy().unwrap());
        assert!(!Value::text("").is_truthy().unwrap());
        assert!(!Value::from(FieldBuffer::new()).is_truthy().unwrap());
        assert!(Value::from(FieldBuffer::new().with_field("a", 1)).is_truthy().unwrap());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Double(3.0).to_string(), "3.0");
        assert_eq!(Value::text("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(Value::Duration(10).to_string(), "10ns");
        let doc = FieldBuffer::new()
            .with_field("a", 1)
            .with_field("b", ValueBuffer::new().with_value(true));
        assert_eq!(Value::from(doc).to_string(), "{a: 1, b: [true]}");
    }

    #[test]
    fn test_value_conversions() {
        let v: Value = None::<i64>.into();
        assert_eq!(v, Value::Null);
        let v: Value = std::time::Duration::from_nanos(10).into();
        assert_eq!(v, Value::Duration(10));
    }
}
