//! JSON rendering and parsing of values and documents.
//!
//! Rendering preserves field and element order. Blobs are rendered as
//! `"\x<hex>"` strings and durations as `"<n>ns"` strings; parsing does not
//! map them back.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{self, Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::array::{Array, ValueBuffer};
use crate::document::{Document, FieldBuffer};
use crate::error::Error;
use crate::value::{format_duration, Value};

/// Render a document as a JSON object.
pub fn to_json(document: &dyn Document) -> Result<String, Error> {
    Ok(serde_json::to_string(&DocumentRef(document))?)
}

/// Render a document as a `serde_json::Value`.
pub fn to_json_value(document: &dyn Document) -> Result<serde_json::Value, Error> {
    Ok(serde_json::to_value(DocumentRef(document))?)
}

/// Serializes any document by reference.
pub struct DocumentRef<'a>(pub &'a dyn Document);

struct ArrayRef<'a>(&'a dyn Array);

impl Serialize for DocumentRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.0.len().map_err(ser::Error::custom)?;
        let mut map = serializer.serialize_map(Some(len))?;
        for field in self.0.fields() {
            let (name, value) = field.map_err(ser::Error::custom)?;
            map.serialize_entry(name.as_ref(), &value)?;
        }
        map.end()
    }
}

impl Serialize for ArrayRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.0.len().map_err(ser::Error::custom)?;
        let mut seq = serializer.serialize_seq(Some(len))?;
        for value in self.0.values() {
            seq.serialize_element(&value.map_err(ser::Error::custom)?)?;
        }
        seq.end()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Double(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(b) => serializer.serialize_str(&format!("\\x{}", hex::encode(b))),
            Value::Duration(d) => serializer.serialize_str(&format_duration(*d)),
            Value::Array(a) => ArrayRef(a.as_ref()).serialize(serializer),
            Value::Document(d) => DocumentRef(d.as_ref()).serialize(serializer),
        }
    }
}

impl Serialize for FieldBuffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        DocumentRef(self).serialize(serializer)
    }
}

impl Serialize for ValueBuffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ArrayRef(self).serialize(serializer)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(match i64::try_from(v) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Double(v as f64),
        })
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Double(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::Text(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut buf = ValueBuffer::new();
        while let Some(value) = seq.next_element::<Value>()? {
            buf.append(value);
        }
        Ok(Value::array(buf))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Value, A::Error> {
        Ok(Value::document(read_fields(map)?))
    }
}

fn read_fields<'de, A: MapAccess<'de>>(mut map: A) -> Result<FieldBuffer, A::Error> {
    let mut buf = FieldBuffer::with_capacity(map.size_hint().unwrap_or(0));
    while let Some((name, value)) = map.next_entry::<String, Value>()? {
        buf.set(name, value);
    }
    Ok(buf)
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct FieldBufferVisitor;

impl<'de> Visitor<'de> for FieldBufferVisitor {
    type Value = FieldBuffer;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<FieldBuffer, A::Error> {
        read_fields(map)
    }
}

impl<'de> Deserialize<'de> for FieldBuffer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FieldBufferVisitor)
    }
}

impl FieldBuffer {
    /// Parse a JSON object into a buffer, keeping field order.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_preserves_order() {
        let doc = FieldBuffer::new()
            .with_field("z", 1)
            .with_field("a", ValueBuffer::new().with_value(Value::Null).with_value(2.5))
            .with_field("m", FieldBuffer::new().with_field("x", true));
        assert_eq!(
            to_json(&doc).unwrap(),
            r#"{"z":1,"a":[null,2.5],"m":{"x":true}}"#
        );
    }

    #[test]
    fn test_render_blob_and_duration() {
        let doc = FieldBuffer::new()
            .with_field("b", vec![0xde_u8, 0xad])
            .with_field("d", Value::Duration(1500));
        assert_eq!(to_json(&doc).unwrap(), r#"{"b":"\\xdead","d":"1500ns"}"#);
    }

    #[test]
    fn test_parse_keeps_field_order() {
        let doc = FieldBuffer::from_json(r#"{"b": 1, "a": {"c": [1, "x", null]}, "big": 18446744073709551615}"#)
            .unwrap();
        let names: Vec<&str> = doc.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a", "big"]);
        assert_eq!(doc.get("b"), Some(&Value::Integer(1)));
        assert_eq!(doc.get("big"), Some(&Value::Double(u64::MAX as f64)));
        let nested = doc.get("a").unwrap().as_document().unwrap();
        assert_eq!(to_json(nested.as_ref()).unwrap(), r#"{"c":[1,"x",null]}"#);
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(matches!(FieldBuffer::from_json("[1, 2]"), Err(Error::Json(_))));
    }
}
