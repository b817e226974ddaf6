//! Order-preserving key encoding for scalar values.
//!
//! Encoded keys compare bytewise in the same order as [`Value::compare`] for
//! values of the same type group, and every encoding is self-delimiting, so a
//! key can be followed by other bytes (an index entry appends the primary
//! key) without changing the order.
//!
//! Key format: `[type prefix (1 byte)][payload]`
//! - Null: no payload
//! - Bool: 1 byte
//! - Integer and Double: 16 bytes, the value as an ordered f64, then the
//!   signed distance from that f64 to the exact value (zero for doubles)
//! - Duration: 8 bytes, sign-flipped big-endian
//! - Text and Blob: escaped bytes (`0x00` becomes `0x00 0xFF`), then `0x00 0x01`

use lodedb_document::{Value, ValueType};

use crate::error::Error;

const NULL_PREFIX: u8 = 0x05;
const BOOL_PREFIX: u8 = 0x10;
const NUMBER_PREFIX: u8 = 0x20;
const TEXT_PREFIX: u8 = 0x30;
const BLOB_PREFIX: u8 = 0x40;
const DURATION_PREFIX: u8 = 0x50;

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// The type prefix of a value's key.
///
/// Composite values have no key encoding.
pub fn type_prefix(value: &Value) -> Result<u8, Error> {
    match value.value_type() {
        ValueType::Null => Ok(NULL_PREFIX),
        ValueType::Bool => Ok(BOOL_PREFIX),
        ValueType::Integer | ValueType::Double => Ok(NUMBER_PREFIX),
        ValueType::Text => Ok(TEXT_PREFIX),
        ValueType::Blob => Ok(BLOB_PREFIX),
        ValueType::Duration => Ok(DURATION_PREFIX),
        ty @ (ValueType::Array | ValueType::Document) => {
            Err(lodedb_document::Error::UnsupportedType(ty).into())
        }
    }
}

/// Encode a value as a key.
pub fn encode_value(value: &Value) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(10);
    append_value(&mut out, value)?;
    Ok(out)
}

/// Append the key of a value to `out`.
pub fn append_value(out: &mut Vec<u8>, value: &Value) -> Result<(), Error> {
    out.push(type_prefix(value)?);
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push(*b as u8),
        Value::Integer(i) => {
            let f = *i as f64;
            out.extend_from_slice(&ordered_f64(f));
            // integers above 2^53 round; the remainder keeps them apart
            let rest = (*i as i128 - f as i128) as i64;
            out.extend_from_slice(&ordered_i64(rest));
        }
        Value::Double(f) => {
            out.extend_from_slice(&ordered_f64(*f));
            out.extend_from_slice(&ordered_i64(0));
        }
        Value::Duration(d) => out.extend_from_slice(&ordered_i64(*d)),
        Value::Text(s) => append_escaped(out, s.as_bytes()),
        Value::Blob(b) => append_escaped(out, b),
        Value::Array(_) | Value::Document(_) => {}
    }
    Ok(())
}

fn ordered_f64(f: f64) -> [u8; 8] {
    // -0.0 and 0.0 are equal and must share a key
    let f = if f == 0.0 { 0.0 } else { f };
    let bits = f.to_bits();
    let ordered = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };
    ordered.to_be_bytes()
}

fn ordered_i64(i: i64) -> [u8; 8] {
    ((i as u64) ^ (1 << 63)).to_be_bytes()
}

/// The key prefix shared by every value that compares equal to `value`.
///
/// Numbers are compared through f64, so an integer and a double that
/// compare equal may differ past the f64 part of their keys. Range scans
/// start and stop on this prefix and recheck the exact values.
pub fn encode_prefix(value: &Value) -> Result<Vec<u8>, Error> {
    let mut out = encode_value(value)?;
    if value.value_type().is_number() {
        out.truncate(1 + 8);
    }
    Ok(out)
}

fn append_escaped(out: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        out.push(b);
        if b == ESCAPE {
            out.push(ESCAPED_ZERO);
        }
    }
    out.push(ESCAPE);
    out.push(TERMINATOR);
}

/// The smallest key greater than every key starting with `prefix`.
///
/// Returns `None` if no such key exists (the prefix is all `0xFF`).
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut next = prefix.to_vec();
    while let Some(last) = next.pop() {
        if last < u8::MAX {
            next.push(last + 1);
            return Some(next);
        }
    }
    None
}

/// Key for a generated document id.
pub fn encode_sequence(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodedb_document::ValueBuffer;
    use std::cmp::Ordering;

    fn key(v: impl Into<Value>) -> Vec<u8> {
        encode_value(&v.into()).unwrap()
    }

    #[test]
    fn test_numbers_share_one_order() {
        let values = [
            Value::Double(f64::NEG_INFINITY),
            Value::Integer(-100),
            Value::Double(-1.5),
            Value::Integer(0),
            Value::Double(0.25),
            Value::Integer(1),
            Value::Double(1e10),
            Value::Integer(i64::MAX),
        ];
        for pair in values.windows(2) {
            assert!(key(pair[0].clone()) < key(pair[1].clone()), "{:?}", pair);
        }
        assert_eq!(key(10), key(10.0));
        assert_eq!(key(-0.0), key(0.0));
    }

    #[test]
    fn test_large_integers_keep_distinct_keys() {
        let a = Value::Integer(9007199254740992);
        let b = Value::Integer(9007199254740993);
        let c = Value::Integer(9007199254740994);
        assert!(key(a.clone()) < key(b.clone()));
        assert!(key(b.clone()) < key(c.clone()));
        assert!(key(i64::MAX - 1) < key(i64::MAX));
        assert!(key(i64::MIN) < key(i64::MIN + 1));
        assert_eq!(key(a.clone()), key(9007199254740992.0));

        // 2^53 + 1 rounds to 2^53 as a double
        assert_eq!(encode_prefix(&a).unwrap(), encode_prefix(&b).unwrap());
        assert!(key(a).starts_with(&encode_prefix(&b).unwrap()));
        assert_eq!(encode_prefix(&Value::text("x")).unwrap(), key("x"));
    }

    #[test]
    fn test_text_order_and_delimiting() {
        assert!(key("a") < key("ab"));
        assert!(key("ab") < key("b"));
        assert!(key("") < key("\0"));
        assert!(key("a\0") < key("a\0\0"));

        // a key followed by a suffix stays ordered against longer values
        let mut with_suffix = key("a");
        with_suffix.extend_from_slice(&[0xFF; 8]);
        assert!(with_suffix < key("a\0"));
    }

    #[test]
    fn test_order_matches_compare() {
        let values = [
            Value::Duration(-5),
            Value::Duration(0),
            Value::Duration(7),
            Value::Bool(false),
            Value::Bool(true),
            Value::Blob(vec![0]),
            Value::Blob(vec![0, 0]),
            Value::Blob(vec![1]),
        ];
        for a in &values {
            for b in &values {
                if let Some(ord) = a.compare(b).unwrap() {
                    assert_eq!(key(a.clone()).cmp(&key(b.clone())), ord, "{} vs {}", a, b);
                }
            }
        }
        assert_eq!(key(Value::Null).cmp(&key(false)), Ordering::Less);
    }

    #[test]
    fn test_composites_are_unsupported() {
        let err = encode_value(&Value::from(ValueBuffer::new())).unwrap_err();
        assert!(matches!(
            err,
            Error::Document(lodedb_document::Error::UnsupportedType(ValueType::Array))
        ));
    }

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor(&[1, 2]), Some(vec![1, 3]));
        assert_eq!(prefix_successor(&[1, 0xFF]), Some(vec![2]));
        assert_eq!(prefix_successor(&[0xFF]), None);
    }
}
