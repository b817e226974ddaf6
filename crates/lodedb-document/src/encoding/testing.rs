//! Conformance checks every [`Codec`] must pass.
//!
//! Other crates enable the `testing` feature and call [`test_codec`] from
//! their own tests.

use bytes::Bytes;

use super::Codec;
use crate::array::{Array, ValueBuffer};
use crate::document::{Document, FieldBuffer};
use crate::error::Error;
use crate::json::to_json;
use crate::value::Value;

/// Run the whole suite against a codec.
pub fn test_codec(codec: &dyn Codec) {
    check_round_trip(codec);
    check_new_document(codec);
    check_array_get_by_index(codec);
}

fn round_trip(codec: &dyn Codec, doc: &dyn Document) -> std::sync::Arc<dyn Document> {
    let mut buf = Vec::new();
    codec
        .new_encoder(&mut buf)
        .encode_document(doc)
        .expect("encoding failed");
    codec.new_document(Bytes::from(buf))
}

fn address() -> FieldBuffer {
    FieldBuffer::new()
        .with_field("city", "Ajaccio")
        .with_field("country", "France")
}

/// Decoded documents render to the same JSON as their source.
pub fn check_round_trip(codec: &dyn Codec) {
    let cases = vec![
        FieldBuffer::new(),
        FieldBuffer::new().with_field("age", 10),
        FieldBuffer::new()
            .with_field("null", Value::Null)
            .with_field("bool", false)
            .with_field("int", -42)
            .with_field("double", 3.25)
            .with_field("text", "")
            .with_field("blob", vec![0u8, 255])
            .with_field("duration", std::time::Duration::from_nanos(10)),
        FieldBuffer::new()
            .with_field("address", address())
            .with_field(
                "friends",
                ValueBuffer::new()
                    .with_value(FieldBuffer::new().with_field("name", "jack"))
                    .with_value(ValueBuffer::new().with_value(1).with_value("two")),
            ),
    ];

    for doc in &cases {
        let decoded = round_trip(codec, doc);
        assert_eq!(
            to_json(decoded.as_ref()).expect("json of decoded document"),
            to_json(doc).expect("json of source document"),
        );
        assert_eq!(Value::Document(decoded), Value::from(doc.clone()));
    }
}

/// Field access and iteration on a decoded document.
pub fn check_new_document(codec: &dyn Codec) {
    let doc = FieldBuffer::new()
        .with_field("age", 10)
        .with_field("name", "john")
        .with_field("address", address());
    let decoded = round_trip(codec, &doc);

    let mut names = Vec::new();
    decoded
        .iterate(&mut |name, _| {
            names.push(name.to_string());
            Ok(())
        })
        .expect("iterate failed");
    assert_eq!(names, vec!["age", "name", "address"]);

    assert_eq!(decoded.get_by_field("age").expect("age"), Value::Integer(10));
    assert_eq!(
        decoded.get_by_field("name").expect("name"),
        Value::text("john")
    );

    let nested = decoded.get_by_field("address").expect("address");
    let nested = nested.as_document().expect("address is a document");
    assert_eq!(
        to_json(nested.as_ref()).expect("json of address"),
        to_json(&address()).expect("json of source address"),
    );

    assert!(matches!(
        decoded.get_by_field("zip"),
        Err(Error::FieldNotFound)
    ));
}

/// Index access on a decoded array.
pub fn check_array_get_by_index(codec: &dyn Codec) {
    let expected = vec![
        Value::Integer(10),
        Value::Null,
        Value::text("john"),
        Value::Duration(10),
    ];
    let doc = FieldBuffer::new().with_field(
        "a",
        expected.iter().cloned().collect::<ValueBuffer>(),
    );
    let decoded = round_trip(codec, &doc);
    let value = decoded.get_by_field("a").expect("a");
    let arr = value.as_array().expect("a is an array");

    for (i, want) in expected.iter().enumerate() {
        assert_eq!(&arr.get_by_index(i).expect("element"), want);
    }
    assert_eq!(arr.len().expect("len"), expected.len());
    assert!(matches!(arr.get_by_index(1000), Err(Error::ValueNotFound)));
}
