//! Codec benchmarks: full encode, lazy field access, full decode.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lodedb_document::{
    to_json, Array, BinaryCodec, Codec, Document, EncodedDocument, FieldBuffer, Value, ValueBuffer,
};

fn wide_document(fields: usize) -> FieldBuffer {
    let mut doc = FieldBuffer::with_capacity(fields + 1);
    for i in 0..fields {
        doc.add(format!("field_{}", i), format!("value number {}", i));
    }
    doc.add(
        "tags",
        (0..fields as i64).map(Value::Integer).collect::<ValueBuffer>(),
    );
    doc
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/encode");

    for size in [8, 64, 512] {
        group.bench_with_input(BenchmarkId::new("binary", size), &size, |b, &size| {
            let doc = wide_document(size);
            let mut buf = Vec::with_capacity(64 * size);

            b.iter(|| {
                buf.clear();
                BinaryCodec
                    .new_encoder(&mut buf)
                    .encode_document(black_box(&doc))
                    .unwrap();
                black_box(buf.len());
            });
        });
    }

    group.finish();
}

fn bench_lazy_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/lazy");

    for size in [8, 64, 512] {
        let data = Bytes::from(BinaryCodec.encode(&wide_document(size)).unwrap());

        group.bench_with_input(BenchmarkId::new("get_by_field_last", size), &size, |b, &size| {
            let doc = EncodedDocument::new(data.clone());
            let name = format!("field_{}", size - 1);
            b.iter(|| black_box(doc.get_by_field(black_box(&name)).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("get_by_index_last", size), &size, |b, &size| {
            let doc = EncodedDocument::new(data.clone());
            b.iter(|| {
                let tags = doc.get_by_field("tags").unwrap();
                black_box(tags.as_array().unwrap().get_by_index(size - 1).unwrap())
            });
        });

        group.bench_with_input(BenchmarkId::new("to_json", size), &size, |b, _| {
            let doc = EncodedDocument::new(data.clone());
            b.iter(|| black_box(to_json(&doc).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_lazy_access);
criterion_main!(benches);
