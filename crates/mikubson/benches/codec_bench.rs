use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use mikubson::{
    compute_encoded_size, decode, doc, encode, encode_into, DecodeOptions, Document,
    EncodeOptions, Long, ObjectId,
};

fn sample_document() -> Document {
    doc! {
        "_id": (ObjectId::from_bytes([1; 12])),
        "name": "Miku",
        "age": 16,
        "active": true,
        "score": 99.5,
        "views": (Long::from_i64(1 << 40)),
        "tags": ["vocaloid", "crypton", "v3"],
        "address": { "street": "123 Main St", "city": "Tokyo" },
    }
}

fn bench_compute_size(c: &mut Criterion) {
    let doc = sample_document();
    c.bench_function("compute_encoded_size", |b| {
        b.iter(|| compute_encoded_size(black_box(&doc), false))
    });
}

fn bench_encode(c: &mut Criterion) {
    let doc = sample_document();
    let options = EncodeOptions::default();
    c.bench_function("encode", |b| b.iter(|| encode(black_box(&doc), &options)));
}

fn bench_encode_into(c: &mut Criterion) {
    let doc = sample_document();
    let options = EncodeOptions::default();
    let mut buf = vec![0u8; 4096];
    c.bench_function("encode_into", |b| {
        b.iter(|| encode_into(black_box(&doc), &mut buf, 0, &options))
    });
}

fn bench_decode(c: &mut Criterion) {
    let encoded = encode(&sample_document(), &EncodeOptions::default()).unwrap();
    let options = DecodeOptions::default();
    c.bench_function("decode", |b| b.iter(|| decode(black_box(&encoded), &options)));
}

fn bench_wide_array(c: &mut Criterion) {
    let mut doc = Document::new();
    doc.insert("items", (0..1000).collect::<Vec<i32>>());
    let encoded = encode(&doc, &EncodeOptions::default()).unwrap();
    let options = DecodeOptions::default();
    c.bench_function("decode_wide_array", |b| {
        b.iter(|| decode(black_box(&encoded), &options))
    });
}

criterion_group!(
    benches,
    bench_compute_size,
    bench_encode,
    bench_encode_into,
    bench_decode,
    bench_wide_array
);
criterion_main!(benches);
