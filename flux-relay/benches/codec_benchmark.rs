use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flux_relay::normalize::normalize;
use flux_relay::protocol::{Frame, Role};
use serde_json::json;

fn bench_frame_encode(c: &mut Criterion) {
    let frame = Frame::event(json!({
        "type": "noteOn", "note": 60, "velocity": 90, "ch": 2
    }));

    c.bench_function("frame_encode_noteon", |b| {
        b.iter(|| {
            black_box(black_box(&frame).encode().unwrap());
        })
    });
}

fn bench_frame_decode(c: &mut Criterion) {
    let encoded = Frame::event(json!({
        "type": "cc", "controller": 21, "value": 64, "ch": 9
    }))
    .encode()
    .unwrap();

    c.bench_function("frame_decode_cc", |b| {
        b.iter(|| {
            black_box(Frame::decode(black_box(&encoded)).unwrap());
        })
    });
}

fn bench_hello_roundtrip(c: &mut Criterion) {
    c.bench_function("hello_roundtrip", |b| {
        b.iter(|| {
            let encoded = Frame::hello(black_box(Role::Producer)).encode().unwrap();
            black_box(Frame::decode(&encoded).unwrap());
        })
    });
}

fn bench_normalize_noteon(c: &mut Criterion) {
    let payload = json!({"type": "noteOn", "note": 60, "velocity": 90, "ch": 2});

    c.bench_function("normalize_noteon", |b| {
        b.iter(|| {
            black_box(normalize(black_box(&payload)));
        })
    });
}

fn bench_normalize_legacy_aliases(c: &mut Criterion) {
    let payload = json!({"type": "cc", "ctrl": "21", "velocity": "64", "channel": "9"});

    c.bench_function("normalize_legacy_aliases", |b| {
        b.iter(|| {
            black_box(normalize(black_box(&payload)));
        })
    });
}

criterion_group!(
    benches,
    bench_frame_encode,
    bench_frame_decode,
    bench_hello_roundtrip,
    bench_normalize_noteon,
    bench_normalize_legacy_aliases
);
criterion_main!(benches);
