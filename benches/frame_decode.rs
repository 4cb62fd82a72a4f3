//! Inbound frame decoding benchmark.
//!
//! Measures classification of the frames a busy feed connection sees:
//! - Responses of growing result size
//! - Pushes of growing payload size
//! - Malformed input
//!
//! Run with: cargo bench --bench frame_decode
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;

use feed_sync::protocol::Frame;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const PAYLOAD_FIELDS: &[usize] = &[1, 16, 256];

// ============================================================================
// Fixtures
// ============================================================================

fn payload(fields: usize) -> serde_json::Value {
    let levels: Vec<_> = (0..fields)
        .map(|i| json!({"price": 100.0 + i as f64, "size": i}))
        .collect();
    json!({"bids": levels})
}

fn response_frame(fields: usize) -> String {
    json!({"id": 42, "result": payload(fields)}).to_string()
}

fn push_frame(fields: usize) -> String {
    json!({"subscriptionKey": "sub-tok-1", "payload": payload(fields)}).to_string()
}

// ============================================================================
// Benchmark: Responses
// ============================================================================

fn bench_response(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_response");

    for &fields in PAYLOAD_FIELDS {
        let text = response_frame(fields);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fields), &text, |b, text| {
            b.iter(|| Frame::parse(black_box(text)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Pushes
// ============================================================================

fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_push");

    for &fields in PAYLOAD_FIELDS {
        let text = push_frame(fields);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fields), &text, |b, text| {
            b.iter(|| Frame::parse(black_box(text)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Malformed
// ============================================================================

fn bench_malformed(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_malformed");

    let cases = [
        ("not_json", "{\"id\": 1, \"result\""),
        ("not_object", "[1, 2, 3]"),
        ("no_shape", "{\"hello\": \"world\"}"),
    ];

    for (name, text) in cases {
        group.bench_function(name, |b| {
            b.iter(|| Frame::parse(black_box(text)));
        });
    }

    group.finish();
}

// ============================================================================
// Main
// ============================================================================

criterion_group!(benches, bench_response, bench_push, bench_malformed);
criterion_main!(benches);
