//! Benchmarks for the per-request hot path: buffering and HAR rendering.

use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use har_relay::buffer::{Batch, BatchSink, Buffer};
use har_relay::capture::{HarDocument, LogRecord, PendingRecord};
use har_relay::flusher::wire_payload;
use std::sync::Arc;

struct DiscardSink;

impl BatchSink for DiscardSink {
    fn dispatch(&self, batch: Batch) {
        black_box(batch);
    }
}

fn sample_record(body_len: usize) -> LogRecord {
    let (parts, _) = Request::post("http://api.example.com/v1/items?page=2&sort=desc")
        .header("content-type", "application/json")
        .header("user-agent", "bench/1.0")
        .body(())
        .unwrap()
        .into_parts();

    let mut pending = PendingRecord::begin(&parts);
    pending.append_request_chunk(br#"{"name":"widget"}"#);

    let body = vec![b'x'; body_len];
    for chunk in body.chunks(1024) {
        pending.append_response_chunk(chunk);
    }

    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    pending.finish(StatusCode::OK, &headers)
}

fn bench_buffer_push(c: &mut Criterion) {
    let record = sample_record(256);
    let mut group = c.benchmark_group("buffer_push");

    for capacity in [1usize, 10, 100] {
        let buffer = Buffer::new(capacity, Arc::new(DiscardSink));
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, _| {
            b.iter(|| buffer.push("bench".to_string(), black_box(record.clone())));
        });
    }

    group.finish();
}

fn bench_har_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("har_rendering");

    for body_len in [0usize, 4 * 1024, 64 * 1024] {
        let record = sample_record(body_len);
        group.bench_with_input(BenchmarkId::from_parameter(body_len), &record, |b, record| {
            b.iter(|| serde_json::to_vec(&HarDocument::from_record(black_box(record))));
        });
    }

    group.finish();
}

fn bench_wire_payload(c: &mut Criterion) {
    let buffer = Buffer::new(1000, Arc::new(DiscardSink));
    for i in 0..20 {
        buffer.push(format!("group-{}", i), sample_record(1024));
    }
    let batch = buffer.drain().unwrap();

    c.bench_function("wire_payload_20_entries", |b| {
        b.iter(|| serde_json::to_vec(&wire_payload(black_box(&batch))));
    });
}

criterion_group!(benches, bench_buffer_push, bench_har_rendering, bench_wire_payload);
criterion_main!(benches);
