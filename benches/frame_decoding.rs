//! Benchmarks for turning wire frames into structured and flat frames.
//!
//! Frames are synthetic (see `scanlink::test_utils`) and sized like a
//! typical device configuration: 64 scanlines with 200 points each.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use scanlink::adapters::{decode_to_flat, decode_to_structured, encode_packed};
use scanlink::test_utils::{all_columns, structured_frame};
use std::hint::black_box;

const SCANLINES: u32 = 64;
const POINTS_PER_SCANLINE: u32 = 200;

fn bench_packed_to_structured(c: &mut Criterion) {
    let mut group = c.benchmark_group("packed_to_structured");

    for returns in [1u32, 3] {
        let structured = structured_frame(1, SCANLINES, POINTS_PER_SCANLINE, returns);
        let packed = encode_packed(&structured, &all_columns());
        group.throughput(Throughput::Elements(u64::from(structured.total_number_of_returns())));

        group.bench_with_input(BenchmarkId::new("returns_per_point", returns), &packed, |b, packed| {
            b.iter(|| decode_to_structured(black_box(packed)).unwrap());
        });
    }
    group.finish();
}

fn bench_flat(c: &mut Criterion) {
    let structured = structured_frame(1, SCANLINES, POINTS_PER_SCANLINE, 1);
    let packed = encode_packed(&structured, &all_columns());

    let mut group = c.benchmark_group("flat");
    group.throughput(Throughput::Elements(u64::from(structured.total_number_of_returns())));
    group.bench_function("from_structured", |b| {
        b.iter(|| decode_to_flat(black_box(&structured)).unwrap());
    });
    group.bench_function("from_packed", |b| {
        b.iter(|| decode_to_flat(black_box(&packed)).unwrap());
    });
    group.finish();
}

fn bench_encode_packed(c: &mut Criterion) {
    let structured = structured_frame(1, SCANLINES, POINTS_PER_SCANLINE, 1);
    let selection = all_columns();

    c.bench_function("encode_packed", |b| {
        b.iter(|| encode_packed(black_box(&structured), &selection));
    });
}

criterion_group!(benches, bench_packed_to_structured, bench_flat, bench_encode_packed);
criterion_main!(benches);
