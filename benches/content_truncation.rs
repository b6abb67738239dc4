//! Benchmarks for content truncation, the hot path on every write to the
//! content store when a channel has `truncate_bytes` configured.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use donkey::storage::content::truncate;

fn bench_truncate(c: &mut Criterion) {
    let mut group = c.benchmark_group("truncate");

    for payload_len in [256, 4_096, 65_536, 1_048_576] {
        let payload = vec![b'a'; payload_len];
        let limit = payload_len / 2;

        group.bench_with_input(
            BenchmarkId::new("below_limit", payload_len),
            &payload,
            |b, payload| {
                b.iter(|| black_box(truncate(payload, payload.len() + 1)));
            },
        );

        group.bench_with_input(BenchmarkId::new("at_half_limit", payload_len), &payload, |b, payload| {
            b.iter(|| black_box(truncate(payload, limit)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_truncate);
criterion_main!(benches);
