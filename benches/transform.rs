//! Performance benchmarks for the XOR transform

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use xorshard_core::{plan_fragments, transform_file, transform_in_place};
use xorshard_integration_tests::{Workspace, random_bytes};

const KEY: &[u8] = b"benchmark key of a length that is not a power of two";

/// Single-threaded in-memory transform
fn bench_in_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("xor_in_memory");

    for size in [
        64 * 1024,        // 64 KB
        1024 * 1024,      // 1 MB
        16 * 1024 * 1024, // 16 MB
    ] {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut data = random_bytes(size, 1);
            b.iter(|| {
                transform_in_place(black_box(&mut data), black_box(KEY));
            });
        });
    }

    group.finish();
}

/// Whole file jobs at several worker counts
fn bench_file_jobs(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform_file");
    group.sample_size(20);

    let size = 16 * 1024 * 1024;
    let ws = Workspace::random(size, KEY, 2);
    let output = ws.path("out.bin");

    for threads in [1, 2, 4, 8] {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("threads", threads), &threads, |b, &threads| {
            b.iter(|| {
                let status = transform_file(ws.input(), &output, ws.key(), threads);
                assert!(status.is_success());
            });
        });
    }

    group.finish();
}

/// Planning cost for large worker counts
fn bench_planning(c: &mut Criterion) {
    c.bench_function("plan_fragments_1024", |b| {
        b.iter(|| plan_fragments(black_box(1 << 30), black_box(1024)));
    });
}

criterion_group!(benches, bench_in_memory, bench_file_jobs, bench_planning);
criterion_main!(benches);
