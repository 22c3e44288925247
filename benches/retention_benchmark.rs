use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use geosync::core::{ArtifactRecord, Registry, RetentionPolicy};
use std::hint::black_box;
use std::path::PathBuf;
use std::time::Duration;

/// Registry holding one record every two minutes, newest at `now`
fn build_registry(records: usize) -> Registry {
    let now = Utc.with_ymd_and_hms(2024, 6, 18, 12, 0, 0).unwrap();
    let mut registry = Registry::new();
    for i in 0..records {
        let observed = now - ChronoDuration::minutes(2 * i as i64);
        let key = format!("MRMS_{}.grib2.gz", observed.format("%Y%m%d-%H%M%S"));
        let location = PathBuf::from("/tiles").join(&key);
        registry.insert(ArtifactRecord::materialized(key, observed, location));
    }
    registry
}

/// Evicting half of a registry of varying size
fn bench_evict(c: &mut Criterion) {
    let now = Utc.with_ymd_and_hms(2024, 6, 18, 12, 0, 0).unwrap();
    let mut group = c.benchmark_group("evict");

    for size in [100usize, 1_000, 5_000] {
        // Window covers the newest half of the records
        let window = Duration::from_secs(60 * size as u64);
        let policy = RetentionPolicy::new(window).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || build_registry(size),
                |mut registry| black_box(registry.evict(&policy, now)),
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

/// Snapshot of a registry with nothing to evict
fn bench_snapshot(c: &mut Criterion) {
    let registry = build_registry(1_000);
    c.bench_function("snapshot_1000", |b| {
        b.iter(|| black_box(registry.snapshot()));
    });
}

criterion_group!(benches, bench_evict, bench_snapshot);
criterion_main!(benches);
