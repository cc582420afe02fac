//! Benchmarks for full saves versus region patches
//!
//! Run with: cargo bench --bench save_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hdict::prelude::*;

fn bench_full_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_save");

    for len in [1_000usize, 100_000].iter() {
        group.throughput(Throughput::Bytes((*len * 8) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), len, |b, &len| {
            let temp_dir = tempfile::tempdir().unwrap();
            let path = temp_dir.path().join("bench.hdc");
            let config = ContainerConfig::new(&path, OpenMode::Overwrite)
                .with_store(StoreConfig::default().with_sync_on_flush(false));
            let container = Container::open(config).unwrap();
            let values = vec![1.0f64; len];
            b.iter(|| {
                container.set("arr", black_box(values.clone())).unwrap();
                container.save().unwrap();
            });
        });
    }
    group.finish();
}

fn bench_region_patch(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_patch");

    for len in [1_000usize, 100_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(len), len, |b, &len| {
            let temp_dir = tempfile::tempdir().unwrap();
            let path = temp_dir.path().join("bench.hdc");
            let config = ContainerConfig::new(&path, OpenMode::Overwrite)
                .with_save_on_edit(true)
                .with_store(StoreConfig::default().with_sync_on_flush(false));
            let container = Container::open(config).unwrap();
            container.set("arr", vec![0.0f64; len]).unwrap();
            let mut arr = container.array("arr").unwrap();
            let mut i = 0usize;
            b.iter(|| {
                arr.set_flat(black_box(i % len), i as f64).unwrap();
                i += 1;
            });
        });
    }
    group.finish();
}

fn bench_lazy_open(c: &mut Criterion) {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("bench.hdc");
    {
        let container = Container::create(&path).unwrap();
        for i in 0..500 {
            container.set(&format!("group_{}/value", i), i as i64).unwrap();
        }
        container.close().unwrap();
    }

    c.bench_function("open_lazy_500_groups", |b| {
        b.iter(|| {
            let container =
                Container::open(ContainerConfig::new(&path, OpenMode::Read).lazy()).unwrap();
            black_box(container.len())
        });
    });
    c.bench_function("open_eager_500_groups", |b| {
        b.iter(|| {
            let container = Container::read(&path).unwrap();
            black_box(container.len())
        });
    });
}

criterion_group!(benches, bench_full_save, bench_region_patch, bench_lazy_open);
criterion_main!(benches);
