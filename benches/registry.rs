//! Benchmarks for fabricfs.
//!
//! Run with: cargo bench

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fabricfs::{FabricFs, FsConfig, MockDriver, FABRIC_HANDLE_XATTR};

fn mounted() -> FabricFs {
    let fs = FabricFs::new(FsConfig::default(), Arc::new(MockDriver::new()));
    fs.init().expect("mock driver init");
    fs
}

fn bench_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("lifecycle");

    group.bench_function("create_unlink", |b| {
        let fs = mounted();
        b.iter(|| {
            fs.create("/bench").unwrap();
            fs.unlink("/bench").unwrap();
        })
    });

    group.bench_function("materialize_release_4kb", |b| {
        let fs = mounted();
        fs.create("/bench").unwrap();
        b.iter(|| {
            fs.truncate("/bench", 4096).unwrap();
            fs.truncate("/bench", 0).unwrap();
        })
    });

    group.finish();
}

fn bench_attribute_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("attributes");

    let fs = mounted();
    fs.create("/bench").unwrap();
    fs.truncate("/bench", 4096).unwrap();

    group.bench_function("getxattr_fabric_handle", |b| {
        b.iter(|| {
            let reply = fs.getxattr("/bench", FABRIC_HANDLE_XATTR, 64).unwrap();
            black_box(reply);
        })
    });

    group.bench_function("getattr", |b| {
        b.iter(|| {
            let attr = fs.getattr("/bench").unwrap();
            black_box(attr);
        })
    });

    group.finish();
}

fn bench_lookup_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    let fs = mounted();
    for i in 0..1024 {
        fs.create(&format!("/entry_{}", i)).unwrap();
    }

    group.bench_function("getattr_among_1024", |b| {
        b.iter(|| {
            let attr = fs.getattr("/entry_512").unwrap();
            black_box(attr);
        })
    });

    group.bench_function("readdir_1024", |b| {
        b.iter(|| {
            let listing = fs.readdir();
            black_box(listing);
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_lifecycle,
    bench_attribute_reads,
    bench_lookup_scaling
);
criterion_main!(benches);
