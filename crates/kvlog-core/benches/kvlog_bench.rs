use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use tempfile::TempDir;

use kvlog_core::{Config, Store};

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");
    for (name, config) in [("fast", Config::fast()), ("durable", Config::durable())] {
        group.bench_function(name, |b| {
            let dir = TempDir::new().unwrap();
            let store = Store::open(dir.path().join("transaction.log"), config.clone()).unwrap();
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                store.put(&format!("key{}", i % 1024), black_box("value")).unwrap();
            });
        });
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path().join("transaction.log"), Config::default()).unwrap();
    for i in 0..1024 {
        store.put(&format!("key{}", i), "value").unwrap();
    }
    let mut i = 0u64;
    c.bench_function("get", |b| {
        b.iter(|| {
            i += 1;
            black_box(store.get(&format!("key{}", i % 1024)).unwrap());
        })
    });
}

fn bench_recovery(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("transaction.log");
    {
        let store = Store::open(&path, Config::default()).unwrap();
        for i in 0..10_000 {
            store.put(&format!("key{}", i % 2000), &format!("value{}", i)).unwrap();
        }
        store.close().unwrap();
    }

    c.bench_function("recover_10k_records", |b| {
        b.iter_batched(
            || (),
            |_| {
                let store = Store::open(&path, Config::default()).unwrap();
                black_box(store.len());
                // Nothing was written, so closing leaves the log unchanged.
                store.close().unwrap();
            },
            BatchSize::PerIteration,
        )
    });
}

criterion_group!(benches, bench_put, bench_get, bench_recovery);
criterion_main!(benches);
