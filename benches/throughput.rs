//! Throughput Benchmark for polykv
//!
//! This benchmark measures the engine under the single global lock for
//! various workloads.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use polykv::commands::{CommandHandler, UpdateRequest};
use polykv::storage::{sampling_pass, Engine};
use polykv::value::{Counter, Metric, Payload, StringItem};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let engine = Engine::default();
    let db = engine.database(0);

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_string", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            db.set(key, Arc::new(StringItem::new("small_value")), None);
            i += 1;
        });
    });

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("ttl:{}", i));
            db.set_with_ttl(
                key,
                Arc::new(StringItem::new("value")),
                Duration::from_secs(3600),
            );
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark reads
fn bench_get(c: &mut Criterion) {
    let engine = Engine::default();
    let db = engine.database(0);

    // Pre-populate with data
    for i in 0..100_000 {
        let key = Bytes::from(format!("key:{}", i));
        db.set(key, Arc::new(StringItem::new(format!("value:{}", i))), None);
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_raw", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(db.get(key.as_bytes()));
            i += 1;
        });
    });

    group.bench_function("get_or_expire", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(db.get_or_expire(key.as_bytes(), true));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(db.get_or_expire(key.as_bytes(), true));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark value updates through the command handler
fn bench_update(c: &mut Criterion) {
    let engine = Engine::default();
    let db = engine.database(0);
    let handler = CommandHandler::new(engine.clone());

    db.set(Bytes::from("metric"), Arc::new(Metric::new("bytes", 0.0)), None);
    for i in 0..1000 {
        db.set(
            Bytes::from(format!("counter:{}", i)),
            Arc::new(Counter::default()),
            None,
        );
    }

    let mut group = c.benchmark_group("update");
    group.throughput(Throughput::Elements(1));

    // Single value (high contention on its own lock)
    group.bench_function("single_metric", |b| {
        let payload = Payload::Float(1.5);
        b.iter(|| {
            black_box(handler.apply_update(&db, b"metric", &payload).unwrap());
        });
    });

    group.bench_function("many_counters", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let request = UpdateRequest::update(0, format!("counter:{}", i % 1000), 1i64);
            black_box(handler.handle(request));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark concurrent access
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_4_databases", |b| {
        b.iter(|| {
            let engine = Engine::default();
            let handles: Vec<_> = (0..4u32)
                .map(|t| {
                    let engine = engine.clone();
                    thread::spawn(move || {
                        let db = engine.database(t);
                        for i in 0..10_000 {
                            let key = Bytes::from(format!("key:{}", i));
                            db.set(key.clone(), Arc::new(StringItem::new("value")), None);
                            db.get_or_expire(&key, true);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(engine.stats().keys);
        });
    });

    group.finish();
}

/// Benchmark sampling passes of the expiration manager
fn bench_expiry(c: &mut Criterion) {
    let mut group = c.benchmark_group("expiry");

    group.bench_function("pass_live_keys", |b| {
        let engine = Engine::default();
        let db = engine.database(0);
        for i in 0..100_000 {
            db.set_with_ttl(
                Bytes::from(format!("live:{}", i)),
                Arc::new(StringItem::new("value")),
                Duration::from_secs(3600),
            );
        }

        let mut rng = StdRng::seed_from_u64(42);
        b.iter(|| black_box(sampling_pass(&engine, 20, &mut rng)));
    });

    group.bench_function("pass_expired_keys", |b| {
        let engine = Engine::default();
        let db = engine.database(0);
        let mut rng = StdRng::seed_from_u64(42);

        b.iter(|| {
            let past = Instant::now() - Duration::from_secs(1);
            for i in 0..20 {
                db.set(
                    Bytes::from(format!("dead:{}", i)),
                    Arc::new(StringItem::new("value")),
                    Some(past),
                );
            }
            black_box(sampling_pass(&engine, 20, &mut rng))
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_update,
    bench_concurrent,
    bench_expiry,
);

criterion_main!(benches);
