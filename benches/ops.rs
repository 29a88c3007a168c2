//! Per-operation benchmarks for both lock disciplines.
//!
//! Run with: `cargo bench --bench ops`
//!
//! Measures per-operation latency for primitive and derived operations, with
//! and without expiry, plus a read-heavy multi-threaded mix where the
//! shared/exclusive discipline is expected to pull ahead.

use std::hint::black_box;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use cachebridge::builder::{CacheBuilder, CacheHandle, Locking};
use cachebridge::expiry::engine::ExpiryPolicy;
use cachebridge::expiry::scheduler::{ManualScheduler, Scheduler};
use cachebridge::traits::Cache;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CAPACITY: usize = 16_384;
const OPS: u64 = 100_000;
const LOCKINGS: [(&str, Locking); 2] = [
    ("exclusive", Locking::Exclusive),
    ("optimistic", Locking::Optimistic),
];

fn cache(locking: Locking, expiring: bool) -> CacheHandle<u64, u64> {
    let builder = CacheBuilder::<u64, u64>::new().max_size(CAPACITY).locking(locking);
    let builder = if expiring {
        // Timers are queued but never fire: the virtual clock is not advanced.
        let scheduler: Arc<dyn Scheduler> = Arc::new(ManualScheduler::new());
        builder
            .expiry_time(Duration::from_secs(60))
            .expiry_policy(ExpiryPolicy::PostWrite)
            .scheduler(scheduler)
    } else {
        builder
    };
    builder.build().expect("valid benchmark configuration")
}

fn filled(locking: Locking, expiring: bool) -> CacheHandle<u64, u64> {
    let cache = cache(locking, expiring);
    cache.put_all((0..CAPACITY as u64).map(|i| (i, i)));
    cache
}

fn keys(seed: u64, bound: u64) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..OPS).map(|_| rng.gen_range(0..bound)).collect()
}

// ============================================================================
// Get Hit Latency
// ============================================================================

fn bench_get_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_hit");
    group.throughput(Throughput::Elements(OPS));
    let keys = keys(1, CAPACITY as u64);

    for (name, locking) in LOCKINGS {
        group.bench_function(name, |b| {
            let cache = filled(locking, false);
            b.iter(|| {
                for key in &keys {
                    black_box(cache.get(key));
                }
            })
        });
    }

    group.finish();
}

// ============================================================================
// Put With Eviction
// ============================================================================

fn bench_put_evict(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_evict");
    group.throughput(Throughput::Elements(OPS));

    for (name, locking) in LOCKINGS {
        for expiring in [false, true] {
            let id = BenchmarkId::new(name, if expiring { "ttl" } else { "no_ttl" });
            group.bench_with_input(id, &expiring, |b, &expiring| {
                b.iter_custom(|iters| {
                    let mut total = Duration::ZERO;
                    for _ in 0..iters {
                        let cache = filled(locking, expiring);
                        let start = Instant::now();
                        for i in 0..OPS {
                            black_box(cache.put(CAPACITY as u64 + i, i));
                        }
                        total += start.elapsed();
                    }
                    total
                })
            });
        }
    }

    group.finish();
}

// ============================================================================
// Derived Operations
// ============================================================================

fn bench_derived(c: &mut Criterion) {
    let mut group = c.benchmark_group("derived");
    group.throughput(Throughput::Elements(OPS));
    let hits = keys(2, CAPACITY as u64);

    for (name, locking) in LOCKINGS {
        group.bench_function(BenchmarkId::new("compute_if_absent_hit", name), |b| {
            let cache = filled(locking, false);
            b.iter(|| {
                for key in &hits {
                    black_box(cache.compute_if_absent(*key, |k| *k));
                }
            })
        });

        group.bench_function(BenchmarkId::new("replace_absent", name), |b| {
            let cache = filled(locking, false);
            b.iter(|| {
                for key in &hits {
                    black_box(cache.replace(CAPACITY as u64 + *key, 0));
                }
            })
        });

        group.bench_function(BenchmarkId::new("merge", name), |b| {
            let cache = filled(locking, false);
            b.iter(|| {
                for key in &hits {
                    black_box(cache.merge(*key, 1, |x, y| x.wrapping_add(*y)));
                }
            })
        });
    }

    group.finish();
}

// ============================================================================
// Read-Heavy Concurrent Mix (95% get / 5% put)
// ============================================================================

fn bench_concurrent_mix(c: &mut Criterion) {
    const THREADS: usize = 4;
    let mut group = c.benchmark_group("concurrent_read_heavy");
    group.throughput(Throughput::Elements(OPS * THREADS as u64));

    for (name, locking) in LOCKINGS {
        group.bench_function(name, |b| {
            b.iter_custom(|iters| {
                let mut total = Duration::ZERO;
                for _ in 0..iters {
                    let cache = Arc::new(filled(locking, false));
                    let barrier = Arc::new(Barrier::new(THREADS + 1));
                    let handles: Vec<_> = (0..THREADS as u64)
                        .map(|t| {
                            let cache = cache.clone();
                            let barrier = barrier.clone();
                            let keys = keys(10 + t, CAPACITY as u64);
                            thread::spawn(move || {
                                barrier.wait();
                                for (i, key) in keys.iter().enumerate() {
                                    if i % 20 == 0 {
                                        cache.put(*key, i as u64);
                                    } else {
                                        black_box(cache.get(key));
                                    }
                                }
                            })
                        })
                        .collect();
                    barrier.wait();
                    let start = Instant::now();
                    for handle in handles {
                        handle.join().expect("benchmark worker panicked");
                    }
                    total += start.elapsed();
                }
                total
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_get_hit,
    bench_put_evict,
    bench_derived,
    bench_concurrent_mix
);
criterion_main!(benches);
