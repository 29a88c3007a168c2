// ==============================================
// CACHE CONCURRENCY TESTS (integration)
// ==============================================
//
// Atomicity of derived operations under both lock disciplines, and the
// interaction of caller threads with the expiry worker thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Weak};
use std::thread;
use std::time::{Duration, Instant};

use cachebridge::builder::{CacheBuilder, CacheHandle, Locking};
use cachebridge::expiry::engine::ExpiryPolicy;
use cachebridge::listener::RemovalCause;
use cachebridge::registry::StoreProvider;
use cachebridge::traits::Cache;

const THREADS: usize = 8;

fn cache(locking: Locking) -> Arc<CacheHandle<u64, u64>> {
    Arc::new(
        CacheBuilder::new()
            .max_size(1_024)
            .locking(locking)
            .build()
            .unwrap(),
    )
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// ==============================================
// compute_if_absent: single invocation
// ==============================================
//
// N threads race on the same absent key. The check-compute-write sequence
// runs under the exclusive lock, so the closure runs exactly once and every
// caller observes its result.

mod compute_if_absent {
    use super::*;

    fn single_invocation(locking: Locking) {
        let cache = cache(locking);
        let invocations = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let cache = cache.clone();
                let invocations = invocations.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache.compute_if_absent(7, |_| {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        42
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42);
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&7), Some(42));
    }

    #[test]
    fn exclusive_invokes_once() {
        single_invocation(Locking::Exclusive);
    }

    #[test]
    fn optimistic_invokes_once() {
        single_invocation(Locking::Optimistic);
    }
}

// ==============================================
// replace_if_equals: single winner
// ==============================================
//
// Every thread expects the same old value. The optimistic probe lets all of
// them through; re-verification under the exclusive lock admits only one.

mod conditional_replace {
    use super::*;

    fn single_winner(locking: Locking) {
        for _ in 0..50 {
            let cache = cache(locking);
            cache.put(1, 0);
            let barrier = Arc::new(Barrier::new(THREADS));

            let handles: Vec<_> = (0..THREADS as u64)
                .map(|id| {
                    let cache = cache.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        cache.replace_if_equals(1, &0, id + 1)
                    })
                })
                .collect();

            let winners = handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(winners, 1);
            assert_ne!(cache.get(&1), Some(0));
        }
    }

    #[test]
    fn optimistic_has_one_winner() {
        single_winner(Locking::Optimistic);
    }

    #[test]
    fn exclusive_has_one_winner() {
        single_winner(Locking::Exclusive);
    }

    #[test]
    fn replace_on_absent_key_never_writes() {
        let cache = cache(Locking::Optimistic);
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS as u64)
            .map(|id| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache.replace(99, id)
                })
            })
            .collect();
        for handle in handles {
            assert!(!handle.join().unwrap());
        }
        assert_eq!(cache.get(&99), None);
    }
}

// ==============================================
// merge: no lost updates
// ==============================================

mod merge {
    use super::*;

    fn counts_every_increment(locking: Locking) {
        const INCREMENTS: u64 = 500;
        let cache = cache(locking);
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..INCREMENTS {
                        cache.merge(0, 1, |a, b| a + b);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.get(&0), Some(THREADS as u64 * INCREMENTS));
    }

    #[test]
    fn exclusive_loses_nothing() {
        counts_every_increment(Locking::Exclusive);
    }

    #[test]
    fn optimistic_loses_nothing() {
        counts_every_increment(Locking::Optimistic);
    }
}

// ==============================================
// Expiry worker vs. writers
// ==============================================
//
// Writers overwrite a small key set while the worker thread expires entries
// with a very short TTL. Every written value must leave the cache exactly
// once, either replaced by a later write or expired by its own timer.

mod expiry_races {
    use super::*;

    #[derive(Default)]
    struct Tally {
        replaced: AtomicUsize,
        expired: AtomicUsize,
        other: AtomicUsize,
    }

    impl Tally {
        fn total(&self) -> usize {
            self.replaced.load(Ordering::SeqCst)
                + self.expired.load(Ordering::SeqCst)
                + self.other.load(Ordering::SeqCst)
        }
    }

    fn every_value_leaves_once(locking: Locking, policy: ExpiryPolicy) {
        const WRITES_PER_THREAD: usize = 400;
        let tally = Arc::new(Tally::default());
        let sink = tally.clone();
        let cache = Arc::new(
            CacheBuilder::<u64, u64>::new()
                .provider(StoreProvider::hash_map())
                .expiry_time(Duration::from_millis(1))
                .expiry_policy(policy)
                .locking(locking)
                .removal_listener(move |_, _, cause| {
                    let counter = match cause {
                        RemovalCause::Replaced => &sink.replaced,
                        RemovalCause::Time => &sink.expired,
                        _ => &sink.other,
                    };
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .build()
                .unwrap(),
        );
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..WRITES_PER_THREAD {
                        let key = (i % 4) as u64;
                        cache.put(key, (t * WRITES_PER_THREAD + i) as u64);
                        cache.get(&key);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let writes = THREADS * WRITES_PER_THREAD;
        assert!(
            wait_until(Duration::from_secs(10), || cache.size() == 0 && tally.total() == writes),
            "size={} removals={} writes={}",
            cache.size(),
            tally.total(),
            writes
        );
        assert_eq!(tally.other.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn post_write_exclusive() {
        every_value_leaves_once(Locking::Exclusive, ExpiryPolicy::PostWrite);
    }

    #[test]
    fn post_access_optimistic() {
        every_value_leaves_once(Locking::Optimistic, ExpiryPolicy::PostAccess);
    }

    #[test]
    fn listener_may_reenter_cache() {
        let expired = Arc::new(AtomicUsize::new(0));
        let counter = expired.clone();
        let cache = Arc::new_cyclic(|weak: &Weak<CacheHandle<u64, u64>>| {
            let weak = weak.clone();
            CacheBuilder::new()
                .provider(StoreProvider::hash_map())
                .expiry_time(Duration::from_millis(5))
                .expiry_policy(ExpiryPolicy::PostWrite)
                .locking(Locking::Optimistic)
                .removal_listener(move |key: &u64, value: &u64, cause| {
                    if cause != RemovalCause::Time {
                        return;
                    }
                    // Archive expired entries under a shifted key, once.
                    if *key < 100 {
                        if let Some(cache) = weak.upgrade() {
                            cache.put(key + 100, *value);
                        }
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .build()
                .unwrap()
        });

        cache.put(1, 11);
        assert!(wait_until(Duration::from_secs(5), || {
            expired.load(Ordering::SeqCst) == 2 && cache.size() == 0
        }));
    }
}
