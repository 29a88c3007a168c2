//! Compound cache operations derived from [`RawCache`] primitives.
//!
//! ## Architecture
//!
//! ```text
//!   AtomicCache<K, V, P, L>
//!   ├── inner: P: RawCache<K, V>     read / write / delete / count / wipe / scan
//!   └── lock:  L: LockStrategy       Exclusive | SharedExclusive
//! ```
//!
//! Every derived operation is a read-check-write sequence over `inner`,
//! executed under `lock`:
//!
//! | Operation           | Optimistic probe (`L::OPTIMISTIC`)      | Under exclusive lock        |
//! |---------------------|-----------------------------------------|-----------------------------|
//! | `compute_if_absent` | present → return it                     | re-check, compute, write    |
//! | `compute`           | none                                    | read, apply, write / delete |
//! | `compute_if_present`| absent → `None`                         | re-check, apply             |
//! | `put_if_absent`     | present → return it                     | re-check, write             |
//! | `merge`             | none                                    | read, merge, write          |
//! | `replace`           | absent → `false`                        | re-check, write             |
//! | `replace_if_equals` | absent or unequal → `false`             | re-check equality, write    |
//!
//! The probe only ever short-circuits; anything it lets through is verified
//! again under the exclusive lock before mutating.
//!
//! ## Full Scans
//!
//! [`Cache::for_each`] bypasses the strategy lock: the primitive snapshots
//! under its own lock and the callback runs unlocked, so it may call back
//! into the cache.

use std::fmt;
use std::marker::PhantomData;

use crate::error::CacheError;
use crate::sync::strategy::LockStrategy;
use crate::traits::{Cache, RawCache};

/// A [`Cache`] built from a [`RawCache`] and a [`LockStrategy`].
pub struct AtomicCache<K, V, P, L> {
    inner: P,
    lock: L,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, P, L> AtomicCache<K, V, P, L>
where
    P: RawCache<K, V>,
    L: LockStrategy + Default,
{
    pub fn new(inner: P) -> Self {
        Self::with_lock(inner, L::default())
    }
}

impl<K, V, P, L> AtomicCache<K, V, P, L>
where
    P: RawCache<K, V>,
    L: LockStrategy,
{
    pub fn with_lock(inner: P, lock: L) -> Self {
        Self {
            inner,
            lock,
            _marker: PhantomData,
        }
    }

    /// The wrapped primitive.
    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn probe(&self, key: &K) -> Option<V> {
        self.lock.shared(|| self.inner.read(key))
    }
}

impl<K, V, P, L> Cache<K, V> for AtomicCache<K, V, P, L>
where
    V: Clone + PartialEq,
    P: RawCache<K, V>,
    L: LockStrategy,
{
    fn get(&self, key: &K) -> Option<V> {
        self.lock.shared(|| self.inner.read(key))
    }

    fn put(&self, key: K, value: V) -> Option<V> {
        self.lock.exclusive(|| self.inner.write(key, value))
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.lock.exclusive(|| self.inner.delete(key))
    }

    fn clear(&self) {
        self.lock.exclusive(|| self.inner.wipe());
    }

    fn size(&self) -> u64 {
        self.lock.shared(|| self.inner.count())
    }

    fn compute_if_absent<F>(&self, key: K, f: F) -> V
    where
        F: FnOnce(&K) -> V,
    {
        if L::OPTIMISTIC {
            if let Some(present) = self.probe(&key) {
                return present;
            }
        }
        self.lock.exclusive(|| {
            if let Some(present) = self.inner.read(&key) {
                return present;
            }
            let computed = f(&key);
            self.inner.write(key, computed.clone());
            computed
        })
    }

    fn compute<F>(&self, key: K, f: F) -> Option<V>
    where
        F: FnOnce(&K, Option<&V>) -> Option<V>,
    {
        self.lock.exclusive(|| {
            let current = self.inner.read(&key);
            match f(&key, current.as_ref()) {
                Some(next) => {
                    self.inner.write(key, next.clone());
                    Some(next)
                },
                None => {
                    if current.is_some() {
                        self.inner.delete(&key);
                    }
                    None
                },
            }
        })
    }

    fn compute_if_present<F>(&self, key: K, f: F) -> Option<V>
    where
        F: FnOnce(&K, &V) -> Option<V>,
    {
        if L::OPTIMISTIC && self.probe(&key).is_none() {
            return None;
        }
        self.lock.exclusive(|| {
            let current = self.inner.read(&key)?;
            match f(&key, &current) {
                Some(next) => {
                    self.inner.write(key, next.clone());
                    Some(next)
                },
                None => {
                    self.inner.delete(&key);
                    None
                },
            }
        })
    }

    fn put_if_absent(&self, key: K, value: V) -> Option<V> {
        if L::OPTIMISTIC {
            if let Some(present) = self.probe(&key) {
                return Some(present);
            }
        }
        self.lock.exclusive(|| {
            let current = self.inner.read(&key);
            if current.is_none() {
                self.inner.write(key, value);
            }
            current
        })
    }

    fn merge<F>(&self, key: K, value: V, f: F) -> V
    where
        F: FnOnce(&V, &V) -> V,
    {
        self.lock.exclusive(|| match self.inner.read(&key) {
            None => {
                self.inner.write(key, value.clone());
                value
            },
            Some(current) => {
                let merged = f(&current, &value);
                self.inner.write(key, merged.clone());
                merged
            },
        })
    }

    fn replace(&self, key: K, value: V) -> bool {
        if L::OPTIMISTIC && self.probe(&key).is_none() {
            return false;
        }
        self.lock.exclusive(|| {
            if self.inner.read(&key).is_none() {
                return false;
            }
            self.inner.write(key, value);
            true
        })
    }

    fn replace_if_equals(&self, key: K, expected: &V, value: V) -> bool {
        if L::OPTIMISTIC && self.probe(&key).as_ref() != Some(expected) {
            return false;
        }
        self.lock.exclusive(|| {
            if self.inner.read(&key).as_ref() != Some(expected) {
                return false;
            }
            self.inner.write(key, value);
            true
        })
    }

    fn for_each<F>(&self, mut f: F) -> Result<(), CacheError>
    where
        F: FnMut(&K, &V),
    {
        self.inner.scan(&mut f)
    }
}

impl<K, V, P, L> fmt::Debug for AtomicCache<K, V, P, L>
where
    P: fmt::Debug,
    L: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicCache")
            .field("inner", &self.inner)
            .field("lock", &self.lock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::sync::strategy::{Exclusive, SharedExclusive};

    /// A primitive that counts mutations.
    #[derive(Default)]
    struct MapRaw {
        map: Mutex<HashMap<u32, i64>>,
        writes: AtomicUsize,
        deletes: AtomicUsize,
    }

    impl RawCache<u32, i64> for MapRaw {
        fn read(&self, key: &u32) -> Option<i64> {
            self.map.lock().get(key).copied()
        }

        fn write(&self, key: u32, value: i64) -> Option<i64> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.map.lock().insert(key, value)
        }

        fn delete(&self, key: &u32) -> Option<i64> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.map.lock().remove(key)
        }

        fn count(&self) -> u64 {
            self.map.lock().len() as u64
        }

        fn wipe(&self) {
            self.map.lock().clear();
        }

        fn scan(&self, visit: &mut dyn FnMut(&u32, &i64)) -> Result<(), CacheError> {
            let snapshot: Vec<_> = self.map.lock().iter().map(|(k, v)| (*k, *v)).collect();
            for (k, v) in &snapshot {
                visit(k, v);
            }
            Ok(())
        }
    }

    fn cache<L: LockStrategy + Default>() -> AtomicCache<u32, i64, MapRaw, L> {
        AtomicCache::new(MapRaw::default())
    }

    fn writes<L: LockStrategy>(cache: &AtomicCache<u32, i64, MapRaw, L>) -> usize {
        cache.inner().writes.load(Ordering::SeqCst)
    }

    /// Observable results must not depend on the strategy.
    fn derived_contract<L: LockStrategy + Default>() {
        let c = cache::<L>();

        assert_eq!(c.compute_if_absent(1, |_| 10), 10);
        assert_eq!(c.compute_if_absent(1, |_| panic!("present")), 10);

        assert_eq!(c.compute(1, |_, old| old.map(|v| v + 1)), Some(11));
        assert_eq!(c.compute(2, |_, old| old.copied()), None);
        assert_eq!(c.compute(1, |_, _| None), None);
        assert_eq!(c.get(&1), None);

        assert_eq!(c.compute_if_present(1, |_, _| panic!("absent")), None);
        c.put(1, 5);
        assert_eq!(c.compute_if_present(1, |_, v| Some(v * 2)), Some(10));
        assert_eq!(c.compute_if_present(1, |_, _| None), None);
        assert_eq!(c.size(), 0);

        assert_eq!(c.put_if_absent(3, 30), None);
        assert_eq!(c.put_if_absent(3, 31), Some(30));
        assert_eq!(c.get(&3), Some(30));

        assert_eq!(c.merge(4, 1, |a, b| a + b), 1);
        assert_eq!(c.merge(4, 2, |a, b| a + b), 3);

        assert!(!c.replace(5, 50));
        assert_eq!(c.get(&5), None);
        assert!(c.replace(4, 40));
        assert_eq!(c.get(&4), Some(40));

        assert!(!c.replace_if_equals(4, &41, 42));
        assert!(c.replace_if_equals(4, &40, 42));
        assert!(!c.replace_if_equals(6, &0, 1));
        assert_eq!(c.get(&4), Some(42));

        assert_eq!(c.get_or_default(&9, -1), -1);
        c.put_all([(7, 70), (8, 80)]);
        let mut seen = Vec::new();
        c.for_each(|k, v| seen.push((*k, *v))).unwrap();
        seen.sort();
        assert_eq!(seen, vec![(3, 30), (4, 42), (7, 70), (8, 80)]);

        c.clear();
        assert_eq!(c.size(), 0);
    }

    mod semantics {
        use super::*;

        #[test]
        fn exclusive_strategy() {
            derived_contract::<Exclusive>();
        }

        #[test]
        fn shared_exclusive_strategy() {
            derived_contract::<SharedExclusive>();
        }

        #[test]
        fn compute_without_prior_value_does_not_delete() {
            let c = cache::<Exclusive>();
            assert_eq!(c.compute(1, |_, _| None), None);
            assert_eq!(c.inner().deletes.load(Ordering::SeqCst), 0);
        }

        #[test]
        fn failed_preconditions_never_write() {
            let c = cache::<Exclusive>();
            c.put(1, 1);
            let before = writes(&c);
            assert!(!c.replace(2, 2));
            assert!(!c.replace_if_equals(1, &9, 2));
            assert_eq!(c.put_if_absent(1, 3), Some(1));
            assert_eq!(writes(&c), before);
        }
    }

    mod reentrancy {
        use super::*;

        fn nested_compute<L: LockStrategy + Default>() {
            let c = cache::<L>();
            c.put(1, 1);
            let value = c.compute_if_absent(2, |_| c.get(&1).unwrap_or(0) + c.merge(1, 1, |a, b| a + b));
            assert_eq!(value, 3);
            assert_eq!(c.get(&1), Some(2));
            assert_eq!(c.get(&2), Some(3));
        }

        #[test]
        fn exclusive_closure_may_reenter() {
            nested_compute::<Exclusive>();
        }

        #[test]
        fn shared_exclusive_closure_may_reenter() {
            nested_compute::<SharedExclusive>();
        }

        #[test]
        fn for_each_callback_may_mutate() {
            let c = cache::<SharedExclusive>();
            c.put_all([(1, 1), (2, 2)]);
            c.for_each(|k, v| {
                c.put(*k, v * 10);
            })
            .unwrap();
            assert_eq!(c.get(&1), Some(10));
            assert_eq!(c.get(&2), Some(20));
        }
    }

    mod optimistic_probe {
        use super::*;

        #[test]
        fn absent_key_short_circuits_under_shared_lock() {
            let c = cache::<SharedExclusive>();
            // A reader held elsewhere would block any exclusive acquisition.
            let _reader = c.lock.hold_shared();
            assert!(!c.replace(1, 1));
            assert!(!c.replace_if_equals(1, &0, 1));
            assert_eq!(c.compute_if_present(1, |_, v| Some(*v)), None);
        }

        #[test]
        fn present_key_short_circuits_under_shared_lock() {
            let c = cache::<SharedExclusive>();
            c.put(1, 1);
            let _reader = c.lock.hold_shared();
            assert_eq!(c.compute_if_absent(1, |_| 2), 1);
            assert_eq!(c.put_if_absent(1, 2), Some(1));
            assert!(!c.replace_if_equals(1, &5, 6));
        }
    }
}
