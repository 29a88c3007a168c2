//! # Cache Contracts
//!
//! Two layers of traits split *what a cache can do* from *how it is made
//! atomic*:
//!
//! ```text
//!   ┌──────────────────────────────────────────────┐
//!   │                 Cache<K, V>                  │  public contract
//!   │                                              │
//!   │  get / put / remove / clear / size           │
//!   │  compute_if_absent / compute                 │
//!   │  compute_if_present / put_if_absent / merge  │
//!   │  replace / replace_if_equals                 │
//!   │  get_or_default / put_all / for_each         │
//!   └──────────────────────┬───────────────────────┘
//!                          │ derived by AtomicCache<P, L>
//!                          ▼
//!   ┌──────────────────────────────────────────────┐
//!   │                RawCache<K, V>                │  primitive contract
//!   │                                              │
//!   │  read / write / delete / count / wipe / scan │
//!   └──────────────────────┬───────────────────────┘
//!                          │ implemented by ExpiringStore<K, V, S>
//!                          ▼
//!   ┌──────────────────────────────────────────────┐
//!   │              BoundedStore<K, V>              │  external engine
//!   └──────────────────────────────────────────────┘
//! ```
//!
//! ## Trait Summary
//!
//! | Trait          | Implemented by                   | Purpose                          |
//! |----------------|----------------------------------|----------------------------------|
//! | `Cache`        | `AtomicCache`, `EmptyCache`, `CacheHandle` | Full cache API         |
//! | `RawCache`     | `ExpiringStore`                  | Thread-safe primitives only      |
//! | `BoundedStore` | `LruStore`, `HashMapStore`       | Single-threaded size-bounded map |
//!
//! ## Conditional Operations
//!
//! A conditional operation whose precondition does not hold (`replace` on an
//! absent key, `put_if_absent` on a present one) is ordinary control flow:
//! it reports `false` / the existing value and never errors.

use crate::error::CacheError;

/// Thread-safe primitive operations a derived cache is built from.
///
/// Implementations are internally synchronized; no guarantee is made about
/// atomicity *across* calls.
pub trait RawCache<K, V>: Send + Sync {
    /// Fetch the value for `key`.
    fn read(&self, key: &K) -> Option<V>;

    /// Store `value`, returning the value it replaced.
    fn write(&self, key: K, value: V) -> Option<V>;

    /// Remove `key`, returning the removed value.
    fn delete(&self, key: &K) -> Option<V>;

    /// Number of entries.
    fn count(&self) -> u64;

    /// Remove every entry.
    fn wipe(&self);

    /// Visit every entry.
    fn scan(&self, visit: &mut dyn FnMut(&K, &V)) -> Result<(), CacheError>;
}

/// The public cache contract.
///
/// # Example
///
/// ```
/// use cachebridge::builder::CacheBuilder;
/// use cachebridge::traits::Cache;
///
/// let cache = CacheBuilder::<String, u32>::new().max_size(16).build().unwrap();
///
/// assert_eq!(cache.put("a".into(), 1), None);
/// assert_eq!(cache.merge("a".into(), 2, |old, new| old + new), 3);
/// assert!(cache.replace_if_equals("a".into(), &3, 4));
/// assert_eq!(cache.get(&"a".into()), Some(4));
/// ```
pub trait Cache<K, V> {
    /// Fetch the value for `key`.
    fn get(&self, key: &K) -> Option<V>;

    /// Store `value`, returning the value it replaced.
    fn put(&self, key: K, value: V) -> Option<V>;

    /// Remove `key`, returning the removed value.
    fn remove(&self, key: &K) -> Option<V>;

    /// Remove every entry.
    fn clear(&self);

    /// Number of entries.
    fn size(&self) -> u64;

    /// Return the present value, or compute, store and return a new one.
    fn compute_if_absent<F>(&self, key: K, f: F) -> V
    where
        F: FnOnce(&K) -> V;

    /// Replace the mapping with `f(key, current)`. A `None` result removes
    /// the key. Returns the new value.
    fn compute<F>(&self, key: K, f: F) -> Option<V>
    where
        F: FnOnce(&K, Option<&V>) -> Option<V>;

    /// Like [`compute`](Self::compute), but `f` only runs if a value exists.
    fn compute_if_present<F>(&self, key: K, f: F) -> Option<V>
    where
        F: FnOnce(&K, &V) -> Option<V>;

    /// Store `value` only if `key` is absent. Returns the existing value.
    fn put_if_absent(&self, key: K, value: V) -> Option<V>;

    /// Store `value` if absent, otherwise store `f(current, value)`.
    /// Returns the stored value.
    fn merge<F>(&self, key: K, value: V, f: F) -> V
    where
        F: FnOnce(&V, &V) -> V;

    /// Store `value` only if `key` is present. Returns whether it was stored.
    fn replace(&self, key: K, value: V) -> bool;

    /// Store `value` only if the current value equals `expected`.
    /// Returns whether it was stored.
    fn replace_if_equals(&self, key: K, expected: &V, value: V) -> bool;

    /// Fetch the value for `key`, or `default` if absent.
    fn get_or_default(&self, key: &K, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    /// Store every pair from `entries`.
    fn put_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.put(key, value);
        }
    }

    /// Visit every entry of a point-in-time snapshot.
    fn for_each<F>(&self, f: F) -> Result<(), CacheError>
    where
        F: FnMut(&K, &V);
}
