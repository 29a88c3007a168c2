//! A cache that never stores anything.
//!
//! Built when the configured size or time-to-live is zero: every entry would
//! be evicted as soon as it was written, so nothing is ever kept. Compute
//! closures still run and their results are handed back to the caller.

use std::fmt;
use std::marker::PhantomData;

use crate::error::CacheError;
use crate::traits::Cache;

/// Stateless no-op [`Cache`].
pub struct EmptyCache<K, V> {
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> EmptyCache<K, V> {
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K, V> Default for EmptyCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for EmptyCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EmptyCache")
    }
}

impl<K, V> Cache<K, V> for EmptyCache<K, V> {
    fn get(&self, _key: &K) -> Option<V> {
        None
    }

    fn put(&self, _key: K, _value: V) -> Option<V> {
        None
    }

    fn remove(&self, _key: &K) -> Option<V> {
        None
    }

    fn clear(&self) {}

    fn size(&self) -> u64 {
        0
    }

    fn compute_if_absent<F>(&self, key: K, f: F) -> V
    where
        F: FnOnce(&K) -> V,
    {
        f(&key)
    }

    fn compute<F>(&self, key: K, f: F) -> Option<V>
    where
        F: FnOnce(&K, Option<&V>) -> Option<V>,
    {
        f(&key, None)
    }

    fn compute_if_present<F>(&self, _key: K, _f: F) -> Option<V>
    where
        F: FnOnce(&K, &V) -> Option<V>,
    {
        None
    }

    fn put_if_absent(&self, _key: K, _value: V) -> Option<V> {
        None
    }

    fn merge<F>(&self, _key: K, value: V, _f: F) -> V
    where
        F: FnOnce(&V, &V) -> V,
    {
        value
    }

    fn replace(&self, _key: K, _value: V) -> bool {
        false
    }

    fn replace_if_equals(&self, _key: K, _expected: &V, _value: V) -> bool {
        false
    }

    fn get_or_default(&self, _key: &K, default: V) -> V {
        default
    }

    fn for_each<F>(&self, _f: F) -> Result<(), CacheError>
    where
        F: FnMut(&K, &V),
    {
        Ok(())
    }
}
