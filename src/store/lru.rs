//! LRU-bounded store backed by the [`lru`] crate.
//!
//! ## Architecture
//! - Entries live in an `lru::LruCache<K, V>`; recency is maintained by the
//!   crate, capacity is enforced by entry count.
//! - The crate has no eviction callback. `push` hands back either the
//!   overwritten pair for the same key or the evicted LRU pair; the two are
//!   told apart by whether the returned key is still resident afterwards.
//!
//! ## Example Usage
//! ```rust
//! use std::num::NonZeroUsize;
//!
//! use cachebridge::store::lru::LruStore;
//! use cachebridge::store::traits::BoundedStore;
//!
//! let mut store: LruStore<u64, &str> = LruStore::new(NonZeroUsize::new(1).unwrap());
//! store.put(1, "a", &mut ());
//! store.put(2, "b", &mut ()); // evicts 1
//! assert!(store.peek(&1).is_none());
//! assert_eq!(store.peek(&2), Some(&"b"));
//! ```
//!
//! ## Thread Safety
//! - Not thread-safe; wrap in the expiry engine (or a lock) for shared use.

use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;

use crate::store::traits::{BoundedStore, ConcurrentModification, EvictionHook};

/// Least-recently-used store with optional capacity.
pub struct LruStore<K, V>
where
    K: Hash + Eq,
{
    cache: LruCache<K, V>,
    capacity: Option<NonZeroUsize>,
}

impl<K, V> LruStore<K, V>
where
    K: Hash + Eq,
{
    /// Create a store holding at most `capacity` entries.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            cache: LruCache::new(capacity),
            capacity: Some(capacity),
        }
    }

    /// Create a store that never evicts by size.
    pub fn unbounded() -> Self {
        Self {
            cache: LruCache::unbounded(),
            capacity: None,
        }
    }
}

impl<K, V> fmt::Debug for LruStore<K, V>
where
    K: Hash + Eq,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruStore")
            .field("len", &self.cache.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<K, V> BoundedStore<K, V> for LruStore<K, V>
where
    K: Hash + Eq + Send,
    V: Send,
{
    fn get(&mut self, key: &K) -> Option<&V> {
        self.cache.get(key)
    }

    fn peek(&self, key: &K) -> Option<&V> {
        self.cache.peek(key)
    }

    fn put(&mut self, key: K, value: V, hook: &mut dyn EvictionHook<K, V>) -> Option<V> {
        let (old_key, old_value) = self.cache.push(key, value)?;
        match self.cache.peek(&old_key) {
            // Same key still resident: overwritten in place.
            Some(current) => {
                hook.entry_removed(&old_key, &old_value, false, Some(current));
                Some(old_value)
            },
            None => {
                hook.entry_removed(&old_key, &old_value, true, None);
                None
            },
        }
    }

    fn remove(&mut self, key: &K, hook: &mut dyn EvictionHook<K, V>) -> Option<V> {
        let removed = self.cache.pop(key)?;
        hook.entry_removed(key, &removed, false, None);
        Some(removed)
    }

    fn clear(&mut self, hook: &mut dyn EvictionHook<K, V>) {
        while let Some((key, value)) = self.cache.pop_lru() {
            hook.entry_removed(&key, &value, false, None);
        }
    }

    fn len(&self) -> usize {
        self.cache.len()
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity.map(NonZeroUsize::get)
    }

    fn scan(&self, visit: &mut dyn FnMut(&K, &V)) -> Result<(), ConcurrentModification> {
        for (key, value) in self.cache.iter() {
            visit(key, value);
        }
        Ok(())
    }
}
