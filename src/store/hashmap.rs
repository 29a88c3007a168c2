//! HashMap-backed store without size eviction.
//!
//! ## Architecture
//! - Keys are stored in a `HashMap<K, V, S>` for O(1) lookup.
//! - There is no capacity: the store never evicts, so its hook only ever
//!   sees replacements, removals and clears.
//!
//! ## When to Use
//! - Caches that only need time-based expiry.
//! - Tests that want a store with no eviction order to reason about.
//!
//! ## Example Usage
//! ```rust
//! use cachebridge::store::hashmap::HashMapStore;
//! use cachebridge::store::traits::BoundedStore;
//!
//! let mut store: HashMapStore<u64, String> = HashMapStore::new();
//! store.put(1, "a".to_string(), &mut ());
//! assert_eq!(store.peek(&1).map(String::as_str), Some("a"));
//! assert_eq!(store.capacity(), None);
//! ```
//!
//! ## Type Constraints
//! - `K: Eq + Hash` for key lookup.
//! - `S: BuildHasher` for custom hashers (defaults to `FxBuildHasher`).
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

use rustc_hash::FxBuildHasher;

use crate::store::traits::{BoundedStore, ConcurrentModification, EvictionHook};

/// Unbounded HashMap-backed store.
#[derive(Debug)]
pub struct HashMapStore<K, V, S = FxBuildHasher> {
    map: HashMap<K, V, S>,
}

impl<K, V> HashMapStore<K, V, FxBuildHasher>
where
    K: Eq + Hash,
{
    /// Create an empty store with the default hasher.
    pub fn new() -> Self {
        Self::with_hasher(FxBuildHasher)
    }
}

impl<K, V> Default for HashMapStore<K, V, FxBuildHasher>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> HashMapStore<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Create an empty store with a custom hasher.
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            map: HashMap::with_hasher(hasher),
        }
    }
}

impl<K, V, S> BoundedStore<K, V> for HashMapStore<K, V, S>
where
    K: Eq + Hash + Send,
    V: Send,
    S: BuildHasher + Send,
{
    fn get(&mut self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    fn peek(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    fn put(&mut self, key: K, value: V, hook: &mut dyn EvictionHook<K, V>) -> Option<V> {
        use std::collections::hash_map::Entry;

        match self.map.entry(key) {
            Entry::Occupied(mut slot) => {
                let previous = slot.insert(value);
                hook.entry_removed(slot.key(), &previous, false, Some(slot.get()));
                Some(previous)
            },
            Entry::Vacant(slot) => {
                slot.insert(value);
                None
            },
        }
    }

    fn remove(&mut self, key: &K, hook: &mut dyn EvictionHook<K, V>) -> Option<V> {
        let removed = self.map.remove(key)?;
        hook.entry_removed(key, &removed, false, None);
        Some(removed)
    }

    fn clear(&mut self, hook: &mut dyn EvictionHook<K, V>) {
        for (key, value) in self.map.drain() {
            hook.entry_removed(&key, &value, false, None);
        }
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn capacity(&self) -> Option<usize> {
        None
    }

    fn scan(&self, visit: &mut dyn FnMut(&K, &V)) -> Result<(), ConcurrentModification> {
        for (key, value) in &self.map {
            visit(key, value);
        }
        Ok(())
    }
}
