//! Contract for the size-bounded engines a cache delegates storage to.
//!
//! Stores own key/value storage and size-based eviction, nothing more. They
//! know nothing about time; expiry and removal attribution are layered on top
//! by [`ExpiringStore`](crate::expiry::engine::ExpiringStore). Every removal a
//! store performs is reported through an [`EvictionHook`] passed to the
//! mutating call, so the caller can attribute it while still holding its own
//! lock.

/// Error returned when a store detects mutation while it is being scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrentModification;

/// Receives removals performed by a store.
pub trait EvictionHook<K, V> {
    /// Called for every entry leaving the store.
    ///
    /// `evicted` is `true` only for capacity-driven evictions. `replacement`
    /// carries the new value when the entry was overwritten in place.
    fn entry_removed(&mut self, key: &K, old: &V, evicted: bool, replacement: Option<&V>);
}

impl<K, V> EvictionHook<K, V> for () {
    #[inline]
    fn entry_removed(&mut self, _key: &K, _old: &V, _evicted: bool, _replacement: Option<&V>) {}
}

/// Size-bounded key/value engine.
///
/// Implementations need not be thread-safe; callers serialize access.
pub trait BoundedStore<K, V>: Send {
    /// Fetch a value, updating recency/frequency bookkeeping.
    fn get(&mut self, key: &K) -> Option<&V>;

    /// Fetch a value without touching eviction order.
    fn peek(&self, key: &K) -> Option<&V>;

    /// Insert or overwrite. Returns the previous value for `key`.
    ///
    /// May evict other entries to honor capacity; each is reported to `hook`
    /// with `evicted = true`.
    fn put(&mut self, key: K, value: V, hook: &mut dyn EvictionHook<K, V>) -> Option<V>;

    /// Remove by key, returning the removed value.
    fn remove(&mut self, key: &K, hook: &mut dyn EvictionHook<K, V>) -> Option<V>;

    /// Remove every entry, reporting each to `hook`.
    fn clear(&mut self, hook: &mut dyn EvictionHook<K, V>);

    /// Current number of entries.
    fn len(&self) -> usize;

    /// Check if the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum entries, or `None` if unbounded.
    fn capacity(&self) -> Option<usize>;

    /// Visit every entry. Fails if the store observes concurrent mutation.
    fn scan(&self, visit: &mut dyn FnMut(&K, &V)) -> Result<(), ConcurrentModification>;
}

impl<K, V, S> BoundedStore<K, V> for Box<S>
where
    S: BoundedStore<K, V> + ?Sized,
{
    fn get(&mut self, key: &K) -> Option<&V> {
        (**self).get(key)
    }

    fn peek(&self, key: &K) -> Option<&V> {
        (**self).peek(key)
    }

    fn put(&mut self, key: K, value: V, hook: &mut dyn EvictionHook<K, V>) -> Option<V> {
        (**self).put(key, value, hook)
    }

    fn remove(&mut self, key: &K, hook: &mut dyn EvictionHook<K, V>) -> Option<V> {
        (**self).remove(key, hook)
    }

    fn clear(&mut self, hook: &mut dyn EvictionHook<K, V>) {
        (**self).clear(hook)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn capacity(&self) -> Option<usize> {
        (**self).capacity()
    }

    fn scan(&self, visit: &mut dyn FnMut(&K, &V)) -> Result<(), ConcurrentModification> {
        (**self).scan(visit)
    }
}
