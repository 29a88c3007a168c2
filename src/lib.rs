//! cachebridge: atomic compound operations and timer-driven expiry layered
//! over size-bounded cache engines.
//!
//! ```text
//!   Cache<K, V>  ── CacheHandle / AtomicCache<P, L>   (sync)
//!        │
//!   RawCache<K, V> ── ExpiringStore<K, V, S>         (expiry)
//!        │
//!   BoundedStore<K, V> ── LruStore / HashMapStore    (store)
//! ```
//!
//! Start from [`builder::CacheBuilder`]; [`prelude`] re-exports the common types.

pub mod builder;
pub mod empty;
pub mod error;
pub mod expiry;
pub mod listener;
pub mod prelude;
pub mod registry;
pub mod store;
pub mod sync;
pub mod traits;
