//! Storage engines a cache delegates to.
//!
//! - [`traits`]: the [`BoundedStore`](traits::BoundedStore) contract and its
//!   eviction hook.
//! - [`lru`]: LRU-bounded store over the `lru` crate.
//! - [`hashmap`]: unbounded store over `FxHashMap`.

pub mod hashmap;
pub mod lru;
pub mod traits;
