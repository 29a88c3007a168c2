pub use crate::builder::{CacheBuilder, CacheHandle, Locking, MisconfigurationPolicy};
pub use crate::empty::EmptyCache;
pub use crate::error::{CacheError, ConfigError};
pub use crate::expiry::engine::{ExpiringStore, ExpiryConfig, ExpiryPolicy, Stamped};
pub use crate::expiry::scheduler::{
    ManualScheduler, ScheduledTask, Scheduler, SchedulerError, ThreadScheduler, TimerHandle,
};
pub use crate::listener::{RemovalCause, RemovalListener};
pub use crate::registry::{ProviderRegistry, StoreProvider};
pub use crate::store::hashmap::HashMapStore;
pub use crate::store::lru::LruStore;
pub use crate::store::traits::{BoundedStore, EvictionHook};
pub use crate::sync::atomic::AtomicCache;
pub use crate::sync::strategy::{Exclusive, LockStrategy, SharedExclusive};
pub use crate::traits::{Cache, RawCache};
