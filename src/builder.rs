//! Fluent construction of caches.
//!
//! [`CacheBuilder`] collects the settings, resolves them against a
//! [`StoreProvider`] and returns a [`CacheHandle`]: an [`EmptyCache`] or an
//! [`AtomicCache`] over an [`ExpiringStore`], locked by the chosen
//! [`Locking`] discipline. Every configuration problem is reported by
//! `build`, never on first use.
//!
//! ## Resolution Rules
//!
//! | Setting                                  | Outcome                                            |
//! |------------------------------------------|----------------------------------------------------|
//! | `max_size(0)` or `expiry_time(ZERO)`     | permanently empty cache                            |
//! | `expiry_time` without `expiry_policy`    | provider's preferred policy, else `MisconfiguredExpiry` |
//! | `max_size` on an unbounded provider      | `Reject`: [`ConfigError`]; `Ignore`: warn, unbounded |
//! | expiry without `scheduler`               | cache-owned [`ThreadScheduler`], shut down on drop |
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use cachebridge::builder::{CacheBuilder, Locking};
//! use cachebridge::expiry::engine::ExpiryPolicy;
//! use cachebridge::traits::Cache;
//!
//! let cache = CacheBuilder::<u64, String>::new()
//!     .max_size(1_000)
//!     .expiry_time(Duration::from_secs(60))
//!     .expiry_policy(ExpiryPolicy::PostWrite)
//!     .locking(Locking::Optimistic)
//!     .removal_listener(|key, _value, cause| println!("{key} left: {cause:?}"))
//!     .build()
//!     .unwrap();
//!
//! cache.put(1, "hello".to_string());
//! assert_eq!(cache.get(&1), Some("hello".to_string()));
//! ```

use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use crate::empty::EmptyCache;
use crate::error::{CacheError, ConfigError};
use crate::expiry::engine::{ExpiringStore, ExpiryConfig, ExpiryPolicy};
use crate::expiry::scheduler::{Scheduler, ThreadScheduler};
use crate::listener::{RemovalCause, RemovalListener};
use crate::registry::{DynStore, ProviderRegistry, StoreProvider};
use crate::sync::atomic::AtomicCache;
use crate::sync::strategy::{Exclusive, SharedExclusive};
use crate::traits::Cache;

/// Lock discipline for derived operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locking {
    /// A single reentrant mutex around every operation.
    #[default]
    Exclusive,
    /// Shared reads; mutations probe under the shared lock first.
    Optimistic,
}

/// How the builder treats settings the chosen provider cannot honour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MisconfigurationPolicy {
    /// Fail the build.
    Reject,
    /// Log a warning and fall back.
    #[default]
    Ignore,
}

type Engine<K, V> = ExpiringStore<K, V, DynStore<K, V>>;

enum HandleInner<K, V> {
    Empty(EmptyCache<K, V>),
    Exclusive(AtomicCache<K, V, Engine<K, V>, Exclusive>),
    Optimistic(AtomicCache<K, V, Engine<K, V>, SharedExclusive>),
}

/// A cache produced by [`CacheBuilder`].
pub struct CacheHandle<K, V> {
    inner: HandleInner<K, V>,
}

impl<K, V> CacheHandle<K, V> {
    /// Whether the configuration made this cache permanently empty.
    pub fn is_permanently_empty(&self) -> bool {
        matches!(self.inner, HandleInner::Empty(_))
    }

    /// The lock discipline in use, or `None` for an empty cache.
    pub fn locking(&self) -> Option<Locking> {
        match &self.inner {
            HandleInner::Empty(_) => None,
            HandleInner::Exclusive(_) => Some(Locking::Exclusive),
            HandleInner::Optimistic(_) => Some(Locking::Optimistic),
        }
    }
}

impl<K, V> CacheHandle<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// The resolved expiry settings, if entries expire by time.
    pub fn expiry(&self) -> Option<&ExpiryConfig> {
        match &self.inner {
            HandleInner::Empty(_) => None,
            HandleInner::Exclusive(cache) => cache.inner().expiry(),
            HandleInner::Optimistic(cache) => cache.inner().expiry(),
        }
    }
}

macro_rules! dispatch {
    ($handle:expr, $cache:ident => $call:expr) => {
        match &$handle.inner {
            HandleInner::Empty($cache) => $call,
            HandleInner::Exclusive($cache) => $call,
            HandleInner::Optimistic($cache) => $call,
        }
    };
}

impl<K, V> Cache<K, V> for CacheHandle<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        dispatch!(self, c => c.get(key))
    }

    fn put(&self, key: K, value: V) -> Option<V> {
        dispatch!(self, c => c.put(key, value))
    }

    fn remove(&self, key: &K) -> Option<V> {
        dispatch!(self, c => c.remove(key))
    }

    fn clear(&self) {
        dispatch!(self, c => c.clear())
    }

    fn size(&self) -> u64 {
        dispatch!(self, c => c.size())
    }

    fn compute_if_absent<F>(&self, key: K, f: F) -> V
    where
        F: FnOnce(&K) -> V,
    {
        dispatch!(self, c => c.compute_if_absent(key, f))
    }

    fn compute<F>(&self, key: K, f: F) -> Option<V>
    where
        F: FnOnce(&K, Option<&V>) -> Option<V>,
    {
        dispatch!(self, c => c.compute(key, f))
    }

    fn compute_if_present<F>(&self, key: K, f: F) -> Option<V>
    where
        F: FnOnce(&K, &V) -> Option<V>,
    {
        dispatch!(self, c => c.compute_if_present(key, f))
    }

    fn put_if_absent(&self, key: K, value: V) -> Option<V> {
        dispatch!(self, c => c.put_if_absent(key, value))
    }

    fn merge<F>(&self, key: K, value: V, f: F) -> V
    where
        F: FnOnce(&V, &V) -> V,
    {
        dispatch!(self, c => c.merge(key, value, f))
    }

    fn replace(&self, key: K, value: V) -> bool {
        dispatch!(self, c => c.replace(key, value))
    }

    fn replace_if_equals(&self, key: K, expected: &V, value: V) -> bool {
        dispatch!(self, c => c.replace_if_equals(key, expected, value))
    }

    fn get_or_default(&self, key: &K, default: V) -> V {
        dispatch!(self, c => c.get_or_default(key, default))
    }

    fn for_each<F>(&self, f: F) -> Result<(), CacheError>
    where
        F: FnMut(&K, &V),
    {
        dispatch!(self, c => c.for_each(f))
    }
}

impl<K, V> fmt::Debug for CacheHandle<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner {
            HandleInner::Empty(_) => "empty",
            HandleInner::Exclusive(_) => "exclusive",
            HandleInner::Optimistic(_) => "optimistic",
        };
        f.debug_struct("CacheHandle").field("kind", &kind).finish()
    }
}

// ---------------------------------------------------------------------------
// CacheBuilder
// ---------------------------------------------------------------------------

/// Builder for [`CacheHandle`].
pub struct CacheBuilder<K, V> {
    provider: Option<StoreProvider<K, V>>,
    max_size: Option<usize>,
    expiry_time: Option<Duration>,
    expiry_policy: Option<ExpiryPolicy>,
    listener: Option<RemovalListener<K, V>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    locking: Locking,
    misconfiguration: MisconfigurationPolicy,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// A builder with no limits, no expiry and [`Locking::Exclusive`].
    pub fn new() -> Self {
        Self {
            provider: None,
            max_size: None,
            expiry_time: None,
            expiry_policy: None,
            listener: None,
            scheduler: None,
            locking: Locking::default(),
            misconfiguration: MisconfigurationPolicy::default(),
        }
    }

    /// Backs the cache with `provider` instead of the default.
    pub fn provider(mut self, provider: StoreProvider<K, V>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Caps the number of entries. Zero builds an empty cache.
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Expires entries `ttl` after the event chosen by the expiry policy.
    /// Zero builds an empty cache.
    pub fn expiry_time(mut self, ttl: Duration) -> Self {
        self.expiry_time = Some(ttl);
        self
    }

    pub fn expiry_policy(mut self, policy: ExpiryPolicy) -> Self {
        self.expiry_policy = Some(policy);
        self
    }

    /// Called with every entry that leaves the cache, after locks are released.
    pub fn removal_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&K, &V, RemovalCause) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Runs expiry timers on `scheduler`. The cache never shuts it down.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn locking(mut self, locking: Locking) -> Self {
        self.locking = locking;
        self
    }

    pub fn misconfiguration_policy(mut self, policy: MisconfigurationPolicy) -> Self {
        self.misconfiguration = policy;
        self
    }

    /// Builds over the configured provider, or the `lru` provider if none
    /// was set.
    pub fn build(mut self) -> Result<CacheHandle<K, V>, CacheError> {
        let provider = self.provider.take().unwrap_or_else(StoreProvider::lru);
        self.assemble(provider)
    }

    /// Builds over the configured provider, or `registry`'s default.
    pub fn build_with(mut self, registry: &ProviderRegistry<K, V>) -> Result<CacheHandle<K, V>, CacheError> {
        let provider = match self.provider.take() {
            Some(provider) => provider,
            None => registry.default_provider()?,
        };
        self.assemble(provider)
    }

    fn assemble(self, provider: StoreProvider<K, V>) -> Result<CacheHandle<K, V>, CacheError> {
        if self.max_size == Some(0) || self.expiry_time == Some(Duration::ZERO) {
            tracing::debug!(provider = provider.name(), "zero size or expiry; building empty cache");
            return Ok(CacheHandle {
                inner: HandleInner::Empty(EmptyCache::new()),
            });
        }

        let capacity = self.resolve_capacity(&provider)?;
        let policy = self.resolve_policy(&provider)?;

        let expiry = match (self.expiry_time, policy) {
            (Some(ttl), Some(policy)) => Some(match self.scheduler {
                Some(scheduler) => ExpiryConfig::new(ttl, policy, scheduler),
                None => {
                    let scheduler: Arc<dyn Scheduler> = Arc::new(ThreadScheduler::new()?);
                    ExpiryConfig::new(ttl, policy, scheduler).owning_scheduler()
                },
            }),
            _ => None,
        };

        tracing::debug!(
            provider = provider.name(),
            capacity = capacity.map(NonZeroUsize::get),
            expiry = ?expiry,
            locking = ?self.locking,
            "building cache"
        );

        let engine = ExpiringStore::new(provider.create(capacity), expiry, self.listener);
        let inner = match self.locking {
            Locking::Exclusive => HandleInner::Exclusive(AtomicCache::new(engine)),
            Locking::Optimistic => HandleInner::Optimistic(AtomicCache::new(engine)),
        };
        Ok(CacheHandle { inner })
    }

    fn resolve_capacity(&self, provider: &StoreProvider<K, V>) -> Result<Option<NonZeroUsize>, CacheError> {
        let Some(max_size) = self.max_size.and_then(NonZeroUsize::new) else {
            return Ok(None);
        };
        if provider.is_bounded() {
            return Ok(Some(max_size));
        }
        match self.misconfiguration {
            MisconfigurationPolicy::Reject => Err(ConfigError::new(format!(
                "max_size is not supported by store `{}`",
                provider.name()
            ))
            .into()),
            MisconfigurationPolicy::Ignore => {
                tracing::warn!(
                    provider = provider.name(),
                    max_size = max_size.get(),
                    "store cannot bound its size; max_size ignored"
                );
                Ok(None)
            },
        }
    }

    fn resolve_policy(&self, provider: &StoreProvider<K, V>) -> Result<Option<ExpiryPolicy>, CacheError> {
        if self.expiry_time.is_none() {
            return Ok(None);
        }
        if let Some(policy) = self.expiry_policy {
            return Ok(Some(policy));
        }
        match (self.misconfiguration, provider.preferred_expiry()) {
            (MisconfigurationPolicy::Ignore, Some(preferred)) => {
                tracing::warn!(
                    provider = provider.name(),
                    policy = ?preferred,
                    "expiry time set without a policy; using the store's preferred policy"
                );
                Ok(Some(preferred))
            },
            _ => Err(CacheError::MisconfiguredExpiry),
        }
    }
}

impl<K, V> Default for CacheBuilder<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for CacheBuilder<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("provider", &self.provider.as_ref().map(StoreProvider::name))
            .field("max_size", &self.max_size)
            .field("expiry_time", &self.expiry_time)
            .field("expiry_policy", &self.expiry_policy)
            .field("has_listener", &self.listener.is_some())
            .field("locking", &self.locking)
            .field("misconfiguration", &self.misconfiguration)
            .finish_non_exhaustive()
    }
}
