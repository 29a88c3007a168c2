//! Store providers and the registry that names them.
//!
//! A [`StoreProvider`] is a named factory for the size-bounded primitive an
//! [`ExpiringStore`](crate::expiry::engine::ExpiringStore) wraps. Providers
//! are registered explicitly on a caller-owned [`ProviderRegistry`]; nothing
//! is discovered at runtime and there is no process-wide instance.
//!
//! | Provider   | Store                                         | Bounded | Preferred expiry |
//! |------------|-----------------------------------------------|---------|------------------|
//! | `lru`      | [`LruStore`](crate::store::lru::LruStore)     | yes     | `PostAccess`     |
//! | `hash_map` | [`HashMapStore`](crate::store::hashmap::HashMapStore) | no | none        |
//!
//! ## Example
//!
//! ```
//! use cachebridge::registry::{ProviderRegistry, StoreProvider};
//!
//! let registry = ProviderRegistry::<u64, String>::new();
//! registry.register(StoreProvider::hash_map());
//! registry.register(StoreProvider::lru());
//!
//! // The first registration became the default.
//! assert_eq!(registry.default_provider().unwrap().name(), "hash_map");
//!
//! registry.set_default_by_name("lru").unwrap();
//! assert_eq!(registry.default_provider().unwrap().name(), "lru");
//! ```

use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{CacheError, ConfigError};
use crate::expiry::engine::{ExpiryPolicy, Stamped};
use crate::store::hashmap::HashMapStore;
use crate::store::lru::LruStore;
use crate::store::traits::BoundedStore;

/// Boxed primitive produced by a provider.
pub type DynStore<K, V> = Box<dyn BoundedStore<K, Stamped<V>>>;

type StoreFactory<K, V> = Arc<dyn Fn(Option<NonZeroUsize>) -> DynStore<K, V> + Send + Sync>;

/// A named factory for backing stores.
pub struct StoreProvider<K, V> {
    name: String,
    preferred_expiry: Option<ExpiryPolicy>,
    bounded: bool,
    factory: StoreFactory<K, V>,
}

impl<K, V> StoreProvider<K, V> {
    /// Creates a provider. `factory` receives the configured capacity, or
    /// `None` for an unbounded store.
    pub fn new<F>(name: impl Into<String>, bounded: bool, factory: F) -> Self
    where
        F: Fn(Option<NonZeroUsize>) -> DynStore<K, V> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            preferred_expiry: None,
            bounded,
            factory: Arc::new(factory),
        }
    }

    /// Sets the policy used when a cache asks for expiry without naming one.
    pub fn prefer_expiry(mut self, policy: ExpiryPolicy) -> Self {
        self.preferred_expiry = Some(policy);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn preferred_expiry(&self) -> Option<ExpiryPolicy> {
        self.preferred_expiry
    }

    /// Whether the store honours a capacity.
    pub fn is_bounded(&self) -> bool {
        self.bounded
    }

    /// Builds a fresh store.
    pub fn create(&self, capacity: Option<NonZeroUsize>) -> DynStore<K, V> {
        (self.factory)(capacity)
    }
}

impl<K, V> StoreProvider<K, V>
where
    K: Eq + Hash + Send + 'static,
    V: Send + 'static,
{
    /// LRU-bounded store over the `lru` crate.
    pub fn lru() -> Self {
        Self::new("lru", true, |capacity| -> DynStore<K, V> {
            match capacity {
                Some(capacity) => Box::new(LruStore::<K, Stamped<V>>::new(capacity)),
                None => Box::new(LruStore::<K, Stamped<V>>::unbounded()),
            }
        })
        .prefer_expiry(ExpiryPolicy::PostAccess)
    }

    /// Unbounded hash map; evicts only by time.
    pub fn hash_map() -> Self {
        Self::new("hash_map", false, |_| -> DynStore<K, V> {
            Box::new(HashMapStore::<K, Stamped<V>>::new())
        })
    }
}

impl<K, V> Clone for StoreProvider<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            preferred_expiry: self.preferred_expiry,
            bounded: self.bounded,
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<K, V> fmt::Debug for StoreProvider<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreProvider")
            .field("name", &self.name)
            .field("preferred_expiry", &self.preferred_expiry)
            .field("bounded", &self.bounded)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ProviderRegistry
// ---------------------------------------------------------------------------

struct Registered<K, V> {
    providers: FxHashMap<String, StoreProvider<K, V>>,
    default: Option<String>,
}

/// Caller-owned set of named providers with a default.
pub struct ProviderRegistry<K, V> {
    inner: RwLock<Registered<K, V>>,
}

impl<K, V> ProviderRegistry<K, V> {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Registered {
                providers: FxHashMap::default(),
                default: None,
            }),
        }
    }

    /// Adds `provider`, replacing any provider with the same name. The first
    /// provider registered becomes the default.
    pub fn register(&self, provider: StoreProvider<K, V>) {
        let mut inner = self.inner.write();
        let name = provider.name.clone();
        if inner.default.is_none() {
            tracing::debug!(provider = %name, "registered default store provider");
            inner.default = Some(name.clone());
        } else {
            tracing::debug!(provider = %name, "registered store provider");
        }
        inner.providers.insert(name, provider);
    }

    /// Registers `provider` and makes it the default.
    pub fn set_default(&self, provider: StoreProvider<K, V>) {
        let name = provider.name.clone();
        self.register(provider);
        self.inner.write().default = Some(name);
    }

    /// Makes the registered provider `name` the default.
    pub fn set_default_by_name(&self, name: &str) -> Result<(), ConfigError> {
        let mut inner = self.inner.write();
        if !inner.providers.contains_key(name) {
            return Err(ConfigError::new(format!("no store provider named `{name}`")));
        }
        tracing::debug!(provider = %name, "default store provider changed");
        inner.default = Some(name.to_owned());
        Ok(())
    }

    /// The default provider.
    pub fn default_provider(&self) -> Result<StoreProvider<K, V>, CacheError> {
        let inner = self.inner.read();
        inner
            .default
            .as_ref()
            .and_then(|name| inner.providers.get(name))
            .cloned()
            .ok_or(CacheError::NoDefaultProvider)
    }

    /// The provider registered as `name`.
    pub fn get(&self, name: &str) -> Option<StoreProvider<K, V>> {
        self.inner.read().providers.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> ProviderRegistry<K, V>
where
    K: Eq + Hash + Send + 'static,
    V: Send + 'static,
{
    /// A registry holding `lru` (the default) and `hash_map`.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(StoreProvider::lru());
        registry.register(StoreProvider::hash_map());
        registry
    }
}

impl<K, V> Default for ProviderRegistry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for ProviderRegistry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        let mut names: Vec<_> = inner.providers.keys().collect();
        names.sort();
        f.debug_struct("ProviderRegistry")
            .field("providers", &names)
            .field("default", &inner.default)
            .finish()
    }
}
