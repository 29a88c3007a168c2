//! Timer-driven expiry over a store that only evicts by size.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────── ExpiringStore<K, V, S> ───────────────────────────┐
//!   │                                                                               │
//!   │   Mutex<State>                                                                │
//!   │   ├── store:   S: BoundedStore<K, Stamped<V>>     (size eviction → hook)      │
//!   │   ├── tracker: FxHashMap<(K, generation), TimerHandle>                        │
//!   │   └── generation counter (bumped on every write)                              │
//!   │                                                                               │
//!   │   ExpiryConfig { ttl, policy, scheduler }      RemovalListener                │
//!   └───────────────────────────────────────────────────────────────────────────────┘
//!              │ schedule(ttl, task)                        ▲ expire(key, gen, handle)
//!              ▼                                            │
//!        Scheduler worker ──────────────────────────────────┘
//! ```
//!
//! ## Entry Identity
//!
//! Every write stamps its value with a fresh generation. `(key, generation)`
//! is the identity the tracker and the timers work with, so "is this still
//! the value I was scheduled for" is a generation comparison and never
//! depends on `V: PartialEq`.
//!
//! ## Timer Races
//!
//! A timer handle is cancelled whenever its identity is superseded (overwrite,
//! removal, size eviction, re-access under [`ExpiryPolicy::PostAccess`]).
//! Cancellation can lose against a timer that already started; that timer
//! then revalidates under the engine lock and only removes the entry if
//! its generation is still current **and** the tracker still maps the
//! identity to the timer's own handle.
//!
//! ## Removal Attribution
//!
//! | Path                        | Cause      |
//! |-----------------------------|------------|
//! | store hook, `evicted = true`| `Size`     |
//! | `write` over existing key   | `Replaced` |
//! | `delete` / `wipe`           | `Manual`   |
//! | timer after revalidation    | `Time`     |
//!
//! Listeners run after the engine lock is released.
//!
//! ## Failure Semantics
//!
//! - A scheduler that rejects a timer is logged and ignored: the entry simply
//!   never expires by time.
//! - A store that reports mutation during `scan` fails the scan with
//!   [`CacheError::ConcurrentMutationDuringScan`]; it is not retried.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::CacheError;
use crate::expiry::scheduler::{ScheduledTask, Scheduler, TimerHandle};
use crate::listener::{self, Removal, RemovalCause, RemovalListener};
use crate::store::traits::{BoundedStore, EvictionHook};
use crate::traits::RawCache;

/// When the time-to-live clock restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpiryPolicy {
    /// Only writes restart the clock.
    PostWrite,
    /// Writes and reads restart the clock.
    PostAccess,
}

/// Time-to-live settings for an [`ExpiringStore`].
#[derive(Clone)]
pub struct ExpiryConfig {
    ttl: Duration,
    policy: ExpiryPolicy,
    scheduler: Arc<dyn Scheduler>,
    owns_scheduler: bool,
}

impl ExpiryConfig {
    /// Expire entries `ttl` after the event selected by `policy`, using a
    /// scheduler owned by the caller.
    pub fn new(ttl: Duration, policy: ExpiryPolicy, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            ttl,
            policy,
            scheduler,
            owns_scheduler: false,
        }
    }

    /// Hand the scheduler's lifecycle to the engine: it is shut down when the
    /// engine is dropped.
    pub fn owning_scheduler(mut self) -> Self {
        self.owns_scheduler = true;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn policy(&self) -> ExpiryPolicy {
        self.policy
    }
}

impl fmt::Debug for ExpiryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiryConfig")
            .field("ttl", &self.ttl)
            .field("policy", &self.policy)
            .field("owns_scheduler", &self.owns_scheduler)
            .finish_non_exhaustive()
    }
}

/// A value tagged with the generation of the write that stored it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamped<V> {
    value: V,
    generation: u64,
}

impl<V> Stamped<V> {
    fn new(value: V, generation: u64) -> Self {
        Self { value, generation }
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn into_value(self) -> V {
        self.value
    }
}

/// Collects store removals for attribution once the store call returns.
struct HookLog<K, V> {
    evictions: Vec<(K, Stamped<V>)>,
    removals: Vec<(K, Stamped<V>)>,
    keep_removals: bool,
}

impl<K, V> HookLog<K, V> {
    fn evictions_only() -> Self {
        Self {
            evictions: Vec::new(),
            removals: Vec::new(),
            keep_removals: false,
        }
    }

    fn with_removals() -> Self {
        Self {
            keep_removals: true,
            ..Self::evictions_only()
        }
    }
}

impl<K, V> EvictionHook<K, Stamped<V>> for HookLog<K, V>
where
    K: Clone,
    V: Clone,
{
    fn entry_removed(
        &mut self,
        key: &K,
        old: &Stamped<V>,
        evicted: bool,
        replacement: Option<&Stamped<V>>,
    ) {
        if evicted {
            self.evictions.push((key.clone(), old.clone()));
        } else if replacement.is_none() && self.keep_removals {
            self.removals.push((key.clone(), old.clone()));
        }
        // Replacements are attributed by `write` itself.
    }
}

struct State<K, V, S> {
    store: S,
    tracker: FxHashMap<(K, u64), TimerHandle>,
    generation: u64,
    _values: PhantomData<fn() -> V>,
}

impl<K, V, S> State<K, V, S>
where
    K: Clone + Eq + Hash,
{
    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn cancel(&mut self, key: &K, generation: u64) {
        if let Some(handle) = self.tracker.remove(&(key.clone(), generation)) {
            handle.cancel();
        }
    }

    /// Attributes what the store reported during the last call.
    fn settle(&mut self, log: HookLog<K, V>, removals: &mut Vec<Removal<K, V>>) {
        for (key, entry) in log.evictions {
            self.cancel(&key, entry.generation);
            removals.push(Removal::new(key, entry.value, RemovalCause::Size));
        }
        for (key, entry) in log.removals {
            self.cancel(&key, entry.generation);
            removals.push(Removal::new(key, entry.value, RemovalCause::Manual));
        }
    }
}

struct Shared<K, V, S> {
    state: Mutex<State<K, V, S>>,
    expiry: Option<ExpiryConfig>,
    listener: Option<RemovalListener<K, V>>,
}

impl<K, V, S> Shared<K, V, S>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BoundedStore<K, Stamped<V>> + 'static,
{
    fn refreshes_on_read(&self) -> bool {
        self.expiry
            .as_ref()
            .is_some_and(|expiry| expiry.policy == ExpiryPolicy::PostAccess)
    }

    /// Starts (or restarts) the timer for `(key, entry.generation)`.
    fn schedule_expiry(
        self: &Arc<Self>,
        state: &mut State<K, V, S>,
        key: &K,
        entry: &Stamped<V>,
    ) {
        let Some(expiry) = &self.expiry else {
            return;
        };

        let handle = TimerHandle::new();
        let engine = Arc::downgrade(self);
        let timer_key = key.clone();
        let generation = entry.generation;
        let own = handle.clone();
        let task = ScheduledTask::new(handle.clone(), move || {
            if let Some(shared) = Weak::upgrade(&engine) {
                shared.expire(&timer_key, generation, &own);
            }
        });

        if let Err(err) = expiry.scheduler.schedule(expiry.ttl, task) {
            tracing::warn!(error = %err, "expiry timer rejected; entry will not expire by time");
            return;
        }

        if let Some(previous) = state.tracker.insert((key.clone(), generation), handle) {
            previous.cancel();
        }
    }

    /// Timer callback: removes the entry if `own` is still its live timer.
    fn expire(&self, key: &K, generation: u64, own: &TimerHandle) {
        let mut removals = Vec::new();
        {
            let mut state = self.state.lock();
            let identity = (key.clone(), generation);
            let live = state
                .tracker
                .get(&identity)
                .is_some_and(|handle| handle.ptr_eq(own));
            if !live {
                return;
            }
            state.tracker.remove(&identity);

            let current = state
                .store
                .peek(key)
                .is_some_and(|entry| entry.generation == generation);
            if current {
                let mut log = HookLog::evictions_only();
                if let Some(entry) = state.store.remove(key, &mut log) {
                    removals.push(Removal::new(key.clone(), entry.value, RemovalCause::Time));
                }
                state.settle(log, &mut removals);
            }
        }
        self.notify(removals);
    }

    fn notify(&self, removals: Vec<Removal<K, V>>) {
        if !removals.is_empty() {
            listener::dispatch(self.listener.as_ref(), removals);
        }
    }
}

impl<K, V, S> Drop for Shared<K, V, S> {
    fn drop(&mut self) {
        if let Some(expiry) = &self.expiry {
            if expiry.owns_scheduler {
                expiry.scheduler.shutdown();
            }
        }
    }
}

/// Adds time-to-live expiry and removal attribution to a [`BoundedStore`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use cachebridge::expiry::engine::{ExpiringStore, ExpiryConfig, ExpiryPolicy, Stamped};
/// use cachebridge::expiry::scheduler::ManualScheduler;
/// use cachebridge::store::hashmap::HashMapStore;
/// use cachebridge::traits::RawCache;
///
/// let scheduler = Arc::new(ManualScheduler::new());
/// let expiry = ExpiryConfig::new(Duration::from_secs(1), ExpiryPolicy::PostWrite, scheduler.clone());
/// let engine: ExpiringStore<&str, i32, HashMapStore<&str, Stamped<i32>>> =
///     ExpiringStore::new(HashMapStore::new(), Some(expiry), None);
///
/// engine.write("k", 1);
/// scheduler.advance(Duration::from_millis(999));
/// assert_eq!(engine.read(&"k"), Some(1));
/// scheduler.advance(Duration::from_millis(1));
/// assert_eq!(engine.read(&"k"), None);
/// ```
pub struct ExpiringStore<K, V, S> {
    shared: Arc<Shared<K, V, S>>,
}

impl<K, V, S> ExpiringStore<K, V, S>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BoundedStore<K, Stamped<V>> + 'static,
{
    /// Wraps `store`. Without `expiry` the engine only attributes removals.
    pub fn new(
        store: S,
        expiry: Option<ExpiryConfig>,
        listener: Option<RemovalListener<K, V>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    store,
                    tracker: FxHashMap::default(),
                    generation: 0,
                    _values: PhantomData,
                }),
                expiry,
                listener,
            }),
        }
    }

    /// The expiry settings, if time-based expiry is enabled.
    pub fn expiry(&self) -> Option<&ExpiryConfig> {
        self.shared.expiry.as_ref()
    }

    /// Number of identities with a tracked timer.
    pub fn tracked_timers(&self) -> usize {
        self.shared.state.lock().tracker.len()
    }

    /// Number of tracked timers that have neither fired nor been cancelled.
    pub fn live_timers(&self) -> usize {
        self.shared
            .state
            .lock()
            .tracker
            .values()
            .filter(|handle| handle.is_pending())
            .count()
    }
}

impl<K, V, S> RawCache<K, V> for ExpiringStore<K, V, S>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BoundedStore<K, Stamped<V>> + 'static,
{
    fn read(&self, key: &K) -> Option<V> {
        let shared = &self.shared;
        let found = {
            let mut state = shared.state.lock();
            let found = state.store.get(key).cloned();
            if let Some(entry) = &found {
                if shared.refreshes_on_read() {
                    shared.schedule_expiry(&mut state, key, entry);
                }
            }
            found
        };
        found.map(Stamped::into_value)
    }

    fn write(&self, key: K, value: V) -> Option<V> {
        let shared = &self.shared;
        let mut removals = Vec::new();
        let prior = {
            let mut state = shared.state.lock();
            let generation = state.next_generation();
            let entry = Stamped::new(value, generation);
            let mut log = HookLog::evictions_only();
            let prior = state.store.put(key.clone(), entry.clone(), &mut log);

            // A write always restarts the clock, whatever the policy.
            shared.schedule_expiry(&mut state, &key, &entry);

            if let Some(prior) = &prior {
                // Generations are unique per write: the prior identity is always distinct.
                state.cancel(&key, prior.generation);
                if shared.listener.is_some() {
                    removals.push(Removal::new(
                        key.clone(),
                        prior.value.clone(),
                        RemovalCause::Replaced,
                    ));
                }
            }
            state.settle(log, &mut removals);
            prior
        };
        shared.notify(removals);
        prior.map(Stamped::into_value)
    }

    fn delete(&self, key: &K) -> Option<V> {
        let shared = &self.shared;
        let mut removals = Vec::new();
        let removed = {
            let mut state = shared.state.lock();
            if let Some(generation) = state.store.peek(key).map(Stamped::generation) {
                state.cancel(key, generation);
            }
            let mut log = HookLog::evictions_only();
            let removed = state.store.remove(key, &mut log);
            state.settle(log, &mut removals);
            if let Some(entry) = &removed {
                if shared.listener.is_some() {
                    removals.push(Removal::new(
                        key.clone(),
                        entry.value.clone(),
                        RemovalCause::Manual,
                    ));
                }
            }
            removed
        };
        shared.notify(removals);
        removed.map(Stamped::into_value)
    }

    fn count(&self) -> u64 {
        self.shared.state.lock().store.len() as u64
    }

    fn wipe(&self) {
        let shared = &self.shared;
        let mut removals = Vec::new();
        {
            let mut state = shared.state.lock();
            let mut log = HookLog::with_removals();
            state.store.clear(&mut log);
            for (_, handle) in state.tracker.drain() {
                handle.cancel();
            }
            state.settle(log, &mut removals);
        }
        shared.notify(removals);
    }

    fn scan(&self, visit: &mut dyn FnMut(&K, &V)) -> Result<(), CacheError> {
        let shared = &self.shared;
        let snapshot = {
            let mut state = shared.state.lock();
            let mut entries = Vec::with_capacity(state.store.len());
            let scanned = state
                .store
                .scan(&mut |key, entry| entries.push((key.clone(), entry.clone())));
            if scanned.is_err() {
                tracing::warn!("backing store was mutated during a full scan");
                return Err(CacheError::ConcurrentMutationDuringScan);
            }
            if shared.refreshes_on_read() {
                for (key, entry) in &entries {
                    shared.schedule_expiry(&mut state, key, entry);
                }
            }
            entries
        };
        for (key, entry) in &snapshot {
            visit(key, &entry.value);
        }
        Ok(())
    }
}

impl<K, V, S> fmt::Debug for ExpiringStore<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringStore")
            .field("expiry", &self.shared.expiry)
            .field("has_listener", &self.shared.listener.is_some())
            .finish_non_exhaustive()
    }
}
