//! Removal notifications.
//!
//! Every entry that leaves a cache is reported to the configured
//! [`RemovalListener`] exactly once, tagged with a [`RemovalCause`].
//!
//! | Cause      | Eviction | Reported by                          |
//! |------------|----------|--------------------------------------|
//! | `Size`     | yes      | backing store capacity hook          |
//! | `Time`     | yes      | expiry timer after revalidation      |
//! | `Replaced` | no       | `put` over an existing key           |
//! | `Manual`   | no       | `remove` / `clear`                   |
//! | `Other`    | yes      | stores without a finer-grained cause |

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// The reason an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RemovalCause {
    /// The capacity constraint of the backing store was hit.
    Size,
    /// The entry outlived its time-to-live.
    Time,
    /// The value associated with the key was overwritten.
    Replaced,
    /// The entry was removed explicitly.
    Manual,
    /// An extraneous eviction the store cannot attribute further.
    Other,
}

impl RemovalCause {
    /// Returns `true` if the removal was caused by policy rather than by
    /// the caller (`Size`, `Time`, `Other`).
    #[inline]
    pub fn is_eviction(self) -> bool {
        matches!(self, Self::Size | Self::Time | Self::Other)
    }
}

/// Callback invoked with `(key, value, cause)` for every removed entry.
pub type RemovalListener<K, V> = Arc<dyn Fn(&K, &V, RemovalCause) + Send + Sync>;

/// A removal waiting to be delivered once locks are released.
#[derive(Debug)]
pub(crate) struct Removal<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) cause: RemovalCause,
}

impl<K, V> Removal<K, V> {
    pub(crate) fn new(key: K, value: V, cause: RemovalCause) -> Self {
        Self { key, value, cause }
    }
}

/// Delivers removals in order. A panicking listener is logged and the
/// remaining removals are still delivered.
pub(crate) fn dispatch<K, V>(listener: Option<&RemovalListener<K, V>>, removals: Vec<Removal<K, V>>) {
    let Some(listener) = listener else {
        return;
    };
    for removal in removals {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            listener(&removal.key, &removal.value, removal.cause)
        }));
        if outcome.is_err() {
            tracing::error!(cause = ?removal.cause, "removal listener panicked");
        }
    }
}
