//! Error types for the cachebridge library.
//!
//! ## Key Components
//!
//! - [`CacheError`]: Every failure a cache can surface to its caller.
//! - [`ConfigError`]: Returned when builder parameters are invalid
//!   (e.g. `max_size` on an unbounded store under a rejecting policy).
//!
//! Conditional operations (`replace`, `put_if_absent`, ...) whose
//! precondition is not met are *not* errors: they report `false` / `None`.
//!
//! ## Example Usage
//!
//! ```
//! use std::time::Duration;
//!
//! use cachebridge::builder::{CacheBuilder, MisconfigurationPolicy};
//! use cachebridge::error::CacheError;
//!
//! // Expiry without a policy is rejected at build time, never on first use
//! let err = CacheBuilder::<u64, u64>::new()
//!     .expiry_time(Duration::from_secs(1))
//!     .misconfiguration_policy(MisconfigurationPolicy::Reject)
//!     .build()
//!     .unwrap_err();
//! assert!(matches!(err, CacheError::MisconfiguredExpiry));
//! ```

use crate::expiry::scheduler::SchedulerError;

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Errors produced while constructing or scanning a cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An expiry time was requested but no expiry policy could be resolved.
    #[error("expiry time was set without an expiry policy, even as a default")]
    MisconfiguredExpiry,

    /// A builder parameter failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No store provider was set and the registry has no default.
    #[error("no store provider was set and the registry has no default")]
    NoDefaultProvider,

    /// The expiry scheduler could not be created or accepted no work.
    #[error("expiry scheduler unavailable: {0}")]
    SchedulerUnavailable(#[from] SchedulerError),

    /// The backing store was mutated while a full scan was in progress.
    #[error("backing store was mutated during a full scan")]
    ConcurrentMutationDuringScan,
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A builder or registry setting that cannot be honoured.
///
/// Raised when `max_size` targets an unbounded store under
/// [`MisconfigurationPolicy::Reject`](crate::builder::MisconfigurationPolicy::Reject),
/// or when [`ProviderRegistry::set_default_by_name`](crate::registry::ProviderRegistry::set_default_by_name)
/// names a provider that was never registered.
///
/// ```
/// use cachebridge::error::ConfigError;
///
/// let err = ConfigError::new("max_size is not supported by store `hash_map`");
/// assert!(err.to_string().contains("max_size"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ConfigError(String);

impl ConfigError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    /// The offending setting, as rendered for the caller.
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
