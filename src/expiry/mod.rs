//! Time-based expiry.
//!
//! - [`scheduler`]: delayed-task executors and cancellable timer handles.
//! - [`engine`]: [`ExpiringStore`](engine::ExpiringStore), which layers
//!   time-to-live and removal attribution over a size-bounded store.

pub mod engine;
pub mod scheduler;
