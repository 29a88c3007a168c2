//! Atomic compound operations.
//!
//! - [`strategy`]: the [`LockStrategy`](strategy::LockStrategy) seam and its
//!   two disciplines.
//! - [`atomic`]: [`AtomicCache`](atomic::AtomicCache), which derives the full
//!   [`Cache`](crate::traits::Cache) contract from primitives.

pub mod atomic;
pub mod strategy;
