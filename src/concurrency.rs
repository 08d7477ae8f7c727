//! Concurrency control module.
//!
//! Page-level shared/exclusive locking with wait-for-graph deadlock
//! detection. The buffer pool is the only caller in normal operation.

pub mod lock;

pub use lock::{LockError, LockManager, LockMode};
