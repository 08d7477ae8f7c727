//! Transaction management.
//!
//! Transactions are identified by a [`TransactionId`]; the manager tracks
//! their state and routes commit/abort to the buffer pool, which flushes or
//! restores the pages they dirtied and releases their locks.

pub mod id;
pub mod manager;
pub mod state;

pub use id::{TransactionId, TransactionIdGenerator};
pub use manager::{Transaction, TransactionError, TransactionManager};
pub use state::{TransactionInfo, TransactionState};
