//! Storage layer error types.

use crate::concurrency::lock::LockError;
use crate::storage::page::PageId;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Tuple not found: {0}")]
    TupleNotFound(String),

    #[error("Invalid slot ID: {slot_id} (max: {max_slot})")]
    InvalidSlotId { slot_id: usize, max_slot: usize },

    #[error("Page {page_id} is full: all {num_slots} slots are occupied")]
    PageFull { page_id: PageId, num_slots: usize },

    #[error("Buffer pool is full: all {capacity} resident pages are dirty")]
    BufferPoolFull { capacity: usize },

    #[error("Page not found: {0}")]
    PageNotFound(PageId),

    #[error("Invalid page image: expected {expected} bytes, got {actual}")]
    InvalidPageImage { expected: usize, actual: usize },

    #[error("Table not found: {0}")]
    TableNotFound(u32),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// True when the transaction that received this error must be rolled back.
    pub fn is_abort(&self) -> bool {
        matches!(self, StorageError::Lock(LockError::Deadlock { .. }))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
