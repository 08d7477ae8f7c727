//! Storage layer.
//!
//! - **PageManager**: positional page I/O over one flat file
//! - **HeapPage**: slotted page with an occupancy bitmap and fixed-width slots
//! - **BufferPool**: bounded page cache that routes every access through the
//!   lock manager and tracks dirty pages per transaction
//!
//! Durability comes from flushing a transaction's pages at commit; dirty pages
//! are never evicted, so no undo log is needed.

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;

pub use buffer::BufferPool;
pub use disk::PageManager;
pub use error::{StorageError, StorageResult};
pub use page::{HeapPage, PageId, PageRef, Permissions};
