//! Access layer for tuple-oriented operations.
//!
//! - **Value / DataType**: fixed-width field values and their encoding
//! - **TupleDesc**: ordered field types (and optional names) of a table
//! - **Tuple**: one row, with the RecordId it was stored under
//! - **HeapFile**: a table stored as a sequence of slotted pages
//! - **HeapFileIterator**: locked, cached sequential scan of a heap file

pub mod heap;
pub mod scan;
pub mod tuple;
pub mod tuple_desc;
pub mod value;

pub use heap::HeapFile;
pub use scan::{DbFileIterator, HeapFileIterator};
pub use tuple::{RecordId, Tuple};
pub use tuple_desc::{FieldInfo, TupleDesc};
pub use value::{DataType, Value, STRING_LEN};
