pub mod heap_page;

use crate::catalog::TableId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one page of one heap file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId {
    pub table_id: TableId,
    pub page_no: u32,
}

impl PageId {
    pub fn new(table_id: TableId, page_no: u32) -> Self {
        Self { table_id, page_no }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table_id, self.page_no)
    }
}

/// Access level requested for a page; maps onto a lock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

pub use heap_page::{HeapPage, HeapPageIter, PageRef};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id_equality() {
        assert_eq!(PageId::new(1, 2), PageId::new(1, 2));
        assert_ne!(PageId::new(1, 2), PageId::new(2, 2));
        assert_ne!(PageId::new(1, 2), PageId::new(1, 3));
    }

    #[test]
    fn test_page_id_display() {
        assert_eq!(PageId::new(7, 42).to_string(), "7:42");
    }
}
