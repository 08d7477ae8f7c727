use crate::storage::page::PageId;
use std::fmt::Debug;

/// Victim selection for the buffer pool.
///
/// Every resident page is tracked; only pages marked evictable (clean) may
/// be chosen as victims.
pub trait Replacer: Send + Debug {
    /// Select a page to evict and stop tracking it. Returns None if every
    /// tracked page is pinned.
    fn evict(&mut self) -> Option<PageId>;

    /// Record an access, making the page the most recently used.
    fn record_access(&mut self, page_id: PageId);

    /// Mark a tracked page as evictable or not.
    fn set_evictable(&mut self, page_id: PageId, evictable: bool);

    /// Stop tracking a page.
    fn remove(&mut self, page_id: PageId);

    /// Get the number of evictable pages.
    fn size(&self) -> usize;
}
