use super::replacer::Replacer;
use crate::storage::page::PageId;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Resident pages, least recently used at front
    lru_list: VecDeque<PageId>,
    /// Subset of `lru_list` that may be evicted
    evictable: HashSet<PageId>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lru_list: VecDeque::with_capacity(capacity),
            evictable: HashSet::with_capacity(capacity),
        }
    }

    fn position(&self, page_id: PageId) -> Option<usize> {
        self.lru_list.iter().position(|&p| p == page_id)
    }
}

impl Replacer for LruReplacer {
    fn evict(&mut self) -> Option<PageId> {
        let idx = self
            .lru_list
            .iter()
            .position(|p| self.evictable.contains(p))?;
        let page_id = self.lru_list.remove(idx)?;
        self.evictable.remove(&page_id);
        Some(page_id)
    }

    fn record_access(&mut self, page_id: PageId) {
        if let Some(idx) = self.position(page_id) {
            self.lru_list.remove(idx);
        }
        self.lru_list.push_back(page_id);
    }

    fn set_evictable(&mut self, page_id: PageId, evictable: bool) {
        if self.position(page_id).is_none() {
            return;
        }
        if evictable {
            self.evictable.insert(page_id);
        } else {
            self.evictable.remove(&page_id);
        }
    }

    fn remove(&mut self, page_id: PageId) {
        if let Some(idx) = self.position(page_id) {
            self.lru_list.remove(idx);
        }
        self.evictable.remove(&page_id);
    }

    fn size(&self) -> usize {
        self.evictable.len()
    }
}
