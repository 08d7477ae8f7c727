//! Cursor-style iteration over the tuples of a heap file.

use crate::access::heap::HeapFile;
use crate::access::tuple::Tuple;
use crate::storage::buffer::BufferPool;
use crate::storage::error::StorageResult;
use crate::storage::page::{PageId, Permissions};
use crate::transaction::TransactionId;
use std::collections::VecDeque;
use std::sync::Arc;

/// Restartable cursor over the tuples of one file.
///
/// Exhaustion is `Ok(None)`, never an error. A closed (or never opened)
/// cursor yields nothing.
pub trait DbFileIterator {
    fn open(&mut self) -> StorageResult<()>;

    fn has_next(&mut self) -> StorageResult<bool>;

    fn next(&mut self) -> StorageResult<Option<Tuple>>;

    /// Restarts from the first tuple.
    fn rewind(&mut self) -> StorageResult<()>;

    fn close(&mut self);
}

/// Sequential scan of a heap file, acquiring each visited page read-only.
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    tid: TransactionId,
    pool: BufferPool,
    next_page: u32,
    buffered: VecDeque<Tuple>,
    is_open: bool,
}

impl HeapFileIterator {
    pub fn new(file: Arc<HeapFile>, tid: TransactionId, pool: BufferPool) -> Self {
        Self {
            file,
            tid,
            pool,
            next_page: 0,
            buffered: VecDeque::new(),
            is_open: false,
        }
    }

    /// Loads pages until at least one tuple is buffered or the file ends.
    fn fill(&mut self) -> StorageResult<bool> {
        while self.buffered.is_empty() {
            // Re-read each time so pages appended by this transaction are seen.
            if self.next_page >= self.file.num_pages()? {
                return Ok(false);
            }

            let page_id = PageId::new(self.file.id(), self.next_page);
            let page = self
                .pool
                .get_page(self.tid, page_id, Permissions::ReadOnly)?;
            self.next_page += 1;

            let tuples = page.read().iter().collect::<StorageResult<Vec<_>>>()?;
            self.buffered.extend(tuples);
        }
        Ok(true)
    }
}

impl DbFileIterator for HeapFileIterator {
    fn open(&mut self) -> StorageResult<()> {
        self.is_open = true;
        self.next_page = 0;
        self.buffered.clear();
        Ok(())
    }

    fn has_next(&mut self) -> StorageResult<bool> {
        if !self.is_open {
            return Ok(false);
        }
        self.fill()
    }

    fn next(&mut self) -> StorageResult<Option<Tuple>> {
        if !self.has_next()? {
            return Ok(None);
        }
        Ok(self.buffered.pop_front())
    }

    fn rewind(&mut self) -> StorageResult<()> {
        self.close();
        self.open()
    }

    fn close(&mut self) {
        self.is_open = false;
        self.buffered.clear();
    }
}
