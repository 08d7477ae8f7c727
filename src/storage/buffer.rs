//! Bounded page cache shared by all transactions.
//!
//! Every page access goes through the lock manager first. Pages written by a
//! transaction stay resident until it completes: commit flushes them, abort
//! restores the on-disk image. Only clean pages are eviction candidates.

pub mod lru;
pub mod replacer;

use crate::access::tuple::Tuple;
use crate::catalog::{Catalog, TableId};
use crate::concurrency::lock::{LockManager, LockMode};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{PageId, PageRef, Permissions};
use crate::transaction::TransactionId;
use log::{debug, info, warn};
use lru::LruReplacer;
use parking_lot::{Mutex, RwLock};
use replacer::Replacer;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

struct Frame {
    page: PageRef,
    dirtied_by: Option<TransactionId>,
}

struct PoolState {
    frames: HashMap<PageId, Frame>,
    dirty_pages: HashMap<TransactionId, HashSet<PageId>>,
    replacer: Box<dyn Replacer>,
}

impl PoolState {
    fn mark_dirty(&mut self, page_id: PageId, tid: TransactionId) {
        let Some(frame) = self.frames.get_mut(&page_id) else {
            return;
        };

        if let Some(previous) = frame.dirtied_by.replace(tid) {
            if previous != tid {
                if let Some(pages) = self.dirty_pages.get_mut(&previous) {
                    pages.remove(&page_id);
                }
            }
        }
        self.dirty_pages.entry(tid).or_default().insert(page_id);
        self.replacer.set_evictable(page_id, false);
    }

    fn mark_clean(&mut self, page_id: PageId) {
        if let Some(frame) = self.frames.get_mut(&page_id) {
            if let Some(tid) = frame.dirtied_by.take() {
                if let Some(pages) = self.dirty_pages.get_mut(&tid) {
                    pages.remove(&page_id);
                    if pages.is_empty() {
                        self.dirty_pages.remove(&tid);
                    }
                }
            }
            self.replacer.set_evictable(page_id, true);
        }
    }

    fn insert_frame(&mut self, page_id: PageId, page: PageRef) {
        self.frames.insert(
            page_id,
            Frame {
                page,
                dirtied_by: None,
            },
        );
        self.replacer.record_access(page_id);
        self.replacer.set_evictable(page_id, true);
    }

    fn remove_frame(&mut self, page_id: PageId) -> Option<Frame> {
        let frame = self.frames.remove(&page_id)?;
        if let Some(tid) = frame.dirtied_by {
            if let Some(pages) = self.dirty_pages.get_mut(&tid) {
                pages.remove(&page_id);
            }
        }
        self.replacer.remove(page_id);
        Some(frame)
    }
}

struct BufferPoolInner {
    capacity: usize,
    page_size: usize,
    catalog: Arc<Catalog>,
    lock_manager: Arc<LockManager>,
    state: Mutex<PoolState>,
}

/// Cheaply cloneable handle to the shared page cache.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<BufferPoolInner>,
}

impl BufferPool {
    pub fn new(
        capacity: usize,
        page_size: usize,
        catalog: Arc<Catalog>,
        lock_manager: Arc<LockManager>,
    ) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                capacity,
                page_size,
                catalog,
                lock_manager,
                state: Mutex::new(PoolState {
                    frames: HashMap::with_capacity(capacity),
                    dirty_pages: HashMap::new(),
                    replacer: Box::new(LruReplacer::new(capacity)),
                }),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.inner.catalog
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.inner.lock_manager
    }

    /// Returns the page `page_id` on behalf of `tid`.
    ///
    /// Blocks until the lock matching `perm` is granted, and fails with a
    /// deadlock error if waiting would deadlock. A read-write fetch marks the
    /// page dirty by `tid`.
    pub fn get_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        perm: Permissions,
    ) -> StorageResult<PageRef> {
        let mode = match perm {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        };
        // Never hold the pool mutex while blocked on a page lock.
        self.inner.lock_manager.acquire(tid, page_id, mode)?;

        let mut state = self.inner.state.lock();
        let page = match state.frames.get(&page_id) {
            Some(frame) => frame.page.clone(),
            None => self.load_page(&mut state, page_id)?,
        };
        state.replacer.record_access(page_id);

        if perm == Permissions::ReadWrite {
            state.mark_dirty(page_id, tid);
        }

        Ok(page)
    }

    fn load_page(&self, state: &mut PoolState, page_id: PageId) -> StorageResult<PageRef> {
        let file = self.inner.catalog.lookup(page_id.table_id)?;
        let mut page = file.read_page(page_id)?;
        page.set_before_image();

        if state.frames.len() >= self.inner.capacity {
            self.evict_page(state)?;
        }

        let page = Arc::new(RwLock::new(page));
        state.insert_frame(page_id, page.clone());
        Ok(page)
    }

    fn evict_page(&self, state: &mut PoolState) -> StorageResult<()> {
        let victim = state.replacer.evict().ok_or(StorageError::BufferPoolFull {
            capacity: self.inner.capacity,
        })?;
        state.frames.remove(&victim);
        debug!("Evicted page {}", victim);
        Ok(())
    }

    /// Releases the lock `tid` holds on `page_id` before the transaction ends.
    ///
    /// This breaks two-phase locking and is only safe for pages that were
    /// read without being used.
    pub fn release_page(&self, tid: TransactionId, page_id: PageId) {
        self.inner.lock_manager.release(tid, page_id);
    }

    /// True if `tid` holds any lock on `page_id`.
    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.inner
            .lock_manager
            .holds_lock(tid, page_id, LockMode::Shared)
    }

    /// Inserts `tuple` into table `table_id`, stamping its record id.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> StorageResult<()> {
        let file = self.inner.catalog.lookup(table_id)?;
        let pages = file.insert_tuple(tid, tuple, self)?;
        self.mark_pages_dirty(tid, pages)
    }

    /// Deletes `tuple` from the table named by its record id.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &mut Tuple) -> StorageResult<()> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| StorageError::TupleNotFound("tuple has no record id".to_string()))?;
        let file = self.inner.catalog.lookup(record_id.page_id.table_id)?;
        let page = file.delete_tuple(tid, tuple, self)?;
        self.mark_pages_dirty(tid, vec![page])
    }

    fn mark_pages_dirty(&self, tid: TransactionId, pages: Vec<PageRef>) -> StorageResult<()> {
        let mut state = self.inner.state.lock();
        for page in pages {
            let page_id = page.read().page_id();
            if !state.frames.contains_key(&page_id) {
                if state.frames.len() >= self.inner.capacity {
                    self.evict_page(&mut state)?;
                }
                state.insert_frame(page_id, page);
            }
            state.mark_dirty(page_id, tid);
        }
        Ok(())
    }

    /// Ends `tid`: commit flushes its dirty pages, abort restores their
    /// on-disk images. All of its locks are released afterwards.
    ///
    /// If a commit flush fails the remaining pages stay attributed to `tid`,
    /// its locks are kept and the error is returned; the caller must abort.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> StorageResult<()> {
        if commit {
            self.flush_pages(tid)?;
            debug!("{} committed", tid);
        } else {
            self.restore_pages(tid);
            debug!("{} rolled back", tid);
        }

        self.inner.lock_manager.release_all(tid);
        Ok(())
    }

    fn restore_pages(&self, tid: TransactionId) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let Some(mut pages) = state.dirty_pages.remove(&tid).map(|set| {
            let mut pages: Vec<PageId> = set.into_iter().collect();
            pages.sort();
            pages
        }) else {
            return;
        };

        for page_id in pages.drain(..) {
            let Some(frame) = state.frames.get_mut(&page_id) else {
                continue;
            };
            if frame.dirtied_by != Some(tid) {
                continue;
            }

            let reloaded = self
                .inner
                .catalog
                .lookup(page_id.table_id)
                .and_then(|file| file.read_page(page_id));

            match reloaded {
                Ok(mut fresh) => {
                    fresh.set_before_image();
                    *frame.page.write() = fresh;
                    frame.dirtied_by = None;
                    state.replacer.set_evictable(page_id, true);
                }
                Err(e) => {
                    warn!("Discarding page {} after failed reload: {}", page_id, e);
                    state.remove_frame(page_id);
                }
            }
        }
    }

    /// Writes every page dirtied by `tid` to disk and marks it clean.
    pub fn flush_pages(&self, tid: TransactionId) -> StorageResult<()> {
        let pages = {
            let state = self.inner.state.lock();
            let mut pages: Vec<PageId> = state
                .dirty_pages
                .get(&tid)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default();
            pages.sort();
            pages
        };

        for page_id in pages {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Writes `page_id` to disk if it is resident and dirty.
    pub fn flush_page(&self, page_id: PageId) -> StorageResult<()> {
        let mut state = self.inner.state.lock();
        let Some(frame) = state.frames.get(&page_id) else {
            return Ok(());
        };
        if frame.dirtied_by.is_none() {
            return Ok(());
        }

        let file = self.inner.catalog.lookup(page_id.table_id)?;
        {
            let mut page = frame.page.write();
            file.write_page(&page)?;
            page.set_before_image();
        }
        state.mark_clean(page_id);
        debug!("Flushed page {}", page_id);
        Ok(())
    }

    /// Writes every dirty page to disk, regardless of owner.
    pub fn flush_all_pages(&self) -> StorageResult<()> {
        let dirty: Vec<PageId> = {
            let state = self.inner.state.lock();
            let mut pages: Vec<PageId> = state
                .frames
                .iter()
                .filter(|(_, frame)| frame.dirtied_by.is_some())
                .map(|(page_id, _)| *page_id)
                .collect();
            pages.sort();
            pages
        };

        let count = dirty.len();
        for page_id in dirty {
            self.flush_page(page_id)?;
        }
        if count > 0 {
            info!("Flushed {} dirty pages", count);
        }
        Ok(())
    }

    /// Drops `page_id` from the cache without writing it.
    pub fn discard_page(&self, page_id: PageId) {
        let mut state = self.inner.state.lock();
        if state.remove_frame(page_id).is_some() {
            debug!("Discarded page {}", page_id);
        }
    }

    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.inner.state.lock().frames.contains_key(&page_id)
    }

    pub fn is_dirty(&self, page_id: PageId) -> bool {
        self.inner
            .state
            .lock()
            .frames
            .get(&page_id)
            .is_some_and(|frame| frame.dirtied_by.is_some())
    }

    /// Resident page ids in ascending order.
    pub fn resident_pages(&self) -> Vec<PageId> {
        let state = self.inner.state.lock();
        let mut pages: Vec<PageId> = state.frames.keys().copied().collect();
        pages.sort();
        pages
    }

    /// Pages currently attributed to `tid` as dirty.
    pub fn dirty_pages(&self, tid: TransactionId) -> Vec<PageId> {
        let state = self.inner.state.lock();
        let mut pages: Vec<PageId> = state
            .dirty_pages
            .get(&tid)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::tuple_desc::TupleDesc;
    use crate::access::value::{DataType, Value};
    use crate::concurrency::lock::LockError;
    use anyhow::Result;
    use tempfile::{tempdir, TempDir};

    const PAGE_SIZE: usize = 4096;

    struct Fixture {
        _dir: TempDir,
        pool: BufferPool,
        table_id: TableId,
        desc: Arc<TupleDesc>,
    }

    fn create_test_pool(capacity: usize) -> Result<Fixture> {
        let dir = tempdir()?;
        let catalog = Arc::new(Catalog::new(PAGE_SIZE));
        let desc = Arc::new(TupleDesc::new(vec![DataType::Int32, DataType::Int32]));
        let table_id = catalog.add_table("t", &dir.path().join("t.dat"), (*desc).clone())?;
        let pool = BufferPool::new(capacity, PAGE_SIZE, catalog, Arc::new(LockManager::new()));
        Ok(Fixture {
            _dir: dir,
            pool,
            table_id,
            desc,
        })
    }

    fn row(desc: &Arc<TupleDesc>, a: i32, b: i32) -> Result<Tuple> {
        Ok(Tuple::from_values(
            desc.clone(),
            vec![Value::Int32(a), Value::Int32(b)],
        )?)
    }

    fn allocate(fx: &Fixture, pages: u32) -> Result<()> {
        let file = fx.pool.catalog().lookup(fx.table_id)?;
        for _ in 0..pages {
            file.allocate_page()?;
        }
        Ok(())
    }

    #[test]
    fn test_get_page_caches() -> Result<()> {
        let fx = create_test_pool(4)?;
        allocate(&fx, 1)?;
        let tid = TransactionId::new(1);
        let pid = PageId::new(fx.table_id, 0);

        let first = fx.pool.get_page(tid, pid, Permissions::ReadOnly)?;
        let second = fx.pool.get_page(tid, pid, Permissions::ReadOnly)?;

        assert!(Arc::ptr_eq(&first, &second));
        assert!(fx.pool.is_resident(pid));
        assert!(!fx.pool.is_dirty(pid));
        assert!(fx.pool.holds_lock(tid, pid));
        Ok(())
    }

    #[test]
    fn test_missing_page() -> Result<()> {
        let fx = create_test_pool(4)?;
        let tid = TransactionId::new(1);

        let result = fx
            .pool
            .get_page(tid, PageId::new(fx.table_id, 3), Permissions::ReadOnly);
        assert!(matches!(result, Err(StorageError::PageNotFound(_))));
        Ok(())
    }

    #[test]
    fn test_write_marks_dirty() -> Result<()> {
        let fx = create_test_pool(4)?;
        allocate(&fx, 1)?;
        let tid = TransactionId::new(1);
        let pid = PageId::new(fx.table_id, 0);

        fx.pool.get_page(tid, pid, Permissions::ReadWrite)?;
        assert!(fx.pool.is_dirty(pid));
        assert_eq!(fx.pool.dirty_pages(tid), vec![pid]);
        Ok(())
    }

    #[test]
    fn test_eviction_lru_among_clean() -> Result<()> {
        let fx = create_test_pool(2)?;
        allocate(&fx, 3)?;
        let tid = TransactionId::new(1);
        let p0 = PageId::new(fx.table_id, 0);
        let p1 = PageId::new(fx.table_id, 1);
        let p2 = PageId::new(fx.table_id, 2);

        fx.pool.get_page(tid, p0, Permissions::ReadOnly)?;
        fx.pool.get_page(tid, p1, Permissions::ReadOnly)?;
        fx.pool.get_page(tid, p0, Permissions::ReadOnly)?;
        fx.pool.get_page(tid, p2, Permissions::ReadOnly)?;

        assert_eq!(fx.pool.resident_pages(), vec![p0, p2]);
        Ok(())
    }

    #[test]
    fn test_dirty_pages_never_evicted() -> Result<()> {
        let fx = create_test_pool(2)?;
        allocate(&fx, 3)?;
        let tid = TransactionId::new(1);
        let p0 = PageId::new(fx.table_id, 0);
        let p1 = PageId::new(fx.table_id, 1);
        let p2 = PageId::new(fx.table_id, 2);

        fx.pool.get_page(tid, p0, Permissions::ReadWrite)?;
        fx.pool.get_page(tid, p1, Permissions::ReadOnly)?;
        fx.pool.get_page(tid, p2, Permissions::ReadOnly)?;
        assert_eq!(fx.pool.resident_pages(), vec![p0, p2]);

        fx.pool.get_page(tid, p2, Permissions::ReadWrite)?;
        let result = fx.pool.get_page(tid, p1, Permissions::ReadOnly);
        assert!(matches!(
            result,
            Err(StorageError::BufferPoolFull { capacity: 2 })
        ));
        Ok(())
    }

    #[test]
    fn test_commit_flushes_and_releases() -> Result<()> {
        let fx = create_test_pool(4)?;
        let tid = TransactionId::new(1);

        let mut tuple = row(&fx.desc, 1, 2)?;
        fx.pool.insert_tuple(tid, fx.table_id, &mut tuple)?;
        let pid = tuple.record_id().map(|rid| rid.page_id);
        let pid = pid.ok_or_else(|| anyhow::anyhow!("no record id"))?;
        assert!(fx.pool.is_dirty(pid));

        fx.pool.transaction_complete(tid, true)?;
        assert!(!fx.pool.is_dirty(pid));
        assert!(!fx.pool.holds_lock(tid, pid));

        let on_disk = fx.pool.catalog().lookup(fx.table_id)?.read_page(pid)?;
        assert_eq!(on_disk.num_empty_slots(), on_disk.num_slots() - 1);
        Ok(())
    }

    #[test]
    fn test_abort_restores_disk_image() -> Result<()> {
        let fx = create_test_pool(4)?;
        let writer = TransactionId::new(1);
        let mut committed = row(&fx.desc, 1, 1)?;
        fx.pool.insert_tuple(writer, fx.table_id, &mut committed)?;
        fx.pool.transaction_complete(writer, true)?;

        let aborter = TransactionId::new(2);
        let mut doomed = row(&fx.desc, 2, 2)?;
        fx.pool.insert_tuple(aborter, fx.table_id, &mut doomed)?;
        let pid = PageId::new(fx.table_id, 0);
        let page = fx.pool.get_page(aborter, pid, Permissions::ReadOnly)?;
        assert_eq!(page.read().iter().count(), 2);

        fx.pool.transaction_complete(aborter, false)?;
        assert!(!fx.pool.is_dirty(pid));
        assert!(!fx.pool.holds_lock(aborter, pid));
        let restored = page.read();
        assert_eq!(restored.iter().count(), 1);
        assert!(*restored == restored.before_image());
        Ok(())
    }

    #[test]
    fn test_deadlock_surfaces_as_abort() -> Result<()> {
        let fx = create_test_pool(4)?;
        allocate(&fx, 1)?;
        let pid = PageId::new(fx.table_id, 0);
        let t1 = TransactionId::new(1);
        let t2 = TransactionId::new(2);

        fx.pool.get_page(t1, pid, Permissions::ReadOnly)?;
        fx.pool.get_page(t2, pid, Permissions::ReadOnly)?;

        let handle = {
            let pool = fx.pool.clone();
            std::thread::spawn(move || pool.get_page(t1, pid, Permissions::ReadWrite).map(|_| ()))
        };
        std::thread::sleep(std::time::Duration::from_millis(50));

        let err = match fx.pool.get_page(t2, pid, Permissions::ReadWrite) {
            Err(e) => e,
            Ok(_) => anyhow::bail!("expected deadlock"),
        };
        assert!(err.is_abort());
        assert!(matches!(err, StorageError::Lock(LockError::Deadlock { .. })));

        fx.pool.transaction_complete(t2, false)?;
        assert!(handle.join().map_err(|_| anyhow::anyhow!("panicked"))?.is_ok());
        fx.pool.transaction_complete(t1, true)?;
        Ok(())
    }

    #[test]
    fn test_discard_page() -> Result<()> {
        let fx = create_test_pool(4)?;
        allocate(&fx, 1)?;
        let tid = TransactionId::new(1);
        let pid = PageId::new(fx.table_id, 0);

        fx.pool.get_page(tid, pid, Permissions::ReadWrite)?;
        fx.pool.discard_page(pid);

        assert!(!fx.pool.is_resident(pid));
        assert!(fx.pool.dirty_pages(tid).is_empty());
        Ok(())
    }

    #[test]
    fn test_flush_all_pages() -> Result<()> {
        let fx = create_test_pool(4)?;
        let tid = TransactionId::new(1);
        let mut tuple = row(&fx.desc, 7, 8)?;
        fx.pool.insert_tuple(tid, fx.table_id, &mut tuple)?;

        fx.pool.flush_all_pages()?;
        let pid = PageId::new(fx.table_id, 0);
        assert!(!fx.pool.is_dirty(pid));

        let on_disk = fx.pool.catalog().lookup(fx.table_id)?.read_page(pid)?;
        assert_eq!(on_disk.tuple_at(0)?, Some(tuple));
        Ok(())
    }
}
