use crate::access::scan::HeapFileIterator;
use crate::access::tuple::Tuple;
use crate::access::tuple_desc::TupleDesc;
use crate::catalog::TableId;
use crate::storage::buffer::BufferPool;
use crate::storage::disk::PageManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, PageId, PageRef, Permissions};
use crate::transaction::TransactionId;
use log::debug;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A table stored as a dense sequence of slotted pages in one flat file.
///
/// Page-level I/O goes straight to disk; tuple-level operations go through
/// the buffer pool so that they are locked and cached.
pub struct HeapFile {
    id: TableId,
    desc: Arc<TupleDesc>,
    path: PathBuf,
    page_size: usize,
    page_manager: Mutex<PageManager>,
}

impl HeapFile {
    /// Opens (or creates) the backing file at `path`.
    pub fn open(
        id: TableId,
        path: &Path,
        desc: Arc<TupleDesc>,
        page_size: usize,
    ) -> StorageResult<Self> {
        let page_manager = PageManager::open_or_create(path, page_size)?;
        Ok(Self {
            id,
            desc,
            path: path.to_path_buf(),
            page_size,
            page_manager: Mutex::new(page_manager),
        })
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_pages(&self) -> StorageResult<u32> {
        self.page_manager.lock().num_pages()
    }

    /// Reads page `page_id` from disk, bypassing the buffer pool.
    pub fn read_page(&self, page_id: PageId) -> StorageResult<HeapPage> {
        if page_id.table_id != self.id {
            return Err(StorageError::PageNotFound(page_id));
        }

        let data = self
            .page_manager
            .lock()
            .read_page(page_id.page_no)?
            .ok_or(StorageError::PageNotFound(page_id))?;

        HeapPage::from_bytes(page_id, self.desc.clone(), data, self.page_size)
    }

    /// Writes `page` to its position in the file.
    pub fn write_page(&self, page: &HeapPage) -> StorageResult<()> {
        let page_id = page.page_id();
        if page_id.table_id != self.id {
            return Err(StorageError::PageNotFound(page_id));
        }
        self.page_manager
            .lock()
            .write_page(page_id.page_no, page.page_data())
    }

    /// Appends an empty page to the file.
    pub fn allocate_page(&self) -> StorageResult<PageId> {
        let page_no = self.page_manager.lock().allocate_page()?;
        let page_id = PageId::new(self.id, page_no);
        debug!("Allocated page {} in {:?}", page_id, self.path);
        Ok(page_id)
    }

    /// Inserts `tuple` into the first page with a free slot, appending a
    /// page if every existing one is full. Returns the modified pages.
    ///
    /// An appended page can be filled by another transaction before this one
    /// locks it; the probe then resumes from the pages added since.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        tuple: &mut Tuple,
        pool: &BufferPool,
    ) -> StorageResult<Vec<PageRef>> {
        if **tuple.desc() != *self.desc {
            return Err(StorageError::SchemaMismatch(format!(
                "tuple ({}) does not match table {} ({})",
                tuple.desc(),
                self.id,
                self.desc
            )));
        }
        if HeapPage::num_slots_for(self.page_size, self.desc.byte_size()) == 0 {
            return Err(StorageError::SchemaMismatch(format!(
                "{}-byte tuples do not fit in a {}-byte page",
                self.desc.byte_size(),
                self.page_size
            )));
        }

        let mut first_page = 0;
        loop {
            let num_pages = self.num_pages()?;
            for page_no in first_page..num_pages {
                if let Some(page) = self.try_insert(tid, tuple, pool, page_no)? {
                    return Ok(vec![page]);
                }
            }
            first_page = num_pages;

            let page_id = self.allocate_page()?;
            let page = pool.get_page(tid, page_id, Permissions::ReadWrite)?;
            let inserted = page.write().insert_tuple(tuple);
            match inserted {
                Ok(_) => return Ok(vec![page]),
                Err(StorageError::PageFull { .. }) => {
                    debug!("{} lost appended page {} to another writer", tid, page_id);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Probes page `page_no` read-only and inserts if it has room. A full
    /// page is released again unless `tid` held it before the probe.
    fn try_insert(
        &self,
        tid: TransactionId,
        tuple: &mut Tuple,
        pool: &BufferPool,
        page_no: u32,
    ) -> StorageResult<Option<PageRef>> {
        let page_id = PageId::new(self.id, page_no);
        let held_before = pool.holds_lock(tid, page_id);

        let page = pool.get_page(tid, page_id, Permissions::ReadOnly)?;
        let has_room = page.read().num_empty_slots() > 0;
        if !has_room {
            if !held_before {
                pool.release_page(tid, page_id);
            }
            return Ok(None);
        }

        let page = pool.get_page(tid, page_id, Permissions::ReadWrite)?;
        let inserted = page.write().insert_tuple(tuple);
        match inserted {
            Ok(_) => Ok(Some(page)),
            Err(StorageError::PageFull { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Removes `tuple` from the page named by its record id.
    pub fn delete_tuple(
        &self,
        tid: TransactionId,
        tuple: &mut Tuple,
        pool: &BufferPool,
    ) -> StorageResult<PageRef> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| StorageError::TupleNotFound("tuple has no record id".to_string()))?;
        if record_id.page_id.table_id != self.id {
            return Err(StorageError::TupleNotFound(format!(
                "record {}:{} is not in table {}",
                record_id.page_id, record_id.slot, self.id
            )));
        }

        let page = pool.get_page(tid, record_id.page_id, Permissions::ReadWrite)?;
        page.write().delete_tuple(tuple)?;
        Ok(page)
    }

    /// Cursor over every tuple in page then slot order, read under `tid`.
    pub fn iterator(self: &Arc<Self>, tid: TransactionId, pool: &BufferPool) -> HeapFileIterator {
        HeapFileIterator::new(self.clone(), tid, pool.clone())
    }
}
