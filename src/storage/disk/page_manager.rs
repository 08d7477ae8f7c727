use crate::storage::error::{StorageError, StorageResult};
use log::trace;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Positional page I/O over one flat file. Page `n` occupies bytes
/// `[n * page_size, (n + 1) * page_size)`; there is no file header.
pub struct PageManager {
    file: File,
    path: PathBuf,
    page_size: usize,
}

impl PageManager {
    /// Opens `path`, creating an empty file if it does not exist.
    pub fn open_or_create(path: &Path, page_size: usize) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            page_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Reads page `page_no` into a fresh `page_size` buffer. A trailing
    /// partial page reads as zero-padded.
    pub fn read_page(&mut self, page_no: u32) -> StorageResult<Option<Vec<u8>>> {
        let offset = self.page_offset(page_no);
        let file_size = self.file.metadata()?.len();

        if offset >= file_size {
            return Ok(None);
        }

        let available = (file_size - offset).min(self.page_size as u64) as usize;
        let mut buf = vec![0u8; self.page_size];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf[..available])?;
        trace!("read page {} of {:?}", page_no, self.path);

        Ok(Some(buf))
    }

    pub fn write_page(&mut self, page_no: u32, data: &[u8]) -> StorageResult<()> {
        if data.len() != self.page_size {
            return Err(StorageError::InvalidPageImage {
                expected: self.page_size,
                actual: data.len(),
            });
        }

        let offset = self.page_offset(page_no);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.sync_data()?;
        trace!("wrote page {} of {:?}", page_no, self.path);

        Ok(())
    }

    /// ceil(file length / page size).
    pub fn num_pages(&self) -> StorageResult<u32> {
        let file_size = self.file.metadata()?.len();
        Ok(file_size.div_ceil(self.page_size as u64) as u32)
    }

    /// Appends one all-zero page and returns its number.
    pub fn allocate_page(&mut self) -> StorageResult<u32> {
        let page_no = self.num_pages()?;
        let empty = vec![0u8; self.page_size];
        self.write_page(page_no, &empty)?;
        Ok(page_no)
    }

    fn page_offset(&self, page_no: u32) -> u64 {
        page_no as u64 * self.page_size as u64
    }
}
