//! Database-wide settings, fixed for the lifetime of a `Database`.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_BUFFER_POOL_PAGES: usize = 50;

pub const PAGE_SIZE_ENV: &str = "HEAPDB_PAGE_SIZE";
pub const POOL_PAGES_ENV: &str = "HEAPDB_POOL_PAGES";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Size of every page, in memory and on disk.
    pub page_size: usize,
    /// Maximum number of pages resident in the buffer pool.
    pub buffer_pool_pages: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pool_pages: DEFAULT_BUFFER_POOL_PAGES,
        }
    }
}

impl DatabaseConfig {
    /// Defaults overridden by `HEAPDB_PAGE_SIZE` / `HEAPDB_POOL_PAGES` when set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(page_size) = read_env(PAGE_SIZE_ENV)? {
            config.page_size = page_size;
        }
        if let Some(pages) = read_env(POOL_PAGES_ENV)? {
            config.buffer_pool_pages = pages;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // A page must at least hold one header byte and one bit-wide slot.
        if self.page_size < 2 {
            bail!("page size {} is too small", self.page_size);
        }
        if self.buffer_pool_pages == 0 {
            bail!("buffer pool must hold at least one page");
        }
        Ok(())
    }
}

fn read_env(name: &str) -> Result<Option<usize>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} must be a positive integer, got {:?}", name, raw)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", name)),
    }
}
