use crate::access::TupleDesc;
use crate::catalog::{Catalog, TableId};
use crate::concurrency::lock::LockManager;
use crate::config::DatabaseConfig;
use crate::executor::ExecutionContext;
use crate::storage::buffer::BufferPool;
use crate::transaction::{Transaction, TransactionId, TransactionManager};
use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// High-level database interface that owns every shared component.
///
/// Construct one per data directory and pass it by reference; there is no
/// process-wide instance.
pub struct Database {
    config: DatabaseConfig,
    data_dir: PathBuf,
    catalog: Arc<Catalog>,
    lock_manager: Arc<LockManager>,
    buffer_pool: BufferPool,
    transactions: TransactionManager,
}

impl Database {
    /// Opens the database in `data_dir`, creating the directory if needed.
    pub fn open(data_dir: &Path, config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(data_dir)
            .with_context(|| format!("creating data directory {:?}", data_dir))?;

        let catalog = Arc::new(Catalog::load(data_dir, &config)?);
        let lock_manager = Arc::new(LockManager::new());
        let buffer_pool = BufferPool::new(
            config.buffer_pool_pages,
            config.page_size,
            catalog.clone(),
            lock_manager.clone(),
        );
        let transactions = TransactionManager::new(buffer_pool.clone());

        info!(
            "Opened database at {:?} (page size {}, {} buffer pages)",
            data_dir, config.page_size, config.buffer_pool_pages
        );

        Ok(Self {
            config,
            data_dir: data_dir.to_path_buf(),
            catalog,
            lock_manager,
            buffer_pool,
            transactions,
        })
    }

    /// Registers a table stored in `<data_dir>/<name>.dat` and persists the
    /// catalog.
    pub fn create_table(&self, name: &str, desc: TupleDesc) -> Result<TableId> {
        let path = self.data_dir.join(format!("{}.dat", name));
        let table_id = self.catalog.add_table(name, &path, desc)?;
        self.catalog.save(&self.data_dir)?;
        Ok(table_id)
    }

    pub fn table_id(&self, name: &str) -> Result<TableId> {
        self.catalog
            .table_id(name)
            .with_context(|| format!("Table '{}' not found", name))
    }

    pub fn begin(&self) -> Transaction<'_> {
        Transaction::begin(&self.transactions)
    }

    /// Execution context for operators running under `tid`.
    pub fn context(&self, tid: TransactionId) -> ExecutionContext {
        ExecutionContext::new(self.buffer_pool.clone(), tid)
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    pub fn transaction_manager(&self) -> &TransactionManager {
        &self.transactions
    }
}
