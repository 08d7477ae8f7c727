use crate::access::heap::HeapFile;
use crate::access::tuple_desc::TupleDesc;
use crate::config::DatabaseConfig;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::HeapPage;
use anyhow::{bail, Context, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub type TableId = u32;

pub const CATALOG_FILE_NAME: &str = "catalog.bin";

#[derive(Clone)]
pub struct TableInfo {
    pub table_id: TableId,
    pub table_name: String,
    pub file: Arc<HeapFile>,
}

/// On-disk form of one catalog entry. `path` is relative to the catalog
/// directory when the heap file lives inside it.
#[derive(Debug, Serialize, Deserialize)]
struct TableRecord {
    table_id: TableId,
    table_name: String,
    path: PathBuf,
    desc: TupleDesc,
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogImage {
    page_size: usize,
    tables: Vec<TableRecord>,
}

/// Registry of tables: id -> heap file and schema.
pub struct Catalog {
    page_size: usize,
    tables: DashMap<TableId, TableInfo>,
    names: DashMap<String, TableId>,
    next_table_id: AtomicU32,
}

impl Catalog {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            tables: DashMap::new(),
            names: DashMap::new(),
            next_table_id: AtomicU32::new(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Registers a table stored at `path`, creating the file if needed.
    pub fn add_table(&self, name: &str, path: &Path, desc: TupleDesc) -> Result<TableId> {
        let table_id = self.next_table_id.fetch_add(1, Ordering::SeqCst);
        self.register(table_id, name, path, desc)?;
        Ok(table_id)
    }

    fn register(&self, table_id: TableId, name: &str, path: &Path, desc: TupleDesc) -> Result<()> {
        if name.is_empty() {
            bail!("table name must not be empty");
        }
        if HeapPage::num_slots_for(self.page_size, desc.byte_size()) == 0 {
            bail!(
                "Table '{}': a {}-byte tuple does not fit in a {}-byte page",
                name,
                desc.byte_size(),
                self.page_size
            );
        }
        let slot = match self.names.entry(name.to_string()) {
            Entry::Occupied(_) => bail!("Table '{}' already exists", name),
            Entry::Vacant(slot) => slot,
        };

        let file = HeapFile::open(table_id, path, Arc::new(desc), self.page_size)
            .with_context(|| format!("opening heap file {:?}", path))?;

        slot.insert(table_id);
        self.tables.insert(
            table_id,
            TableInfo {
                table_id,
                table_name: name.to_string(),
                file: Arc::new(file),
            },
        );
        info!("Registered table '{}' as {} at {:?}", name, table_id, path);
        Ok(())
    }

    /// Heap file backing `table_id`.
    pub fn lookup(&self, table_id: TableId) -> StorageResult<Arc<HeapFile>> {
        self.tables
            .get(&table_id)
            .map(|info| info.file.clone())
            .ok_or(StorageError::TableNotFound(table_id))
    }

    pub fn tuple_desc(&self, table_id: TableId) -> StorageResult<Arc<TupleDesc>> {
        Ok(self.lookup(table_id)?.tuple_desc().clone())
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.names.get(name).map(|id| *id)
    }

    pub fn table_name(&self, table_id: TableId) -> Option<String> {
        self.tables.get(&table_id).map(|info| info.table_name.clone())
    }

    /// All tables, ordered by id.
    pub fn list_tables(&self) -> Vec<TableInfo> {
        let mut tables: Vec<TableInfo> = self.tables.iter().map(|e| e.value().clone()).collect();
        tables.sort_by_key(|info| info.table_id);
        tables
    }

    /// Writes the table list to `dir/catalog.bin`. Heap files are untouched.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let tables = self
            .list_tables()
            .into_iter()
            .map(|info| {
                let path = info.file.path();
                TableRecord {
                    table_id: info.table_id,
                    table_name: info.table_name,
                    path: path.strip_prefix(dir).unwrap_or(path).to_path_buf(),
                    desc: (**info.file.tuple_desc()).clone(),
                }
            })
            .collect();

        let image = CatalogImage {
            page_size: self.page_size,
            tables,
        };
        let bytes = bincode::serialize(&image).context("encoding catalog")?;
        let path = dir.join(CATALOG_FILE_NAME);
        fs::write(&path, bytes).with_context(|| format!("writing {:?}", path))?;
        Ok(())
    }

    /// Reads `dir/catalog.bin`, or returns an empty catalog if it is absent.
    pub fn load(dir: &Path, config: &DatabaseConfig) -> Result<Self> {
        let catalog = Self::new(config.page_size);
        let path = dir.join(CATALOG_FILE_NAME);
        if !path.exists() {
            return Ok(catalog);
        }

        let bytes = fs::read(&path).with_context(|| format!("reading {:?}", path))?;
        let image: CatalogImage = bincode::deserialize(&bytes)
            .with_context(|| format!("decoding {:?}", path))?;
        if image.page_size != config.page_size {
            bail!(
                "catalog was written with page size {}, configured page size is {}",
                image.page_size,
                config.page_size
            );
        }

        let mut max_id = 0;
        for record in image.tables {
            let table_path = dir.join(&record.path);
            catalog.register(record.table_id, &record.table_name, &table_path, record.desc)?;
            max_id = max_id.max(record.table_id);
        }
        catalog.next_table_id.store(max_id + 1, Ordering::SeqCst);

        info!("Loaded {} tables from {:?}", catalog.tables.len(), path);
        Ok(catalog)
    }
}
