use crate::access::heap::HeapFile;
use crate::access::schema::Schema;
use crate::storage::error::{StorageError, StorageResult};
use anyhow::{Context, Result};
use dashmap::DashMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub type TableId = u32;

pub const FIRST_TABLE_ID: TableId = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub table_id: TableId,
    pub table_name: String,
    pub path: PathBuf,
    pub schema: Schema,
}

/// On-disk form of one registration.
#[derive(Debug, Serialize, Deserialize)]
struct TableRecord {
    table_id: TableId,
    table_name: String,
    path: PathBuf,
    schema: Schema,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    page_size: usize,
    next_table_id: TableId,
    tables: Vec<TableRecord>,
}

struct TableEntry {
    name: String,
    file: Arc<HeapFile>,
}

/// Registry of tables: id, name, heap file and schema.
///
/// Ids are handed out once and never reused, so a page id stays meaningful
/// for as long as the table is registered.
pub struct Catalog {
    tables: DashMap<TableId, TableEntry>,
    names: DashMap<String, TableId>,
    next_table_id: AtomicU32,
    page_size: usize,
}

impl Catalog {
    pub fn new(page_size: usize) -> Self {
        Self {
            tables: DashMap::new(),
            names: DashMap::new(),
            next_table_id: AtomicU32::new(FIRST_TABLE_ID),
            page_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Registers the heap file at `path` (created empty if missing) under
    /// `name`. A table already registered under `name` is replaced.
    pub fn add_table(&self, name: &str, schema: Schema, path: &Path) -> Result<TableId> {
        let table_id = self.next_table_id.fetch_add(1, Ordering::SeqCst);
        self.register(table_id, name, schema, path)?;
        info!("registered table {} as {} ({})", name, table_id, path.display());
        Ok(table_id)
    }

    fn register(&self, table_id: TableId, name: &str, schema: Schema, path: &Path) -> Result<()> {
        let file = HeapFile::open(path, table_id, schema, self.page_size)
            .with_context(|| format!("failed to open heap file {}", path.display()))?;

        if let Some(old_id) = self.names.insert(name.to_string(), table_id) {
            self.tables.remove(&old_id);
            debug!("table {} replaced {}", table_id, old_id);
        }
        self.tables.insert(
            table_id,
            TableEntry {
                name: name.to_string(),
                file: Arc::new(file),
            },
        );
        Ok(())
    }

    pub fn heap_file(&self, table_id: TableId) -> StorageResult<Arc<HeapFile>> {
        self.tables
            .get(&table_id)
            .map(|entry| Arc::clone(&entry.file))
            .ok_or(StorageError::TableNotFound(table_id))
    }

    pub fn schema(&self, table_id: TableId) -> StorageResult<Schema> {
        Ok(self.heap_file(table_id)?.schema().clone())
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.names.get(name).map(|id| *id)
    }

    pub fn table_name(&self, table_id: TableId) -> Option<String> {
        self.tables.get(&table_id).map(|entry| entry.name.clone())
    }

    /// All registered tables, ordered by id.
    pub fn tables(&self) -> Vec<TableInfo> {
        let mut tables: Vec<TableInfo> = self
            .tables
            .iter()
            .map(|entry| TableInfo {
                table_id: *entry.key(),
                table_name: entry.name.clone(),
                path: entry.file.path().to_path_buf(),
                schema: entry.file.schema().clone(),
            })
            .collect();
        tables.sort_by_key(|info| info.table_id);
        tables
    }

    /// Writes every registration to `manifest_path`.
    pub fn save(&self, manifest_path: &Path) -> Result<()> {
        let manifest = Manifest {
            page_size: self.page_size,
            next_table_id: self.next_table_id.load(Ordering::SeqCst),
            tables: self
                .tables()
                .into_iter()
                .map(|info| TableRecord {
                    table_id: info.table_id,
                    table_name: info.table_name,
                    path: info.path,
                    schema: info.schema,
                })
                .collect(),
        };

        let file = File::create(manifest_path)
            .with_context(|| format!("failed to create {}", manifest_path.display()))?;
        bincode::serialize_into(BufWriter::new(file), &manifest)
            .context("failed to write catalog manifest")?;
        debug!("saved {} tables to {}", manifest.tables.len(), manifest_path.display());
        Ok(())
    }

    /// Rebuilds a catalog from a manifest written by [`Catalog::save`].
    pub fn load(manifest_path: &Path, page_size: usize) -> Result<Self> {
        let file = File::open(manifest_path)
            .with_context(|| format!("failed to open {}", manifest_path.display()))?;
        let manifest: Manifest = bincode::deserialize_from(BufReader::new(file))
            .context("failed to read catalog manifest")?;

        if manifest.page_size != page_size {
            anyhow::bail!(
                "catalog was written with {}-byte pages, not {}",
                manifest.page_size,
                page_size
            );
        }

        let catalog = Self::new(page_size);
        for record in manifest.tables {
            catalog.register(record.table_id, &record.table_name, record.schema, &record.path)?;
        }
        catalog
            .next_table_id
            .store(manifest.next_table_id, Ordering::SeqCst);

        info!("loaded {} tables from {}", catalog.tables.len(), manifest_path.display());
        Ok(catalog)
    }
}
