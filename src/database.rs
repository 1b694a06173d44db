use crate::access::schema::Schema;
use crate::catalog::{Catalog, TableId};
use crate::concurrency::LockManager;
use crate::config::StorageConfig;
use crate::storage::buffer::BufferPool;
use crate::transaction::{Transaction, TransactionIdGenerator};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name of the catalog manifest inside a data directory.
pub const CATALOG_FILE: &str = "catalog.bin";

/// Context object owning the catalog, lock manager and buffer pool that
/// transactions run against.
pub struct Database {
    config: StorageConfig,
    data_dir: Option<PathBuf>,
    buffer_pool: BufferPool,
    id_generator: TransactionIdGenerator,
}

impl Database {
    /// Create a database whose tables are registered by explicit path only
    pub fn new(config: StorageConfig) -> Self {
        Self::with_catalog(config, None, Catalog::new(config.page_size))
    }

    /// Open the database in `data_dir`, creating the directory if needed and
    /// loading its catalog manifest if one exists
    pub fn open(data_dir: &Path, config: StorageConfig) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let manifest = data_dir.join(CATALOG_FILE);
        let catalog = if manifest.exists() {
            Catalog::load(&manifest, config.page_size)?
        } else {
            Catalog::new(config.page_size)
        };

        Ok(Self::with_catalog(
            config,
            Some(data_dir.to_path_buf()),
            catalog,
        ))
    }

    fn with_catalog(config: StorageConfig, data_dir: Option<PathBuf>, catalog: Catalog) -> Self {
        let buffer_pool = BufferPool::new(
            Arc::new(catalog),
            Arc::new(LockManager::new()),
            config.max_pages,
        );

        Self {
            config,
            data_dir,
            buffer_pool,
            id_generator: TransactionIdGenerator::new(),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        self.buffer_pool.catalog()
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        self.buffer_pool.lock_manager()
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    /// Create a table stored as `<name>.dat` in the data directory
    pub fn create_table(&self, name: &str, schema: Schema) -> Result<TableId> {
        let Some(data_dir) = &self.data_dir else {
            bail!("database has no data directory; register '{}' with add_table", name);
        };
        let path = data_dir.join(format!("{}.dat", name));
        self.add_table(name, schema, &path)
    }

    /// Register the heap file at `path` as table `name`. A table already
    /// registered under `name` is replaced and its cached pages dropped;
    /// that is refused while a transaction has uncommitted changes to it.
    pub fn add_table(&self, name: &str, schema: Schema, path: &Path) -> Result<TableId> {
        let replaced = self.catalog().table_id(name);
        if let Some(old_id) = replaced {
            if self.buffer_pool.has_dirty_pages(old_id) {
                bail!("table '{}' has uncommitted changes and cannot be replaced", name);
            }
        }

        let table_id = self.catalog().add_table(name, schema, path)?;
        if let Some(old_id) = replaced {
            self.buffer_pool.discard_table(old_id);
        }
        if self.data_dir.is_some() {
            self.save_catalog()?;
        }
        Ok(table_id)
    }

    /// Look up a table id by name
    pub fn table_id(&self, name: &str) -> Result<TableId> {
        self.catalog()
            .table_id(name)
            .ok_or_else(|| anyhow::anyhow!("Table '{}' does not exist", name))
    }

    /// Start a new transaction
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::new(self.id_generator.next(), &self.buffer_pool)
    }

    /// Write the catalog manifest into the data directory
    pub fn save_catalog(&self) -> Result<()> {
        let Some(data_dir) = &self.data_dir else {
            bail!("database has no data directory");
        };
        self.catalog().save(&data_dir.join(CATALOG_FILE))
    }
}
