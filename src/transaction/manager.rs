//! Transaction handle tying page access to one transaction id.

use log::warn;

use super::id::TransactionId;
use super::state::TransactionState;
use crate::access::scan::HeapScan;
use crate::access::tuple::{RecordId, Tuple};
use crate::access::value::Value;
use crate::catalog::TableId;
use crate::storage::buffer::BufferPool;
use crate::storage::error::StorageResult;
use crate::storage::page::{Page, PageId, Permission};

/// A running transaction that aborts on drop if still active.
///
/// Locks are taken as pages are touched and held until `commit` or `abort`.
/// When a call fails with [`StorageError::TransactionAborted`] the
/// transaction can make no further progress and should be aborted; dropping
/// the handle does that.
///
/// [`StorageError::TransactionAborted`]: crate::storage::StorageError::TransactionAborted
pub struct Transaction<'a> {
    id: TransactionId,
    buffer_pool: &'a BufferPool,
    state: TransactionState,
}

impl<'a> Transaction<'a> {
    pub fn new(id: TransactionId, buffer_pool: &'a BufferPool) -> Self {
        Self {
            id,
            buffer_pool,
            state: TransactionState::Active,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn fetch_page(&self, page_id: PageId, perm: Permission) -> StorageResult<Page> {
        self.buffer_pool.fetch_page(self.id, page_id, perm)
    }

    /// Inserts a row built from `values` into `table_id`.
    pub fn insert(&self, table_id: TableId, values: Vec<Value>) -> StorageResult<RecordId> {
        self.insert_tuple(table_id, &mut Tuple::new(values))
    }

    pub fn insert_tuple(&self, table_id: TableId, tuple: &mut Tuple) -> StorageResult<RecordId> {
        self.buffer_pool.insert_tuple(self.id, table_id, tuple)
    }

    /// Deletes a tuple previously returned by a scan.
    pub fn delete(&self, tuple: &mut Tuple) -> StorageResult<()> {
        self.buffer_pool.delete_tuple(self.id, tuple)
    }

    pub fn scan(&self, table_id: TableId) -> StorageResult<HeapScan<'a>> {
        let file = self.buffer_pool.catalog().heap_file(table_id)?;
        Ok(file.scan(self.buffer_pool, self.id))
    }

    /// Forces this transaction's pages to disk and releases its locks.
    pub fn commit(mut self) -> StorageResult<()> {
        self.complete(true)
    }

    /// Restores this transaction's pages from disk and releases its locks.
    pub fn abort(mut self) -> StorageResult<()> {
        self.complete(false)
    }

    fn complete(&mut self, commit: bool) -> StorageResult<()> {
        // Locks are gone even if completion fails, so never retry it
        self.state = if commit {
            TransactionState::Committed
        } else {
            TransactionState::Aborted
        };
        self.buffer_pool.transaction_complete(self.id, commit)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state.is_active() {
            if let Err(e) = self.complete(false) {
                warn!("failed to abort {} on drop: {}", self.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::access::schema::{Column, Schema};
    use crate::access::value::{DataType, Value};
    use crate::config::StorageConfig;
    use crate::database::Database;
    use crate::storage::page::PageId;
    use crate::storage::StorageError;
    use anyhow::Result;
    use tempfile::{tempdir, TempDir};

    fn setup() -> Result<(TempDir, Database, u32)> {
        let dir = tempdir()?;
        let db = Database::open(dir.path(), StorageConfig::new(256, 8))?;
        let table_id = db.create_table(
            "items",
            Schema::new(vec![Column::new("id", DataType::Int32)]),
        )?;
        Ok((dir, db, table_id))
    }

    fn count(db: &Database, table_id: u32) -> Result<usize> {
        let txn = db.begin();
        let rows = txn.scan(table_id)?.collect::<Result<Vec<_>, _>>()?;
        txn.commit()?;
        Ok(rows.len())
    }

    #[test]
    fn test_commit() -> Result<()> {
        let (_dir, db, table_id) = setup()?;

        let txn = db.begin();
        let id = txn.id();
        let record_id = txn.insert(table_id, vec![Value::Int32(1)])?;
        assert_eq!(record_id.page_id, PageId::new(table_id, 0));
        txn.commit()?;

        assert!(db.buffer_pool().dirty_pages(id).is_empty());
        assert!(!db.buffer_pool().holds_lock(id, record_id.page_id));
        assert_eq!(count(&db, table_id)?, 1);

        Ok(())
    }

    #[test]
    fn test_explicit_abort() -> Result<()> {
        let (_dir, db, table_id) = setup()?;

        let txn = db.begin();
        let id = txn.id();
        txn.insert(table_id, vec![Value::Int32(1)])?;
        txn.abort()?;

        assert!(db.lock_manager().locked_pages(id).is_empty());
        assert_eq!(count(&db, table_id)?, 0);

        Ok(())
    }

    #[test]
    fn test_auto_abort_on_drop() -> Result<()> {
        let (_dir, db, table_id) = setup()?;

        let id = {
            let txn = db.begin();
            txn.insert(table_id, vec![Value::Int32(1)])?;
            assert!(txn.state().is_active());
            txn.id()
        };

        assert!(db.lock_manager().locked_pages(id).is_empty());
        assert!(db.buffer_pool().dirty_pages(id).is_empty());
        assert_eq!(count(&db, table_id)?, 0);

        Ok(())
    }

    #[test]
    fn test_delete_scanned_tuple() -> Result<()> {
        let (_dir, db, table_id) = setup()?;

        let txn = db.begin();
        for v in 0..3 {
            txn.insert(table_id, vec![Value::Int32(v)])?;
        }
        let mut victim = txn
            .scan(table_id)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .find(|t| t.values() == [Value::Int32(1)])
            .ok_or_else(|| anyhow::anyhow!("row 1 missing"))?;
        txn.delete(&mut victim)?;
        assert!(victim.record_id().is_none());
        txn.commit()?;

        assert_eq!(count(&db, table_id)?, 2);

        Ok(())
    }

    #[test]
    fn test_unknown_table() -> Result<()> {
        let (_dir, db, _table_id) = setup()?;
        let txn = db.begin();
        assert!(matches!(txn.scan(404), Err(StorageError::TableNotFound(404))));
        Ok(())
    }
}
