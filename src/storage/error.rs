//! Storage layer error types.

use crate::catalog::TableId;
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The transaction can no longer make progress and must be aborted.
    #[error("Transaction {tid} aborted: {reason}")]
    TransactionAborted { tid: TransactionId, reason: String },

    #[error("Buffer pool is full: all {capacity} cached pages are dirty")]
    BufferPoolFull { capacity: usize },

    #[error("Page not found: {0}")]
    PageNotFound(PageId),

    #[error("Page is not cached: {0}")]
    PageNotCached(PageId),

    #[error("Page is full: {0} has no free slot")]
    PageFull(PageId),

    #[error("Tuple not found: {0}")]
    TupleNotFound(String),

    #[error("Table not found: {0}")]
    TableNotFound(TableId),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Corrupted data: {0}")]
    Corrupted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns true if the error means the transaction has to be aborted.
    pub fn is_abort(&self) -> bool {
        matches!(self, StorageError::TransactionAborted { .. })
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
