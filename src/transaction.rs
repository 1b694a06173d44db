//! Transactions over the buffer pool.
//!
//! - Transaction ids and their generator
//! - The `Transaction` handle: page access, tuple changes, commit and abort
//! - Transaction state tracking

pub mod id;
pub mod manager;
pub mod state;

// Re-export commonly used types
pub use id::{TransactionId, TransactionIdGenerator};
pub use manager::Transaction;
pub use state::TransactionState;
