//! Transaction identifiers.
//!
//! A `TransactionId` is the key under which the lock manager records page
//! locks and wait-for edges, and under which the buffer pool records which
//! transaction dirtied a cached page. Ids are never reused within one
//! `Database`, so a stale id can never be mistaken for a live transaction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// Source of fresh ids for `Database::begin`. The first id handed out is 1.
#[derive(Debug, Default)]
pub struct TransactionIdGenerator {
    last_issued: AtomicU64,
}

impl TransactionIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> TransactionId {
        TransactionId(self.last_issued.fetch_add(1, Ordering::Relaxed) + 1)
    }
}
