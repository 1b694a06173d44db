//! Concurrency control module.
//!
//! Page-level two-phase locking: shared and exclusive locks, lock upgrade,
//! and deadlock detection over a transaction wait-for graph.

pub mod lock;

pub use lock::{LockManager, LockMode};
