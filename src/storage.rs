//! Storage layer implementation for heapstore.
//!
//! This module provides the page-based foundation the rest of the engine
//! builds on:
//!
//! - **Page**: Fixed-size block of bytes tagged with the transaction that last
//!   dirtied it
//! - **HeapPage**: Slotted layout for fixed-length records inside a page
//! - **PageFile**: Page-granular reads and writes against one backing file
//! - **BufferPool**: Bounded page cache that mediates every page access under
//!   two-phase locking, with a no-steal/force commit policy

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;

pub use buffer::BufferPool;
pub use disk::PageFile;
pub use error::{StorageError, StorageResult};
pub use page::{HeapPage, Page, PageId, Permission};
