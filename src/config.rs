//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Default number of bytes per page, header included.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default number of pages a buffer pool caches.
pub const DEFAULT_MAX_PAGES: usize = 50;

/// Sizing knobs shared by every component of a [`Database`](crate::database::Database).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Size of every page in every heap file.
    pub page_size: usize,
    /// Capacity of the buffer pool, in pages.
    pub max_pages: usize,
}

impl StorageConfig {
    pub fn new(page_size: usize, max_pages: usize) -> Self {
        Self {
            page_size,
            max_pages,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, DEFAULT_MAX_PAGES)
    }
}
