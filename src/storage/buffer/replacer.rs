use crate::storage::page::PageId;
use std::fmt::Debug;

pub trait Replacer: Send + Sync + Debug {
    /// Record that a cached page was just used.
    fn record_access(&mut self, page_id: PageId);

    /// Stop tracking a page that left the cache.
    fn remove(&mut self, page_id: PageId);

    /// Select and stop tracking a page to evict, considering only pages for
    /// which `evictable` holds. Returns None if no such page exists.
    fn victim(&mut self, evictable: &dyn Fn(PageId) -> bool) -> Option<PageId>;

    /// Get the number of tracked pages.
    fn size(&self) -> usize;
}
