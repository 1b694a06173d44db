use super::replacer::Replacer;
use crate::storage::page::PageId;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Tracked pages, least recently used at front
    lru_list: VecDeque<PageId>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lru_list: VecDeque::with_capacity(capacity),
        }
    }

    fn position(&self, page_id: PageId) -> Option<usize> {
        self.lru_list.iter().position(|&id| id == page_id)
    }
}

impl Replacer for LruReplacer {
    fn record_access(&mut self, page_id: PageId) {
        if let Some(idx) = self.position(page_id) {
            self.lru_list.remove(idx);
        }
        self.lru_list.push_back(page_id);
    }

    fn remove(&mut self, page_id: PageId) {
        if let Some(idx) = self.position(page_id) {
            self.lru_list.remove(idx);
        }
    }

    fn victim(&mut self, evictable: &dyn Fn(PageId) -> bool) -> Option<PageId> {
        let idx = self.lru_list.iter().position(|&id| evictable(id))?;
        self.lru_list.remove(idx)
    }

    fn size(&self) -> usize {
        self.lru_list.len()
    }
}
