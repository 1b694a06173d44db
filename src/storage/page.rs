pub mod heap_page;

use crate::catalog::TableId;
use crate::concurrency::LockMode;
use crate::transaction::TransactionId;
use std::fmt;

/// Identity of a page: the table it belongs to and its position in that
/// table's heap file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId {
    pub table_id: TableId,
    pub page_no: u32,
}

impl PageId {
    pub fn new(table_id: TableId, page_no: u32) -> Self {
        Self { table_id, page_no }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table_id, self.page_no)
    }
}

/// Access intent of a page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    /// The lock a request with this permission needs.
    pub fn lock_mode(self) -> LockMode {
        match self {
            Permission::ReadOnly => LockMode::Shared,
            Permission::ReadWrite => LockMode::Exclusive,
        }
    }
}

/// An in-memory copy of one page.
///
/// `dirty` names the transaction that last modified the bytes and has not yet
/// committed; `None` means the bytes match the on-disk image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    id: PageId,
    data: Box<[u8]>,
    dirty: Option<TransactionId>,
}

impl Page {
    /// A zero-filled page, which is also the image of an empty heap page.
    pub fn empty(id: PageId, page_size: usize) -> Self {
        Self {
            id,
            data: vec![0u8; page_size].into_boxed_slice(),
            dirty: None,
        }
    }

    pub fn from_bytes(id: PageId, data: Vec<u8>) -> Self {
        Self {
            id,
            data: data.into_boxed_slice(),
            dirty: None,
        }
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirty
    }

    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirty = tid;
    }
}

pub use heap_page::HeapPage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id_equality() {
        assert_eq!(PageId::new(1, 2), PageId::new(1, 2));
        assert_ne!(PageId::new(1, 2), PageId::new(2, 2));
        assert_ne!(PageId::new(1, 2), PageId::new(1, 3));
        assert_eq!(PageId::new(7, 9).to_string(), "7:9");
    }

    #[test]
    fn test_permission_lock_mode() {
        assert_eq!(Permission::ReadOnly.lock_mode(), LockMode::Shared);
        assert_eq!(Permission::ReadWrite.lock_mode(), LockMode::Exclusive);
    }

    #[test]
    fn test_dirty_marker() {
        let mut page = Page::empty(PageId::new(1, 0), 64);
        assert_eq!(page.is_dirty(), None);
        assert!(page.data().iter().all(|&b| b == 0));

        page.mark_dirty(Some(TransactionId::new(3)));
        assert_eq!(page.is_dirty(), Some(TransactionId::new(3)));

        page.mark_dirty(None);
        assert_eq!(page.is_dirty(), None);
    }
}
