//! Sequential scan over a heap file.

use crate::access::heap::HeapFile;
use crate::access::tuple::Tuple;
use crate::storage::buffer::BufferPool;
use crate::storage::error::StorageResult;
use crate::storage::page::{PageId, Permission};
use crate::transaction::TransactionId;
use std::collections::VecDeque;
use std::sync::Arc;

/// Forward-only iterator over the tuples of a heap file.
///
/// Pages are fetched one at a time, in page-number order, with read-only
/// permission; tuples come out in slot order within each page. The page
/// count is re-read whenever the current page is used up, so pages appended
/// by the scanning transaction itself are visited too. After an error the
/// scan yields nothing more until it is rewound.
pub struct HeapScan<'a> {
    file: Arc<HeapFile>,
    pool: &'a BufferPool,
    tid: TransactionId,
    next_page: u32,
    buffered: VecDeque<Tuple>,
    done: bool,
}

impl<'a> HeapScan<'a> {
    pub fn new(file: Arc<HeapFile>, pool: &'a BufferPool, tid: TransactionId) -> Self {
        Self {
            file,
            pool,
            tid,
            next_page: 0,
            buffered: VecDeque::new(),
            done: false,
        }
    }

    /// Restarts the scan from the first page.
    pub fn rewind(&mut self) {
        self.next_page = 0;
        self.buffered.clear();
        self.done = false;
    }

    /// Buffers the tuples of the next page. Returns false past the last page.
    fn load_next_page(&mut self) -> StorageResult<bool> {
        if self.next_page >= self.file.num_pages()? {
            return Ok(false);
        }

        let page_id = PageId::new(self.file.id(), self.next_page);
        let page = self.pool.fetch_page(self.tid, page_id, Permission::ReadOnly)?;
        self.buffered.extend(self.file.tuples_on(&page)?);
        self.next_page += 1;

        Ok(true)
    }
}

impl Iterator for HeapScan<'_> {
    type Item = StorageResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(tuple) = self.buffered.pop_front() {
                return Some(Ok(tuple));
            }
            if self.done {
                return None;
            }

            match self.load_next_page() {
                // An empty page just means moving on to the next one
                Ok(true) => continue,
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
