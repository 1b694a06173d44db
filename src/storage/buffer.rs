pub mod lru;
pub mod replacer;

use crate::access::tuple::{RecordId, Tuple};
use crate::catalog::{Catalog, TableId};
use crate::concurrency::LockManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, PageId, Permission};
use crate::transaction::TransactionId;
use log::{debug, warn};
use lru::LruReplacer;
use parking_lot::Mutex;
use replacer::Replacer;
use std::collections::HashMap;
use std::sync::Arc;

/// Bounded cache of pages shared by all transactions.
///
/// Every page access goes through [`BufferPool::fetch_page`], which first
/// takes the page lock matching the requested permission and only then
/// touches the cache. Pages dirtied by a transaction stay cached until that
/// transaction completes: they are written out on commit and thrown away on
/// abort, and the eviction policy never picks them.
///
/// Callers get a copy of the cached page. Changes become visible by handing
/// the modified page back through `insert_tuple` / `delete_tuple`, which
/// install it as dirty.
pub struct BufferPool {
    catalog: Arc<Catalog>,
    lock_manager: Arc<LockManager>,
    state: Mutex<PoolState>,
    max_pages: usize,
}

struct PoolState {
    pages: HashMap<PageId, Page>,
    replacer: Box<dyn Replacer>,
}

impl BufferPool {
    pub fn new(catalog: Arc<Catalog>, lock_manager: Arc<LockManager>, max_pages: usize) -> Self {
        Self::with_replacer(
            catalog,
            lock_manager,
            Box::new(LruReplacer::new(max_pages)),
            max_pages,
        )
    }

    pub fn with_replacer(
        catalog: Arc<Catalog>,
        lock_manager: Arc<LockManager>,
        replacer: Box<dyn Replacer>,
        max_pages: usize,
    ) -> Self {
        Self {
            catalog,
            lock_manager,
            state: Mutex::new(PoolState {
                pages: HashMap::with_capacity(max_pages),
                replacer,
            }),
            max_pages,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    /// Returns the page, reading it from disk on a miss.
    ///
    /// Blocks until `tid` holds the lock `perm` calls for. Fails with
    /// [`StorageError::TransactionAborted`] if waiting would deadlock, and
    /// with [`StorageError::BufferPoolFull`] if the page is not cached and
    /// every cached page is dirty.
    pub fn fetch_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        perm: Permission,
    ) -> StorageResult<Page> {
        let held_before = self.lock_manager.holds(page_id, tid);
        self.lock_page(tid, page_id, perm)?;

        let result = self.load_page(page_id);
        // A lock on a page that could not be read protects nothing
        if result.is_err() && !held_before {
            self.lock_manager.release(page_id, tid);
        }
        result
    }

    /// Takes the page lock for `perm` without touching the cache.
    pub(crate) fn lock_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        perm: Permission,
    ) -> StorageResult<()> {
        self.lock_manager.acquire(page_id, tid, perm.lock_mode())
    }

    fn load_page(&self, page_id: PageId) -> StorageResult<Page> {
        let mut state = self.state.lock();

        if let Some(page) = state.pages.get(&page_id) {
            let page = page.clone();
            state.replacer.record_access(page_id);
            return Ok(page);
        }

        if state.pages.len() >= self.max_pages {
            self.evict_page(&mut state)?;
        }

        let file = self.catalog.heap_file(page_id.table_id)?;
        let page = file.read_page(page_id)?;
        debug!("read page {} from disk", page_id);

        state.pages.insert(page_id, page.clone());
        state.replacer.record_access(page_id);
        Ok(page)
    }

    /// Drops the least recently used clean page from the cache.
    fn evict_page(&self, state: &mut PoolState) -> StorageResult<()> {
        let PoolState { pages, replacer } = state;
        let victim = replacer
            .victim(&|id| pages.get(&id).is_some_and(|page| page.is_dirty().is_none()))
            .ok_or(StorageError::BufferPoolFull {
                capacity: self.max_pages,
            })?;

        pages.remove(&victim);
        debug!("evicted page {}", victim);
        Ok(())
    }

    /// Adds `tuple` to table `table_id` on behalf of `tid`, sets its record
    /// id and returns it. The page it lands on becomes dirty.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> StorageResult<RecordId> {
        let file = self.catalog.heap_file(table_id)?;
        let pages = file.insert_tuple(self, tid, tuple)?;
        if let Err(e) = self.install_dirty(tid, pages) {
            // The slot was never stored
            tuple.set_record_id(None);
            return Err(e);
        }
        tuple
            .record_id()
            .ok_or_else(|| StorageError::Corrupted("inserted tuple has no record id".to_string()))
    }

    /// Removes `tuple` from its table on behalf of `tid` and clears its
    /// record id. The page it lived on becomes dirty.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &mut Tuple) -> StorageResult<()> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| StorageError::TupleNotFound("tuple has no record id".to_string()))?;
        let file = self.catalog.heap_file(record_id.page_id.table_id)?;
        let pages = file.delete_tuple(self, tid, tuple)?;
        if let Err(e) = self.install_dirty(tid, pages) {
            tuple.set_record_id(Some(record_id));
            return Err(e);
        }
        Ok(())
    }

    fn install_dirty(&self, tid: TransactionId, pages: Vec<Page>) -> StorageResult<()> {
        let mut state = self.state.lock();
        for mut page in pages {
            let page_id = page.id();
            if !state.pages.contains_key(&page_id) && state.pages.len() >= self.max_pages {
                self.evict_page(&mut state)?;
            }
            page.mark_dirty(Some(tid));
            state.pages.insert(page_id, page);
            state.replacer.record_access(page_id);
        }
        Ok(())
    }

    /// Ends `tid`: on commit its dirty pages are written to disk, on abort
    /// they are replaced by their on-disk images. A page that cannot be
    /// written on commit is reverted like an aborted one. All of its locks
    /// are released either way, no page stays dirty-by-`tid`, and the first
    /// error hit is returned.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> StorageResult<()> {
        let result = if commit {
            self.commit_pages(tid)
        } else {
            self.restore_pages(tid)
        };

        self.lock_manager.release_all(tid);
        self.lock_manager.forget_transaction(tid);

        match &result {
            Ok(()) => debug!("{} {}", tid, if commit { "committed" } else { "aborted" }),
            Err(e) => warn!("{} did not complete cleanly: {}", tid, e),
        }
        result
    }

    /// Writes every page dirtied by `tid` to disk and marks it clean.
    pub fn flush_pages(&self, tid: TransactionId) -> StorageResult<()> {
        let mut state = self.state.lock();
        for page_id in Self::dirtied_by(&state, tid) {
            self.flush_locked(&mut state, page_id)?;
        }
        Ok(())
    }

    fn commit_pages(&self, tid: TransactionId) -> StorageResult<()> {
        let mut state = self.state.lock();
        let mut first_error = None;

        for page_id in Self::dirtied_by(&state, tid) {
            if let Err(e) = self.flush_locked(&mut state, page_id) {
                warn!("{} could not write page {}: {}", tid, page_id, e);
                first_error.get_or_insert(e);
                if let Err(e) = self.restore_locked(&mut state, page_id) {
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn restore_pages(&self, tid: TransactionId) -> StorageResult<()> {
        let mut state = self.state.lock();
        let mut first_error = None;

        for page_id in Self::dirtied_by(&state, tid) {
            if let Err(e) = self.restore_locked(&mut state, page_id) {
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Replaces the cached page with its on-disk image, or drops it from the
    /// cache when that image cannot be read.
    fn restore_locked(&self, state: &mut PoolState, page_id: PageId) -> StorageResult<()> {
        let restored = self
            .catalog
            .heap_file(page_id.table_id)
            .and_then(|file| file.read_page(page_id));
        match restored {
            Ok(page) => {
                state.pages.insert(page_id, page);
                Ok(())
            }
            Err(e) => {
                state.pages.remove(&page_id);
                state.replacer.remove(page_id);
                Err(e)
            }
        }
    }

    fn dirtied_by(state: &PoolState, tid: TransactionId) -> Vec<PageId> {
        let mut page_ids: Vec<PageId> = state
            .pages
            .values()
            .filter(|page| page.is_dirty() == Some(tid))
            .map(|page| page.id())
            .collect();
        page_ids.sort();
        page_ids
    }

    /// Writes the cached page to disk if it is dirty.
    pub fn flush_page(&self, page_id: PageId) -> StorageResult<()> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state, page_id)
    }

    /// Writes every dirty cached page to disk. This ignores transaction
    /// boundaries and is meant for shutdown and tests.
    pub fn flush_all(&self) -> StorageResult<()> {
        let mut state = self.state.lock();
        let page_ids: Vec<PageId> = state.pages.keys().copied().collect();
        for page_id in page_ids {
            self.flush_locked(&mut state, page_id)?;
        }
        Ok(())
    }

    fn flush_locked(&self, state: &mut PoolState, page_id: PageId) -> StorageResult<()> {
        let page = state
            .pages
            .get_mut(&page_id)
            .ok_or(StorageError::PageNotCached(page_id))?;

        if page.is_dirty().is_some() {
            let file = self.catalog.heap_file(page_id.table_id)?;
            file.write_page(page)?;
            page.mark_dirty(None);
            debug!("flushed page {}", page_id);
        }
        Ok(())
    }

    /// Drops the page from the cache without writing it.
    pub fn discard_page(&self, page_id: PageId) {
        let mut state = self.state.lock();
        state.pages.remove(&page_id);
        state.replacer.remove(page_id);
    }

    /// Drops every cached page of `table_id` without writing any of them.
    /// Returns how many pages were dropped.
    pub fn discard_table(&self, table_id: TableId) -> usize {
        let mut state = self.state.lock();
        let page_ids: Vec<PageId> = state
            .pages
            .keys()
            .filter(|page_id| page_id.table_id == table_id)
            .copied()
            .collect();
        for page_id in &page_ids {
            state.pages.remove(page_id);
            state.replacer.remove(*page_id);
        }
        debug!("discarded {} cached pages of table {}", page_ids.len(), table_id);
        page_ids.len()
    }

    /// True if some transaction has uncommitted changes to a page of
    /// `table_id`.
    pub fn has_dirty_pages(&self, table_id: TableId) -> bool {
        self.state
            .lock()
            .pages
            .values()
            .any(|page| page.id().table_id == table_id && page.is_dirty().is_some())
    }

    /// Releases `tid`'s lock on one page before the transaction ends.
    /// Only safe for pages `tid` neither read meaningfully nor modified.
    pub fn release_page(&self, tid: TransactionId, page_id: PageId) {
        self.lock_manager.release(page_id, tid);
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.holds(page_id, tid)
    }

    /// Number of cached pages.
    pub fn len(&self) -> usize {
        self.state.lock().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_pages
    }

    pub fn is_cached(&self, page_id: PageId) -> bool {
        self.state.lock().pages.contains_key(&page_id)
    }

    /// Pages currently dirtied by `tid`, in page-id order.
    pub fn dirty_pages(&self, tid: TransactionId) -> Vec<PageId> {
        Self::dirtied_by(&self.state.lock(), tid)
    }

    /// Copy of the cached image of a page, without taking any lock.
    pub fn cached_page(&self, page_id: PageId) -> Option<Page> {
        self.state.lock().pages.get(&page_id).cloned()
    }
}
