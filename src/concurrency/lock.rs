//! Page lock management.
//!
//! Every page has at most one exclusive holder or any number of shared
//! holders, never both. A sole shared holder upgrades in place, and an
//! exclusive holder asking to read keeps its exclusive lock. Requests that
//! cannot be granted record wait-for edges; an edge that would close a cycle
//! aborts the requester instead.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Lock modes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock for read operations.
    Shared,
    /// Exclusive lock for write operations.
    Exclusive,
}

/// Wait-for graph: tid -> set of tids it's waiting for.
#[derive(Debug, Default)]
struct WaitForGraph {
    edges: HashMap<TransactionId, HashSet<TransactionId>>,
}

impl WaitForGraph {
    fn add_edge(&mut self, waiter: TransactionId, holder: TransactionId) {
        self.edges.entry(waiter).or_default().insert(holder);
    }

    /// Detects if adding `waiter -> holder` would create a cycle, i.e. if
    /// `holder` already reaches `waiter`.
    fn would_cause_deadlock(&self, waiter: TransactionId, holder: TransactionId) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([holder]);

        while let Some(current) = queue.pop_front() {
            if current == waiter {
                return true;
            }
            if visited.insert(current) {
                if let Some(next) = self.edges.get(&current) {
                    queue.extend(next.iter().copied());
                }
            }
        }

        false
    }

    /// Drops the outgoing edges of `tid`.
    fn clear_waits(&mut self, tid: TransactionId) {
        self.edges.remove(&tid);
    }

    /// Removes `tid` both as a node and as the target of any edge.
    fn remove_transaction(&mut self, tid: TransactionId) {
        self.edges.remove(&tid);
        self.edges.retain(|_, holders| {
            holders.remove(&tid);
            !holders.is_empty()
        });
    }
}

#[derive(Debug, Default)]
struct LockState {
    exclusive: HashMap<PageId, TransactionId>,
    shared: HashMap<PageId, HashSet<TransactionId>>,
    graph: WaitForGraph,
    /// One condition variable per contended page.
    waiters: HashMap<PageId, Arc<Condvar>>,
}

impl LockState {
    fn try_acquire(
        &mut self,
        page_id: PageId,
        tid: TransactionId,
        mode: LockMode,
    ) -> StorageResult<bool> {
        // Edges from an earlier denied attempt may name stale holders.
        self.graph.clear_waits(tid);

        let granted = match mode {
            LockMode::Shared => self.try_shared(page_id, tid)?,
            LockMode::Exclusive => self.try_exclusive(page_id, tid)?,
        };
        if granted {
            self.graph.clear_waits(tid);
        }
        Ok(granted)
    }

    fn try_shared(&mut self, page_id: PageId, tid: TransactionId) -> StorageResult<bool> {
        match self.exclusive.get(&page_id) {
            Some(&holder) if holder != tid => {
                self.wait_on(page_id, tid, holder)?;
                Ok(false)
            }
            Some(_) => Ok(true),
            None => {
                self.shared.entry(page_id).or_default().insert(tid);
                Ok(true)
            }
        }
    }

    fn try_exclusive(&mut self, page_id: PageId, tid: TransactionId) -> StorageResult<bool> {
        if let Some(&holder) = self.exclusive.get(&page_id) {
            if holder != tid {
                self.wait_on(page_id, tid, holder)?;
                return Ok(false);
            }
        }

        let others: Vec<TransactionId> = self
            .shared
            .get(&page_id)
            .into_iter()
            .flatten()
            .copied()
            .filter(|&holder| holder != tid)
            .collect();

        if others.is_empty() {
            // An upgrade trades the shared lock for the exclusive one
            self.shared.remove(&page_id);
            self.exclusive.insert(page_id, tid);
            return Ok(true);
        }

        for holder in others {
            self.wait_on(page_id, tid, holder)?;
        }
        Ok(false)
    }

    fn wait_on(
        &mut self,
        page_id: PageId,
        waiter: TransactionId,
        holder: TransactionId,
    ) -> StorageResult<()> {
        if self.graph.would_cause_deadlock(waiter, holder) {
            warn!(
                "deadlock: {} waiting for {} on page {} closes a cycle",
                waiter, holder, page_id
            );
            self.graph.clear_waits(waiter);
            return Err(StorageError::TransactionAborted {
                tid: waiter,
                reason: format!("deadlock waiting for {} on page {}", holder, page_id),
            });
        }
        self.graph.add_edge(waiter, holder);
        Ok(())
    }

    fn release(&mut self, page_id: PageId, tid: TransactionId) {
        if self.exclusive.get(&page_id) == Some(&tid) {
            self.exclusive.remove(&page_id);
        }
        if let Some(holders) = self.shared.get_mut(&page_id) {
            holders.remove(&tid);
            if holders.is_empty() {
                self.shared.remove(&page_id);
            }
        }

        if let Some(cv) = self.waiters.get(&page_id) {
            cv.notify_all();
            // Waiters keep their own clone while asleep.
            if Arc::strong_count(cv) == 1 {
                self.waiters.remove(&page_id);
            }
        }
    }

    fn holds_exclusive(&self, page_id: PageId, tid: TransactionId) -> bool {
        self.exclusive.get(&page_id) == Some(&tid)
    }

    fn holds_shared(&self, page_id: PageId, tid: TransactionId) -> bool {
        self.shared
            .get(&page_id)
            .is_some_and(|holders| holders.contains(&tid))
    }
}

/// Arbiter of page read/write admission.
///
/// The lock tables, the wait-for graph, and the condition variables live
/// behind a single mutex, so every admission decision sees one consistent
/// view of all three.
#[derive(Debug, Default)]
pub struct LockManager {
    state: Mutex<LockState>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tries to take a shared lock without blocking.
    ///
    /// Returns `Ok(false)` when another transaction holds the page
    /// exclusively; the caller should retry later. Returns
    /// `TransactionAborted` when waiting would deadlock.
    pub fn acquire_shared(&self, page_id: PageId, tid: TransactionId) -> StorageResult<bool> {
        self.state.lock().try_acquire(page_id, tid, LockMode::Shared)
    }

    /// Tries to take an exclusive lock without blocking. A transaction that
    /// is the only shared holder upgrades in place.
    pub fn acquire_exclusive(&self, page_id: PageId, tid: TransactionId) -> StorageResult<bool> {
        self.state.lock().try_acquire(page_id, tid, LockMode::Exclusive)
    }

    /// Blocks until the lock is granted or a deadlock is detected.
    pub fn acquire(&self, page_id: PageId, tid: TransactionId, mode: LockMode) -> StorageResult<()> {
        let mut state = self.state.lock();
        loop {
            if state.try_acquire(page_id, tid, mode)? {
                return Ok(());
            }

            let cv = state
                .waiters
                .entry(page_id)
                .or_insert_with(|| Arc::new(Condvar::new()))
                .clone();
            trace!("{} waiting for {:?} lock on page {}", tid, mode, page_id);
            cv.wait(&mut state);
        }
    }

    /// Releases whatever lock `tid` holds on `page_id`. Releasing a lock
    /// that is not held is a no-op.
    pub fn release(&self, page_id: PageId, tid: TransactionId) {
        self.state.lock().release(page_id, tid);
    }

    /// Releases every lock held by `tid`.
    pub fn release_all(&self, tid: TransactionId) {
        let mut state = self.state.lock();
        let pages = Self::pages_held(&state, tid);
        debug!("{} releasing {} page locks", tid, pages.len());
        for page_id in pages {
            state.release(page_id, tid);
        }
    }

    /// Removes `tid` from the wait-for graph. Called once the transaction
    /// has completed.
    pub fn forget_transaction(&self, tid: TransactionId) {
        self.state.lock().graph.remove_transaction(tid);
    }

    pub fn holds(&self, page_id: PageId, tid: TransactionId) -> bool {
        let state = self.state.lock();
        state.holds_exclusive(page_id, tid) || state.holds_shared(page_id, tid)
    }

    pub fn holds_exclusive(&self, page_id: PageId, tid: TransactionId) -> bool {
        self.state.lock().holds_exclusive(page_id, tid)
    }

    pub fn holds_shared(&self, page_id: PageId, tid: TransactionId) -> bool {
        self.state.lock().holds_shared(page_id, tid)
    }

    /// The exclusive holder of `page_id` and its shared holders.
    pub fn holders(&self, page_id: PageId) -> (Option<TransactionId>, Vec<TransactionId>) {
        let state = self.state.lock();
        let shared = state
            .shared
            .get(&page_id)
            .map(|holders| holders.iter().copied().collect())
            .unwrap_or_default();
        (state.exclusive.get(&page_id).copied(), shared)
    }

    /// Pages on which `tid` holds any lock.
    pub fn locked_pages(&self, tid: TransactionId) -> Vec<PageId> {
        Self::pages_held(&self.state.lock(), tid)
    }

    /// Transactions `tid` is currently recorded as waiting for.
    pub fn waits_for(&self, tid: TransactionId) -> Vec<TransactionId> {
        self.state
            .lock()
            .graph
            .edges
            .get(&tid)
            .map(|holders| holders.iter().copied().collect())
            .unwrap_or_default()
    }

    fn pages_held(state: &LockState, tid: TransactionId) -> Vec<PageId> {
        let mut pages: HashSet<PageId> = state
            .exclusive
            .iter()
            .filter(|(_, holder)| **holder == tid)
            .map(|(&page_id, _)| page_id)
            .collect();
        pages.extend(
            state
                .shared
                .iter()
                .filter(|(_, holders)| holders.contains(&tid))
                .map(|(&page_id, _)| page_id),
        );
        pages.into_iter().collect()
    }
}
