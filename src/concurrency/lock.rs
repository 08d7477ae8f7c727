//! Page-level lock management for strict two-phase locking.
//!
//! Locks are held until the owning transaction completes. A blocked request
//! records wait-for edges to the holders it conflicts with; if those edges
//! close a cycle the requester is chosen as the deadlock victim.

use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("Deadlock detected: {tid} aborted while waiting for page {page_id}")]
    Deadlock { tid: TransactionId, page_id: PageId },
}

/// Lock modes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock for read operations.
    Shared,
    /// Exclusive lock for write operations.
    Exclusive,
}

impl LockMode {
    /// Checks if this lock mode is compatible with another.
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }

    /// True if holding `self` satisfies a request for `requested`.
    pub fn covers(&self, requested: &LockMode) -> bool {
        *self == LockMode::Exclusive || *requested == LockMode::Shared
    }
}

#[derive(Debug, Default)]
struct LockEntry {
    holders: HashMap<TransactionId, LockMode>,
}

impl LockEntry {
    /// Holders other than `tid` whose lock prevents granting `mode` to `tid`.
    fn conflicting_holders(&self, tid: TransactionId, mode: LockMode) -> Vec<TransactionId> {
        self.holders
            .iter()
            .filter(|(holder, held)| **holder != tid && !held.is_compatible_with(&mode))
            .map(|(holder, _)| *holder)
            .collect()
    }
}

/// Deadlock detection information.
#[derive(Debug, Default)]
struct DeadlockDetector {
    /// Wait-for graph: tid -> set of tids it's waiting for.
    wait_for: HashMap<TransactionId, HashSet<TransactionId>>,
    /// Page each waiter is blocked on.
    waiting_on: HashMap<TransactionId, PageId>,
}

impl DeadlockDetector {
    /// Replaces the outgoing edges of `waiter`, blocked on `page_id`.
    fn set_edges(&mut self, waiter: TransactionId, page_id: PageId, holders: Vec<TransactionId>) {
        self.wait_for.insert(waiter, holders.into_iter().collect());
        self.waiting_on.insert(waiter, page_id);
    }

    fn clear_edges(&mut self, waiter: TransactionId) {
        self.wait_for.remove(&waiter);
        self.waiting_on.remove(&waiter);
    }

    /// Drops edges to `holder` from every waiter blocked on `page_id`.
    fn remove_holder(&mut self, holder: TransactionId, page_id: PageId) {
        for (waiter, blocked_on) in &self.waiting_on {
            if *blocked_on == page_id {
                if let Some(wait_set) = self.wait_for.get_mut(waiter) {
                    wait_set.remove(&holder);
                }
            }
        }
    }

    /// Removes all edges from and to a transaction.
    fn remove_transaction(&mut self, tid: TransactionId) {
        self.clear_edges(tid);
        for wait_set in self.wait_for.values_mut() {
            wait_set.remove(&tid);
        }
    }

    /// Detects whether `start` can reach itself through the wait-for graph.
    fn has_cycle_from(&self, start: TransactionId) -> bool {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<TransactionId> = self
            .wait_for
            .get(&start)
            .map(|next| next.iter().copied().collect())
            .unwrap_or_default();

        while let Some(current) = queue.pop_front() {
            if current == start {
                return true;
            }

            if visited.insert(current) {
                if let Some(waiting_for) = self.wait_for.get(&current) {
                    queue.extend(waiting_for.iter().copied());
                }
            }
        }

        false
    }
}

#[derive(Debug, Default)]
struct LockTable {
    entries: HashMap<PageId, LockEntry>,
    held: HashMap<TransactionId, HashSet<PageId>>,
    detector: DeadlockDetector,
}

impl LockTable {
    fn grant(&mut self, tid: TransactionId, page_id: PageId, mode: LockMode) {
        self.entries
            .entry(page_id)
            .or_default()
            .holders
            .entry(tid)
            .and_modify(|held| {
                if mode == LockMode::Exclusive {
                    *held = LockMode::Exclusive;
                }
            })
            .or_insert(mode);
        self.held.entry(tid).or_default().insert(page_id);
    }

    fn remove_holder(&mut self, tid: TransactionId, page_id: PageId) -> bool {
        let mut removed = false;
        if let Some(entry) = self.entries.get_mut(&page_id) {
            removed = entry.holders.remove(&tid).is_some();
            if entry.holders.is_empty() {
                self.entries.remove(&page_id);
            }
        }
        removed
    }
}

/// Lock manager for page-level strict two-phase locking.
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<LockTable>,
    /// Signalled whenever the holder set of any page changes.
    changed: Condvar,
}

impl LockManager {
    /// Creates a new lock manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires `mode` on `page_id` for `tid`, blocking while a conflicting
    /// lock is held by another transaction.
    ///
    /// A transaction that is the only holder of a shared lock may upgrade it
    /// to exclusive. Returns [`LockError::Deadlock`] if waiting would close a
    /// cycle in the wait-for graph; locks already held by `tid` are kept and
    /// the caller is expected to abort the transaction.
    pub fn acquire(
        &self,
        tid: TransactionId,
        page_id: PageId,
        mode: LockMode,
    ) -> Result<(), LockError> {
        let mut table = self.table.lock();
        let mut waited = false;

        loop {
            let conflicts = table
                .entries
                .get(&page_id)
                .map(|entry| entry.conflicting_holders(tid, mode))
                .unwrap_or_default();

            if conflicts.is_empty() {
                table.grant(tid, page_id, mode);
                table.detector.clear_edges(tid);
                if waited {
                    debug!("{} acquired {:?} lock on {} after waiting", tid, mode, page_id);
                }
                // Waiters on this page may now conflict with a new holder.
                self.changed.notify_all();
                return Ok(());
            }

            table.detector.set_edges(tid, page_id, conflicts);
            if table.detector.has_cycle_from(tid) {
                table.detector.clear_edges(tid);
                warn!(
                    "Deadlock: {} aborted requesting {:?} lock on {}",
                    tid, mode, page_id
                );
                return Err(LockError::Deadlock { tid, page_id });
            }

            if !waited {
                debug!("{} waiting for {:?} lock on {}", tid, mode, page_id);
                waited = true;
            }
            self.changed.wait(&mut table);
        }
    }

    /// Releases the lock `tid` holds on `page_id`, if any.
    pub fn release(&self, tid: TransactionId, page_id: PageId) {
        let mut table = self.table.lock();

        let removed = table.remove_holder(tid, page_id);
        if let Some(pages) = table.held.get_mut(&tid) {
            pages.remove(&page_id);
            if pages.is_empty() {
                table.held.remove(&tid);
            }
        }

        if removed {
            table.detector.remove_holder(tid, page_id);
            self.changed.notify_all();
        }
    }

    /// Releases all locks held by a transaction.
    pub fn release_all(&self, tid: TransactionId) {
        let mut table = self.table.lock();

        if let Some(pages) = table.held.remove(&tid) {
            for page_id in pages {
                table.remove_holder(tid, page_id);
            }
        }
        table.detector.remove_transaction(tid);

        self.changed.notify_all();
    }

    /// Checks if a transaction holds a lock at least as strong as `mode`.
    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId, mode: LockMode) -> bool {
        self.lock_mode(tid, page_id)
            .is_some_and(|held| held.covers(&mode))
    }

    /// The mode `tid` currently holds on `page_id`.
    pub fn lock_mode(&self, tid: TransactionId, page_id: PageId) -> Option<LockMode> {
        let table = self.table.lock();
        table
            .entries
            .get(&page_id)
            .and_then(|entry| entry.holders.get(&tid).copied())
    }

    /// Gets all pages locked by a transaction.
    pub fn locked_pages(&self, tid: TransactionId) -> Vec<PageId> {
        let table = self.table.lock();
        let mut pages: Vec<PageId> = table
            .held
            .get(&tid)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }

    /// Number of pages with at least one holder.
    pub fn lock_count(&self) -> usize {
        self.table.lock().entries.len()
    }
}
