//! Transaction lifecycle: id allocation, state tracking, and routing of
//! commit/abort to the buffer pool.

use super::id::{TransactionId, TransactionIdGenerator};
use super::state::{TransactionInfo, TransactionState};
use crate::storage::buffer::BufferPool;
use crate::storage::error::StorageError;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction {0} not found or already finished")]
    NotFound(TransactionId),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, TransactionError>;

pub struct TransactionManager {
    id_generator: TransactionIdGenerator,
    transactions: RwLock<HashMap<TransactionId, TransactionInfo>>,
    pool: BufferPool,
}

impl TransactionManager {
    pub fn new(pool: BufferPool) -> Self {
        Self {
            id_generator: TransactionIdGenerator::new(),
            transactions: RwLock::new(HashMap::new()),
            pool,
        }
    }

    pub fn begin(&self) -> TransactionId {
        let id = self.id_generator.next();
        self.transactions.write().insert(id, TransactionInfo::new(id));
        debug!("{} started", id);
        id
    }

    /// Flushes the transaction's pages and releases its locks.
    ///
    /// On a flush failure the transaction stays active with its locks held;
    /// the caller must then call [`abort`](Self::abort).
    pub fn commit(&self, id: TransactionId) -> Result<()> {
        self.ensure_active(id)?;
        self.pool.transaction_complete(id, true)?;
        self.finish(id, TransactionState::Committed);
        Ok(())
    }

    /// Restores the transaction's pages and releases its locks.
    pub fn abort(&self, id: TransactionId) -> Result<()> {
        self.ensure_active(id)?;
        self.pool.transaction_complete(id, false)?;
        self.finish(id, TransactionState::Aborted);
        Ok(())
    }

    pub fn state(&self, id: TransactionId) -> Result<TransactionState> {
        self.transactions
            .read()
            .get(&id)
            .map(|info| info.state)
            .ok_or(TransactionError::NotFound(id))
    }

    pub fn info(&self, id: TransactionId) -> Result<TransactionInfo> {
        self.transactions
            .read()
            .get(&id)
            .cloned()
            .ok_or(TransactionError::NotFound(id))
    }

    pub fn is_active(&self, id: TransactionId) -> bool {
        self.state(id).is_ok_and(|state| state.is_active())
    }

    pub fn active_transactions(&self) -> Vec<TransactionId> {
        let mut ids: Vec<TransactionId> = self
            .transactions
            .read()
            .values()
            .filter(|info| info.state.is_active())
            .map(|info| info.id)
            .collect();
        ids.sort();
        ids
    }

    /// Number of transactions currently tracked; only active ones are kept.
    pub fn len(&self) -> usize {
        self.transactions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.read().is_empty()
    }

    fn ensure_active(&self, id: TransactionId) -> Result<()> {
        if !self.is_active(id) {
            return Err(TransactionError::NotFound(id));
        }
        Ok(())
    }

    /// Drops the entry for `id` once it reaches a terminal state.
    fn finish(&self, id: TransactionId, state: TransactionState) {
        let Some(mut info) = self.transactions.write().remove(&id) else {
            return;
        };
        info.finish(state);
        info!("{} {} after {:?}", id, state, info.duration());
    }
}

/// Scoped transaction that aborts on drop unless committed or aborted.
pub struct Transaction<'a> {
    id: TransactionId,
    manager: &'a TransactionManager,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub fn begin(manager: &'a TransactionManager) -> Self {
        Self {
            id: manager.begin(),
            manager,
            finished: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Commits; if the commit fails the handle aborts when dropped.
    pub fn commit(mut self) -> Result<()> {
        self.manager.commit(self.id)?;
        self.finished = true;
        Ok(())
    }

    pub fn abort(mut self) -> Result<()> {
        self.finished = true;
        self.manager.abort(self.id)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.manager.abort(self.id) {
                warn!("Failed to abort {} on drop: {}", self.id, e);
            }
        }
    }
}
