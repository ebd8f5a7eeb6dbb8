use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tracing::{trace, warn};

use crate::{
    buffer_pool::BufferPool,
    error::DbResult,
    lock_manager::LockMode,
    page::PageRef,
    page_id::{PageId, TableId},
    tuple::Tuple,
};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Allocate an id no other transaction in this process has used.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// A running transaction. Dropping a transaction that was neither committed nor aborted aborts
/// it.
pub struct Transaction {
    tid: TransactionId,
    buffer_pool: Arc<BufferPool>,
    completed: bool,
}

impl Transaction {
    pub fn new(buffer_pool: Arc<BufferPool>) -> Self {
        let tid = TransactionId::new();
        trace!(%tid, "started");
        Self {
            tid,
            buffer_pool,
            completed: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.tid
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    pub fn get_page(&self, pid: PageId, mode: LockMode) -> DbResult<PageRef> {
        self.buffer_pool.get_page(self.tid, pid, mode)
    }

    pub fn insert_tuple(&self, table_id: TableId, tuple: &mut Tuple) -> DbResult<()> {
        self.buffer_pool.insert_tuple(self.tid, table_id, tuple)
    }

    pub fn delete_tuple(&self, tuple: &Tuple) -> DbResult<()> {
        self.buffer_pool.delete_tuple(self.tid, tuple)
    }

    /// Make the transaction's changes durable and release its locks.
    pub fn commit(mut self) -> DbResult<()> {
        self.completed = true;
        self.buffer_pool.transaction_complete(self.tid, true)
    }

    /// Throw away the transaction's changes and release its locks.
    pub fn abort(mut self) -> DbResult<()> {
        self.completed = true;
        self.buffer_pool.transaction_complete(self.tid, false)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.completed {
            return;
        }

        if let Err(e) = self.buffer_pool.transaction_complete(self.tid, false) {
            warn!(tid = %self.tid, error = %e, "failed to abort dropped transaction");
        }
    }
}
