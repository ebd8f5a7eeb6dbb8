use std::{sync::Arc, thread};

use crate::{
    config::LockRetryConfig,
    error::{DbError, DbResult},
    lock_manager::{LockManager, LockMode},
    page_id::PageId,
    transaction::TransactionId,
};

/// Blocks a transaction until the `LockManager` grants it a lock.
///
/// A denied request is retried after sleeping for the configured backoff. Every failed attempt
/// runs deadlock detection, and a transaction that closes a cycle is aborted right away.
pub struct ConcurrencyManager {
    lock_mgr: Arc<LockManager>,
    retry: LockRetryConfig,
}

impl ConcurrencyManager {
    /// Create a new Concurrency Manager.
    ///
    /// # Arguments
    ///
    /// * `lock_mgr` - A LockManager that is shared by every user of the buffer pool.
    /// * `retry` - How long to wait for a lock before giving up.
    pub fn new(lock_mgr: Arc<LockManager>, retry: LockRetryConfig) -> Self {
        Self { lock_mgr, retry }
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_mgr
    }

    /// Take a lock on a page, waiting for it if needed.
    ///
    /// Returns `DbError::Deadlock` when waiting would deadlock and `DbError::TransactionAborted`
    /// when the retry budget runs out. Either way the caller should abort the transaction.
    pub fn acquire(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> DbResult<()> {
        let mut attempts = 0u32;
        loop {
            if self.lock_mgr.request(tid, pid, mode) {
                return Ok(());
            }

            if self.lock_mgr.detect_deadlock(tid, pid) {
                log::warn!("{} aborted: deadlock waiting for {} lock on {}", tid, mode, pid);
                self.lock_mgr.clear_wait(tid);
                return Err(DbError::Deadlock { tid, pid });
            }

            attempts += 1;
            if self.retry.max_attempts.is_some_and(|max| attempts >= max) {
                log::warn!(
                    "{} aborted: no {} lock on {} after {} attempts",
                    tid,
                    mode,
                    pid,
                    attempts
                );
                self.lock_mgr.clear_wait(tid);
                return Err(DbError::TransactionAborted(tid));
            }

            log::trace!("{} waiting for {} lock on {}", tid, mode, pid);
            thread::sleep(self.retry.backoff);
        }
    }

    /// Take a shared lock on a page.
    pub fn slock(&self, tid: TransactionId, pid: PageId) -> DbResult<()> {
        self.acquire(tid, pid, LockMode::Shared)
    }

    /// Take an exclusive lock on a page.
    pub fn xlock(&self, tid: TransactionId, pid: PageId) -> DbResult<()> {
        self.acquire(tid, pid, LockMode::Exclusive)
    }

    /// Release all locks held by a transaction.
    pub fn release(&self, tid: TransactionId) {
        self.lock_mgr.release_all(tid);
    }
}
