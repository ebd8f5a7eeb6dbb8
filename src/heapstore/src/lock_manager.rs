use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{page_id::PageId, transaction::TransactionId};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => write!(f, "S"),
            LockMode::Exclusive => write!(f, "X"),
        }
    }
}

/// One lock granted on a page.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct LockState {
    tid: TransactionId,
    mode: LockMode,
}

impl LockState {
    pub fn new(tid: TransactionId, mode: LockMode) -> Self {
        Self { tid, mode }
    }

    pub fn tid(&self) -> TransactionId {
        self.tid
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

#[derive(Default)]
struct LockTable {
    // Holders of each locked page. A transaction has at most one entry per page.
    holders: HashMap<PageId, Vec<LockState>>,
    // Pages locked by each transaction.
    held: HashMap<TransactionId, HashSet<PageId>>,
    // The page a transaction was last denied. A transaction blocks on one request at a time.
    waiting: HashMap<TransactionId, PageId>,
}

impl LockTable {
    fn grant(&mut self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        let holders = self.holders.entry(pid).or_default();
        match holders.iter_mut().find(|ls| ls.tid == tid) {
            Some(existing) => existing.mode = mode,
            None => holders.push(LockState::new(tid, mode)),
        }
        self.held.entry(tid).or_default().insert(pid);
        self.waiting.remove(&tid);
        log::trace!("granted {} lock on {} to {}", mode, pid, tid);
        true
    }

    fn wait(&mut self, tid: TransactionId, pid: PageId) -> bool {
        log::trace!("{} waits for {}", tid, pid);
        self.waiting.insert(tid, pid);
        false
    }

    fn remove(&mut self, tid: TransactionId, pid: PageId) -> bool {
        let removed = match self.holders.get_mut(&pid) {
            Some(holders) => {
                let before = holders.len();
                holders.retain(|ls| ls.tid != tid);
                let removed = holders.len() != before;
                if holders.is_empty() {
                    self.holders.remove(&pid);
                }
                removed
            }
            None => false,
        };

        if let Some(pages) = self.held.get_mut(&tid) {
            pages.remove(&pid);
            if pages.is_empty() {
                self.held.remove(&tid);
            }
        }

        removed
    }

    fn holders_of(&self, pid: &PageId) -> &[LockState] {
        self.holders.get(pid).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Grants shared and exclusive page locks to transactions and detects deadlocks between them.
///
/// The manager never blocks. A request that cannot be granted returns `false` and records the
/// page the transaction is waiting on; the caller decides whether to retry, check for a deadlock
/// with `detect_deadlock`, or abort. All bookkeeping is guarded by a single mutex so that every
/// request is evaluated against the complete holder set of the page.
#[derive(Default)]
pub struct LockManager {
    table: Mutex<LockTable>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, LockTable> {
        // the table is consistent after every method returns, so a poisoned lock is still usable
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Request a shared lock on a page.
    ///
    /// # Arguments
    ///
    /// * `tid` - The transaction asking for the lock.
    /// * `pid` - The page that the shared lock will be held on.
    pub fn request_shared(&self, tid: TransactionId, pid: PageId) -> bool {
        let mut table = self.table();
        let holders = table.holders_of(&pid);

        if holders.iter().any(|ls| ls.tid == tid) {
            // Re-entrant: any lock already held is at least as strong as a shared lock.
            table.waiting.remove(&tid);
            return true;
        }

        if holders.iter().any(|ls| ls.mode == LockMode::Exclusive) {
            return table.wait(tid, pid);
        }

        table.grant(tid, pid, LockMode::Shared)
    }

    /// Request an exclusive lock on a page. A transaction that is the only holder of a shared
    /// lock has it upgraded.
    ///
    /// # Arguments
    ///
    /// * `tid` - The transaction asking for the lock.
    /// * `pid` - The page that the exclusive lock will be held on.
    pub fn request_exclusive(&self, tid: TransactionId, pid: PageId) -> bool {
        let mut table = self.table();
        let holders = table.holders_of(&pid);

        if holders.iter().all(|ls| ls.tid == tid) {
            // Either nobody holds the page or `tid` is its only holder.
            return table.grant(tid, pid, LockMode::Exclusive);
        }

        table.wait(tid, pid)
    }

    /// Request a lock in the given mode.
    pub fn request(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => self.request_shared(tid, pid),
            LockMode::Exclusive => self.request_exclusive(tid, pid),
        }
    }

    /// Release the lock `tid` holds on `pid`. Returns whether there was one.
    pub fn release(&self, tid: TransactionId, pid: PageId) -> bool {
        let mut table = self.table();
        table.waiting.remove(&tid);
        let released = table.remove(tid, pid);
        if released {
            log::trace!("{} released lock on {}", tid, pid);
        }
        released
    }

    /// Release every lock held by a transaction and forget what it was waiting on.
    pub fn release_all(&self, tid: TransactionId) {
        let mut table = self.table();
        table.waiting.remove(&tid);

        let pages = table.held.remove(&tid).unwrap_or_default();
        for pid in pages.iter() {
            if let Some(holders) = table.holders.get_mut(pid) {
                holders.retain(|ls| ls.tid != tid);
                if holders.is_empty() {
                    table.holders.remove(pid);
                }
            }
        }
        log::debug!("{} released {} locks", tid, pages.len());
    }

    /// Forget that a transaction is waiting on a page, e.g. once it has given up on the request.
    pub fn clear_wait(&self, tid: TransactionId) {
        self.table().waiting.remove(&tid);
    }

    /// Check whether waiting for `pid` would deadlock `tid`.
    ///
    /// Starting from the other holders of `pid`, follow what each transaction is waiting on and
    /// who holds that page. Reaching a page that `tid` holds closes a cycle in the wait-for graph.
    pub fn detect_deadlock(&self, tid: TransactionId, pid: PageId) -> bool {
        let table = self.table();

        let Some(held) = table.held.get(&tid) else {
            // a transaction without locks cannot be waited on
            return false;
        };

        let mut visited = HashSet::from([tid]);
        let mut stack: Vec<TransactionId> = table
            .holders_of(&pid)
            .iter()
            .map(|ls| ls.tid)
            .filter(|h| *h != tid)
            .collect();

        while let Some(holder) = stack.pop() {
            if !visited.insert(holder) {
                continue;
            }

            let Some(waited) = table.waiting.get(&holder) else {
                continue;
            };

            if held.contains(waited) {
                log::debug!(
                    "deadlock: {} waits on {} which leads back to a page held by {}",
                    tid,
                    pid,
                    tid
                );
                return true;
            }

            stack.extend(
                table
                    .holders_of(waited)
                    .iter()
                    .map(|ls| ls.tid)
                    .filter(|h| !visited.contains(h)),
            );
        }

        false
    }

    /// Get the lock `tid` holds on `pid`, if any.
    pub fn lock_state_of(&self, tid: TransactionId, pid: PageId) -> Option<LockState> {
        self.table()
            .holders_of(&pid)
            .iter()
            .find(|ls| ls.tid == tid)
            .copied()
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_state_of(tid, pid).is_some()
    }

    /// Every lock currently granted on a page.
    pub fn holders(&self, pid: PageId) -> Vec<LockState> {
        self.table().holders_of(&pid).to_vec()
    }

    /// The pages a transaction holds a lock on, in page order.
    pub fn pages_locked_by(&self, tid: TransactionId) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self
            .table()
            .held
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }

    /// The page a transaction was last denied, if it has not been granted or released since.
    pub fn waiting_on(&self, tid: TransactionId) -> Option<PageId> {
        self.table().waiting.get(&tid).copied()
    }
}
