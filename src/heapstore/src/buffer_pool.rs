use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
};

use tracing::{debug, trace, warn};

use crate::{
    catalog::Catalog,
    concurrency_manager::ConcurrencyManager,
    config::LockRetryConfig,
    error::{DbError, DbResult},
    eviction_policy::{EvictionPolicy, LruEvictionPolicy},
    lock_manager::{LockManager, LockMode},
    page::{self, PageRef},
    page_id::{PageId, TableId},
    transaction::TransactionId,
    tuple::Tuple,
};

struct Frames {
    pages: HashMap<PageId, PageRef>,
    policy: Box<dyn EvictionPolicy>,
}

impl Frames {
    // A page may leave the cache when nobody outside the cache holds it and it matches what is
    // on disk.
    fn evict(&mut self) -> Option<PageId> {
        let Frames { pages, policy } = self;
        let victim = policy.evict(&|pid| {
            pages
                .get(pid)
                .is_some_and(|p| Arc::strong_count(p) == 1 && !page::read(p).is_dirty())
        })?;
        pages.remove(&victim);
        Some(victim)
    }

    fn remove(&mut self, pid: PageId) -> Option<PageRef> {
        self.policy.remove(pid);
        self.pages.remove(&pid)
    }

    fn dirtied_by(&self, tid: TransactionId) -> Vec<PageRef> {
        self.pages
            .values()
            .filter(|p| page::read(p).dirtied_by() == Some(tid))
            .cloned()
            .collect()
    }
}

/// A bounded cache of heap pages.
///
/// Every page handed out is covered by a lock taken on behalf of the requesting transaction. Pages
/// modified by a transaction stay in memory until it completes: commit writes them back to their
/// heap files, abort throws them away.
pub struct BufferPool {
    capacity: usize,
    frames: Mutex<Frames>,
    concurrency_mgr: ConcurrencyManager,
    catalog: Arc<Catalog>,
}

impl BufferPool {
    /// Create a buffer pool that evicts the least recently used page.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The number of pages that can be cached at once.
    /// * `lock_mgr` - The lock table guarding every page served by the pool.
    /// * `catalog` - The tables whose pages can be requested.
    /// * `retry` - How long a transaction waits for a lock.
    pub fn new(
        capacity: usize,
        lock_mgr: Arc<LockManager>,
        catalog: Arc<Catalog>,
        retry: LockRetryConfig,
    ) -> Self {
        Self::with_eviction_policy(
            capacity,
            lock_mgr,
            catalog,
            retry,
            Box::new(LruEvictionPolicy::new()),
        )
    }

    pub fn with_eviction_policy(
        capacity: usize,
        lock_mgr: Arc<LockManager>,
        catalog: Arc<Catalog>,
        retry: LockRetryConfig,
        policy: Box<dyn EvictionPolicy>,
    ) -> Self {
        Self {
            capacity,
            frames: Mutex::new(Frames {
                pages: HashMap::with_capacity(capacity),
                policy,
            }),
            concurrency_mgr: ConcurrencyManager::new(lock_mgr, retry),
            catalog,
        }
    }

    fn frames(&self) -> MutexGuard<'_, Frames> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of pages currently cached.
    pub fn num_cached(&self) -> usize {
        self.frames().pages.len()
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        self.concurrency_mgr.lock_manager()
    }

    /// Get a page on behalf of a transaction, locking it in at least `mode` first.
    ///
    /// Blocks until the lock is granted. Fails with `DbError::Deadlock` or
    /// `DbError::TransactionAborted` when the transaction has to be aborted instead, and with
    /// `DbError::BufferPoolFull` when the page is not cached and every cached page is pinned or
    /// dirty.
    pub fn get_page(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> DbResult<PageRef> {
        let file = self.catalog.file(pid.table_id())?;
        self.concurrency_mgr.acquire(tid, pid, mode)?;

        let mut frames = self.frames();
        if let Some(page) = frames.pages.get(&pid).cloned() {
            frames.policy.touch(pid);
            trace!(%tid, %pid, "buffer pool hit");
            return Ok(page);
        }

        if frames.pages.len() >= self.capacity {
            match frames.evict() {
                Some(victim) => trace!(%victim, "evicted page"),
                None => {
                    warn!(%tid, %pid, capacity = self.capacity, "no page can be evicted");
                    return Err(DbError::BufferPoolFull);
                }
            }
        }

        let page: PageRef = Arc::new(RwLock::new(file.read_page(pid)?));
        frames.pages.insert(pid, page.clone());
        frames.policy.touch(pid);
        trace!(%tid, %pid, "loaded page into buffer pool");
        Ok(page)
    }

    /// Give up the lock a transaction holds on a page before it completes.
    ///
    /// Only for callers that know the page was not modified and that releasing it early keeps the
    /// schedule serializable.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) {
        self.lock_manager().release(tid, pid);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_manager().holds_lock(tid, pid)
    }

    /// Insert a tuple into a table on behalf of a transaction. The pages that were changed stay
    /// cached and are marked dirty until the transaction completes.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> DbResult<()> {
        let file = self.catalog.file(table_id)?;
        let pages = file.insert_tuple(self, tid, tuple)?;
        self.mark_dirty(tid, &pages);
        Ok(())
    }

    /// Delete a tuple from the table its record id points to.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> DbResult<()> {
        let rid = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        let file = self.catalog.file(rid.page_id().table_id())?;
        let pages = file.delete_tuple(self, tid, tuple)?;
        self.mark_dirty(tid, &pages);
        Ok(())
    }

    fn mark_dirty(&self, tid: TransactionId, pages: &[PageRef]) {
        let mut frames = self.frames();
        for p in pages {
            let pid = {
                let mut locked = page::write(p);
                locked.mark_dirty(Some(tid));
                locked.id()
            };
            // a dirty page has to be found again by the transaction that changed it
            frames.pages.entry(pid).or_insert_with(|| p.clone());
            frames.policy.touch(pid);
        }
    }

    /// Finish a transaction.
    ///
    /// On commit every page the transaction dirtied is written to its heap file, on abort those
    /// pages are dropped so the next read gets what is on disk. Either way the transaction's locks
    /// are released. If a page cannot be written the rest are dropped, the locks are released and
    /// the error is returned.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> DbResult<()> {
        let res = if commit {
            self.flush_pages(tid)
        } else {
            Ok(())
        };

        let discarded = {
            let mut frames = self.frames();
            let dirty: Vec<PageId> = frames
                .dirtied_by(tid)
                .iter()
                .map(|p| page::read(p).id())
                .collect();
            for pid in dirty.iter() {
                frames.remove(*pid);
            }
            dirty.len()
        };

        self.concurrency_mgr.release(tid);

        match &res {
            Ok(()) if commit => debug!(%tid, "committed"),
            Ok(()) => debug!(%tid, discarded, "aborted"),
            Err(e) => warn!(%tid, discarded, error = %e, "commit failed"),
        }
        res
    }

    fn flush(&self, page: &PageRef) -> DbResult<()> {
        let mut locked = page::write(page);
        if !locked.is_dirty() {
            return Ok(());
        }

        let file = self.catalog.file(locked.id().table_id())?;
        file.write_page(&locked)?;
        locked.mark_dirty(None);
        trace!(pid = %locked.id(), "flushed page");
        Ok(())
    }

    // Write every page dirtied by a transaction to disk. Only commit may call this, a page written
    // earlier could not be thrown away by an abort.
    fn flush_pages(&self, tid: TransactionId) -> DbResult<()> {
        let pages = self.frames().dirtied_by(tid);
        for p in pages.iter() {
            self.flush(p)?;
        }
        Ok(())
    }

    /// Drop a page from the cache without writing it back.
    pub fn discard_page(&self, pid: PageId) {
        if self.frames().remove(pid).is_some() {
            trace!(%pid, "discarded page");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use crate::{
        error::DbError,
        lock_manager::LockMode,
        page,
        page_id::PageId,
        tests::test_utils::{init_logging, test_db, two_int_schema},
        tuple,
    };

    #[test]
    fn test_caches_up_to_capacity() {
        init_logging();
        let td = tempdir().unwrap();
        let db = test_db(&td, 256, 2);
        let file = db.create_table("t", two_int_schema()).unwrap();
        for _ in 0..3 {
            file.append_empty_page().unwrap();
        }
        let pool = db.buffer_pool();
        let tx = db.begin();

        for n in 0..3 {
            pool.get_page(tx.id(), PageId::new(file.id(), n), LockMode::Shared)
                .unwrap();
            assert_eq!(pool.num_cached(), (n as usize + 1).min(2));
        }

        // cached pages are shared
        let a = pool
            .get_page(tx.id(), PageId::new(file.id(), 2), LockMode::Shared)
            .unwrap();
        let b = pool
            .get_page(tx.id(), PageId::new(file.id(), 2), LockMode::Shared)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn test_get_page_locks_first() {
        let td = tempdir().unwrap();
        let db = test_db(&td, 256, 4);
        let file = db.create_table("t", two_int_schema()).unwrap();
        file.append_empty_page().unwrap();
        let pool = db.buffer_pool();
        let tx = db.begin();
        let pid = PageId::new(file.id(), 0);

        pool.get_page(tx.id(), pid, LockMode::Exclusive).unwrap();
        assert!(pool.holds_lock(tx.id(), pid));

        pool.release_page(tx.id(), pid);
        assert!(!pool.holds_lock(tx.id(), pid));
    }

    #[test]
    fn test_unknown_table() {
        let td = tempdir().unwrap();
        let db = test_db(&td, 256, 4);
        let tx = db.begin();

        assert!(matches!(
            db.buffer_pool()
                .get_page(tx.id(), PageId::new(42, 0), LockMode::Shared),
            Err(DbError::NoSuchTable(42))
        ));
        assert!(db.lock_manager().pages_locked_by(tx.id()).is_empty());
    }

    #[test]
    fn test_eviction_skips_dirty_pages() {
        init_logging();
        let td = tempdir().unwrap();
        let db = test_db(&td, 256, 2);
        let file = db.create_table("t", two_int_schema()).unwrap();
        let pool = db.buffer_pool();
        let tx = db.begin();

        // page 0 holds an uncommitted tuple
        pool.insert_tuple(tx.id(), file.id(), &mut tuple![1, 2])
            .unwrap();
        file.append_empty_page().unwrap();
        file.append_empty_page().unwrap();

        let other = db.begin();
        pool.get_page(other.id(), PageId::new(file.id(), 1), LockMode::Shared)
            .unwrap();
        // page 1 has to go, page 0 is dirty
        pool.get_page(other.id(), PageId::new(file.id(), 2), LockMode::Shared)
            .unwrap();
        assert_eq!(pool.num_cached(), 2);

        let page = pool
            .get_page(tx.id(), PageId::new(file.id(), 0), LockMode::Shared)
            .unwrap();
        assert_eq!(page::read(&page).tuples().len(), 1);
        assert!(page::read(&page).is_dirty());
    }

    #[test]
    fn test_full_of_dirty_or_pinned_pages() {
        let td = tempdir().unwrap();
        let db = test_db(&td, 256, 1);
        let file = db.create_table("t", two_int_schema()).unwrap();
        file.append_empty_page().unwrap();
        file.append_empty_page().unwrap();
        let pool = db.buffer_pool();
        let tx = db.begin();

        let pinned = pool
            .get_page(tx.id(), PageId::new(file.id(), 0), LockMode::Shared)
            .unwrap();
        assert!(matches!(
            pool.get_page(tx.id(), PageId::new(file.id(), 1), LockMode::Shared),
            Err(DbError::BufferPoolFull)
        ));
        drop(pinned);

        pool.insert_tuple(tx.id(), file.id(), &mut tuple![1, 1])
            .unwrap();
        assert!(matches!(
            pool.get_page(tx.id(), PageId::new(file.id(), 1), LockMode::Shared),
            Err(DbError::BufferPoolFull)
        ));
    }

    #[test]
    fn test_commit_writes_dirty_pages() {
        let td = tempdir().unwrap();
        let db = test_db(&td, 256, 4);
        let file = db.create_table("t", two_int_schema()).unwrap();
        let pool = db.buffer_pool();
        let tx = db.begin();

        let mut t = tuple![3, 4];
        pool.insert_tuple(tx.id(), file.id(), &mut t).unwrap();
        let pid = t.record_id().unwrap().page_id();
        assert!(file.read_page(pid).unwrap().tuples().is_empty());

        pool.transaction_complete(tx.id(), true).unwrap();
        assert_eq!(file.read_page(pid).unwrap().tuples(), vec![t]);
        assert!(pool.lock_manager().pages_locked_by(tx.id()).is_empty());
    }

    #[test]
    fn test_abort_discards_dirty_pages() {
        let td = tempdir().unwrap();
        let db = test_db(&td, 256, 4);
        let file = db.create_table("t", two_int_schema()).unwrap();
        let pool = db.buffer_pool();
        let tx = db.begin();

        let mut t = tuple![3, 4];
        pool.insert_tuple(tx.id(), file.id(), &mut t).unwrap();
        let pid = t.record_id().unwrap().page_id();
        assert_eq!(pool.num_cached(), 1);

        pool.transaction_complete(tx.id(), false).unwrap();
        assert_eq!(pool.num_cached(), 0);
        assert!(!pool.holds_lock(tx.id(), pid));

        let reader = db.begin();
        let page = pool.get_page(reader.id(), pid, LockMode::Shared).unwrap();
        assert!(page::read(&page).tuples().is_empty());
    }

    #[test]
    fn test_complete_without_locks() {
        let td = tempdir().unwrap();
        let db = test_db(&td, 256, 4);
        let tx = db.begin();

        db.buffer_pool().transaction_complete(tx.id(), true).unwrap();
        db.buffer_pool().transaction_complete(tx.id(), false).unwrap();
    }

    #[test]
    fn test_discard_page() {
        let td = tempdir().unwrap();
        let db = test_db(&td, 256, 4);
        let file = db.create_table("t", two_int_schema()).unwrap();
        let pool = db.buffer_pool();

        let mut t = tuple![5, 6];
        let tx = db.begin();
        pool.insert_tuple(tx.id(), file.id(), &mut t).unwrap();
        tx.commit().unwrap();
        let pid = t.record_id().unwrap().page_id();

        let tx = db.begin();
        pool.delete_tuple(tx.id(), &t).unwrap();
        pool.discard_page(pid);
        assert_eq!(pool.num_cached(), 0);

        // the delete never reached the disk
        let page = pool.get_page(tx.id(), pid, LockMode::Shared).unwrap();
        assert_eq!(page::read(&page).tuples(), vec![t]);
        assert!(!page::read(&page).is_dirty());
    }

    #[test]
    fn test_commit_leaves_other_transactions_pages_alone() {
        init_logging();
        let td = tempdir().unwrap();
        let db = test_db(&td, 256, 4);
        let a = db.create_table("a", two_int_schema()).unwrap();
        let b = db.create_table("b", two_int_schema()).unwrap();
        let pool = db.buffer_pool();

        let (t1, t2) = (db.begin(), db.begin());
        let mut uncommitted = tuple![9, 9];
        pool.insert_tuple(t1.id(), a.id(), &mut uncommitted).unwrap();
        pool.insert_tuple(t2.id(), b.id(), &mut tuple![1, 1]).unwrap();
        t2.commit().unwrap();

        let pid = uncommitted.record_id().unwrap().page_id();
        assert!(a.read_page(pid).unwrap().tuples().is_empty());
        assert_eq!(b.read_page(PageId::new(b.id(), 0)).unwrap().tuples().len(), 1);

        t1.abort().unwrap();
        let reader = db.begin();
        let page = pool.get_page(reader.id(), pid, LockMode::Shared).unwrap();
        assert!(page::read(&page).tuples().is_empty());
        assert!(a.read_page(pid).unwrap().tuples().is_empty());
    }
}
