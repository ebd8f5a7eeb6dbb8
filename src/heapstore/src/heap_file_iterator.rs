use std::{sync::Arc, vec};

use crate::{
    buffer_pool::BufferPool,
    error::DbResult,
    heap_file::HeapFile,
    lock_manager::LockMode,
    page,
    page_id::PageId,
    transaction::TransactionId,
    tuple::Tuple,
};

enum State {
    Unopened,
    Open {
        // the page to load once `tuples` runs dry
        next_page: u64,
        tuples: vec::IntoIter<Tuple>,
    },
    Closed,
}

/// A sequential scan over a heap file, in page then slot order.
///
/// Each page is read through the buffer pool under a shared lock held by the scanning
/// transaction. Closing the iterator does not give the locks back; they are released when the
/// transaction completes.
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
    tid: TransactionId,
    state: State,
}

fn load_page(
    file: &HeapFile,
    pool: &BufferPool,
    tid: TransactionId,
    page_num: u64,
) -> DbResult<vec::IntoIter<Tuple>> {
    let page = pool.get_page(tid, PageId::new(file.id(), page_num), LockMode::Shared)?;
    let tuples = page::read(&page).tuples();
    log::trace!(
        "{} scanning {} tuples of page {}",
        tid,
        tuples.len(),
        page_num
    );
    Ok(tuples.into_iter())
}

impl HeapFileIterator {
    pub fn new(file: Arc<HeapFile>, pool: Arc<BufferPool>, tid: TransactionId) -> Self {
        Self {
            file,
            pool,
            tid,
            state: State::Unopened,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open { .. })
    }

    /// Position the scan before the first tuple of the file.
    pub fn open(&mut self) -> DbResult<()> {
        let (next_page, tuples) = if self.file.page_count()? > 0 {
            (1, load_page(&self.file, &self.pool, self.tid, 0)?)
        } else {
            (0, Vec::new().into_iter())
        };
        self.state = State::Open { next_page, tuples };
        Ok(())
    }

    /// Get the next tuple, or `None` once every page has been read. An iterator that is not open
    /// yields nothing.
    pub fn read_next(&mut self) -> DbResult<Option<Tuple>> {
        let Self {
            file,
            pool,
            tid,
            state,
        } = self;
        let State::Open { next_page, tuples } = state else {
            return Ok(None);
        };

        loop {
            if let Some(t) = tuples.next() {
                return Ok(Some(t));
            }
            if *next_page >= file.page_count()? {
                return Ok(None);
            }
            *tuples = load_page(file, pool, *tid, *next_page)?;
            *next_page += 1;
        }
    }

    /// Start the scan over from the first page.
    pub fn rewind(&mut self) -> DbResult<()> {
        self.close();
        self.open()
    }

    pub fn close(&mut self) {
        self.state = State::Closed;
    }
}

impl Iterator for HeapFileIterator {
    type Item = DbResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if let State::Unopened = self.state {
            if let Err(e) = self.open() {
                self.close();
                return Some(Err(e));
            }
        }

        let res = self.read_next().transpose();
        if let Some(Err(_)) = res {
            self.close();
        }
        res
    }
}
