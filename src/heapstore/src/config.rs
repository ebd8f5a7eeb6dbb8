use std::time::Duration;

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_BUFFER_POOL_PAGES: usize = 50;

const DEFAULT_LOCK_BACKOFF_MS: u64 = 10;
// 1000 attempts at 10ms each gives a transaction roughly 10s to get a lock.
const DEFAULT_LOCK_ATTEMPTS: u32 = 1000;

/// How a transaction waits for a page lock that was denied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockRetryConfig {
    /// Sleep between two attempts.
    pub backoff: Duration,
    /// Attempts before the transaction is aborted. `None` keeps retrying until a deadlock is
    /// detected.
    pub max_attempts: Option<u32>,
}

impl Default for LockRetryConfig {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(DEFAULT_LOCK_BACKOFF_MS),
            max_attempts: Some(DEFAULT_LOCK_ATTEMPTS),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DbConfig {
    /// Size in bytes of every page of every table.
    pub page_size: usize,
    /// Number of pages the buffer pool keeps resident.
    pub buffer_pool_pages: usize,
    pub lock_retry: LockRetryConfig,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pool_pages: DEFAULT_BUFFER_POOL_PAGES,
            lock_retry: LockRetryConfig::default(),
        }
    }
}

impl DbConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_buffer_pool_pages(mut self, pages: usize) -> Self {
        self.buffer_pool_pages = pages;
        self
    }

    pub fn with_lock_retry(mut self, lock_retry: LockRetryConfig) -> Self {
        self.lock_retry = lock_retry;
        self
    }
}
