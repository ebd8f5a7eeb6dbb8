use std::collections::VecDeque;

use crate::page_id::PageId;

pub trait EvictionPolicy: Send {
    /// Record that a cached page was used.
    fn touch(&mut self, pid: PageId);

    /// Stop tracking a page (e.g. the page was dropped from the cache.)
    fn remove(&mut self, pid: PageId);

    /// Identify a page to evict. Only pages accepted by `evictable` are chosen; the chosen page is
    /// no longer tracked.
    fn evict(&mut self, evictable: &dyn Fn(&PageId) -> bool) -> Option<PageId>;
}

/// Evicts the least recently used page that is allowed to go.
#[derive(Debug, Default)]
pub struct LruEvictionPolicy {
    // least recently used at the front
    pages: VecDeque<PageId>,
}

impl LruEvictionPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvictionPolicy for LruEvictionPolicy {
    fn touch(&mut self, pid: PageId) {
        self.remove(pid);
        self.pages.push_back(pid);
    }

    fn remove(&mut self, pid: PageId) {
        if let Some(i) = self.pages.iter().position(|p| *p == pid) {
            self.pages.remove(i);
        }
    }

    fn evict(&mut self, evictable: &dyn Fn(&PageId) -> bool) -> Option<PageId> {
        let i = self.pages.iter().position(|p| evictable(p))?;
        self.pages.remove(i)
    }
}
