use std::fmt::Display;

use crate::page_id::PageId;

/// Locates a tuple: the page holding it and the slot inside that page.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct RecordId {
    pid: PageId,
    slot: usize,
}

impl RecordId {
    pub fn new(pid: PageId, slot: usize) -> Self {
        Self { pid, slot }
    }

    pub fn page_id(&self) -> PageId {
        self.pid
    }

    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RID({},{})", self.pid, self.slot)
    }
}
