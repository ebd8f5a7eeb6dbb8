use core::fmt;

/// Identifies a table. Derived from the absolute path of the table's heap file.
pub type TableId = u64;

// PageId points to a page's location on disk.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageId {
    table_id: TableId,
    page_num: u64,
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:x}/{}]", self.table_id, self.page_num)
    }
}

impl PageId {
    /// Create a new PageId
    ///
    /// # Arguments
    ///
    /// * `table_id` - The id of the table whose heap file stores the page
    /// * `page_num` - The index in the file where the page lives
    pub fn new(table_id: TableId, page_num: u64) -> Self {
        PageId { table_id, page_num }
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn page_num(&self) -> u64 {
        self.page_num
    }
}
