use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    error::{DbError, DbResult},
    page_id::PageId,
    record_id::RecordId,
    schema::Schema,
    transaction::TransactionId,
    tuple::Tuple,
};

/// A cached page shared between the buffer pool and its callers.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Take a read lock on a cached page.
pub fn read(page: &PageRef) -> RwLockReadGuard<'_, HeapPage> {
    page.read().unwrap_or_else(PoisonError::into_inner)
}

/// Take a write lock on a cached page.
pub fn write(page: &PageRef) -> RwLockWriteGuard<'_, HeapPage> {
    page.write().unwrap_or_else(PoisonError::into_inner)
}

/// A page of a heap file that has been pulled into memory.
///
/// The page starts with a header bitmap holding one bit per slot (bit `i % 8` of byte `i / 8`
/// is set when slot `i` holds a tuple). The slots follow the header, each `tuple_size` bytes
/// wide. Bytes after the last slot are unused and left zeroed.
#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: PageId,
    schema: Arc<Schema>,
    data: Vec<u8>,
    num_slots: usize,
    header_size: usize,
    dirtied_by: Option<TransactionId>,
}

impl HeapPage {
    /// Create a page from its on-disk bytes.
    ///
    /// # Arguments
    ///
    /// * `pid` - The id of the page.
    /// * `schema` - The schema of the tuples stored in the page.
    /// * `data` - The page's bytes. The length of the buffer is the page size.
    pub fn new(pid: PageId, schema: Arc<Schema>, data: Vec<u8>) -> Self {
        let num_slots = Self::slots_per_page(data.len(), &schema);
        Self {
            pid,
            schema,
            num_slots,
            header_size: num_slots.div_ceil(8),
            data,
            dirtied_by: None,
        }
    }

    /// The bytes of a page with every slot empty.
    pub fn empty_page_data(page_size: usize) -> Vec<u8> {
        vec![0; page_size]
    }

    /// Number of tuples that fit in one page: each tuple needs `tuple_size` bytes plus one header
    /// bit.
    pub fn slots_per_page(page_size: usize, schema: &Schema) -> usize {
        (page_size * 8) / (schema.tuple_size() * 8 + 1)
    }

    pub fn id(&self) -> PageId {
        self.pid
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots).filter(|s| !self.is_slot_used(*s)).count()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.num_slots && self.data[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot_used(&mut self, slot: usize, used: bool) {
        if used {
            self.data[slot / 8] |= 1 << (slot % 8);
        } else {
            self.data[slot / 8] &= !(1 << (slot % 8));
        }
    }

    // get the range in the page holding the specified slot.
    fn slot_range(&self, slot: usize) -> std::ops::Range<usize> {
        let tuple_size = self.schema.tuple_size();
        let start = self.header_size + slot * tuple_size;
        start..start + tuple_size
    }

    /// Store a tuple in the first empty slot and set the tuple's record id to that slot.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> DbResult<RecordId> {
        self.schema.check_values(tuple.values())?;

        let slot = (0..self.num_slots)
            .find(|s| !self.is_slot_used(*s))
            .ok_or(DbError::PageFull(self.pid))?;

        let range = self.slot_range(slot);
        tuple.write_to(&self.schema, &mut self.data[range]);
        self.set_slot_used(slot, true);

        let rid = RecordId::new(self.pid, slot);
        tuple.set_record_id(Some(rid));
        log::trace!("inserted tuple into {}", rid);
        Ok(rid)
    }

    /// Mark the slot named by the tuple's record id as empty.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> DbResult<()> {
        let rid = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        if rid.page_id() != self.pid || !self.is_slot_used(rid.slot()) {
            return Err(DbError::TupleNotFound {
                pid: rid.page_id(),
                slot: rid.slot(),
            });
        }

        let range = self.slot_range(rid.slot());
        self.data[range].fill(0);
        self.set_slot_used(rid.slot(), false);
        log::trace!("deleted tuple at {}", rid);
        Ok(())
    }

    /// Get the tuple stored in a slot, if the slot is in use.
    pub fn tuple(&self, slot: usize) -> Option<Tuple> {
        if !self.is_slot_used(slot) {
            return None;
        }

        let mut tuple = Tuple::read_from(&self.schema, &self.data[self.slot_range(slot)]);
        tuple.set_record_id(Some(RecordId::new(self.pid, slot)));
        Some(tuple)
    }

    /// Copies of every live tuple, in slot order.
    pub fn tuples(&self) -> Vec<Tuple> {
        (0..self.num_slots).filter_map(|s| self.tuple(s)).collect()
    }

    pub fn to_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Record that a transaction changed the page, or clear the marker with `None` once the page
    /// matches what is on disk.
    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirtied_by = tid;
    }

    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtied_by.is_some()
    }
}
