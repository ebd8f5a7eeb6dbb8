use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use xxhash_rust::xxh3::xxh3_64;

use crate::{
    buffer_pool::BufferPool,
    error::{DbError, DbResult},
    heap_file_iterator::HeapFileIterator,
    lock_manager::LockMode,
    page::{self, HeapPage, PageRef},
    page_id::{PageId, TableId},
    schema::Schema,
    transaction::TransactionId,
    tuple::Tuple,
};

/// The pages of one table, stored back to back in a single file.
///
/// Page `n` occupies bytes `[n * page_size, (n + 1) * page_size)`. There is no file header, the
/// number of pages is the file length divided by the page size.
pub struct HeapFile {
    id: TableId,
    path: PathBuf,
    file: Mutex<File>,
    schema: Arc<Schema>,
    page_size: usize,
}

impl std::fmt::Debug for HeapFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapFile")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("schema", &self.schema)
            .finish()
    }
}

impl HeapFile {
    /// Open (creating it if needed) the heap file at `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - The file that backs the table.
    /// * `schema` - The schema of the tuples stored in the table.
    /// * `page_size` - Size in bytes of each page.
    pub fn new(path: &Path, schema: Schema, page_size: usize) -> DbResult<Self> {
        if HeapPage::slots_per_page(page_size, &schema) == 0 {
            return Err(DbError::SchemaMismatch(format!(
                "tuples of {} bytes do not fit in a page of {} bytes",
                schema.tuple_size(),
                page_size
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let path = fs::canonicalize(path)?;
        let id = Self::table_id_for(&path);

        log::debug!("opened heap file {} as table {:x}", path.display(), id);

        Ok(Self {
            id,
            path,
            file: Mutex::new(file),
            schema: Arc::new(schema),
            page_size,
        })
    }

    /// The table id of a heap file stored at the given absolute path.
    pub fn table_id_for(path: &Path) -> TableId {
        xxh3_64(path.to_string_lossy().as_bytes())
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn offset(&self, pid: &PageId) -> u64 {
        pid.page_num() * self.page_size as u64
    }

    fn check_table(&self, pid: &PageId) -> DbResult<()> {
        if pid.table_id() != self.id {
            return Err(DbError::TableMismatch {
                expected: self.id,
                actual: pid.table_id(),
            });
        }
        Ok(())
    }

    /// Get the number of pages in the file.
    pub fn page_count(&self) -> DbResult<u64> {
        let len = self.file().metadata()?.len();
        Ok(len / self.page_size as u64)
    }

    /// Read a page from disk.
    pub fn read_page(&self, pid: PageId) -> DbResult<HeapPage> {
        self.check_table(&pid)?;

        let mut data = HeapPage::empty_page_data(self.page_size);
        {
            let mut file = self.file();
            file.seek(SeekFrom::Start(self.offset(&pid)))?;
            file.read_exact(&mut data)?;
        }

        log::trace!("read page {} from {}", pid, self.path.display());
        Ok(HeapPage::new(pid, self.schema.clone(), data))
    }

    /// Write a page to disk, overwriting what is stored at its position.
    pub fn write_page(&self, page: &HeapPage) -> DbResult<()> {
        let pid = page.id();
        self.check_table(&pid)?;
        if page.to_bytes().len() != self.page_size {
            return Err(DbError::PageSizeMismatch {
                pid,
                expected: self.page_size,
                actual: page.to_bytes().len(),
            });
        }

        let mut file = self.file();
        file.seek(SeekFrom::Start(self.offset(&pid)))?;
        file.write_all(page.to_bytes())?;
        file.flush()?;
        file.sync_data()?;

        log::trace!("wrote page {} to {}", pid, self.path.display());
        Ok(())
    }

    /// Append an empty page to the end of the file and return its id.
    ///
    /// The file lock is held from measuring the file to writing the page, so concurrent callers
    /// always append distinct pages.
    pub fn append_empty_page(&self) -> DbResult<PageId> {
        let mut file = self.file();
        let page_num = file.metadata()?.len() / self.page_size as u64;
        let pid = PageId::new(self.id, page_num);

        file.seek(SeekFrom::Start(self.offset(&pid)))?;
        file.write_all(&HeapPage::empty_page_data(self.page_size))?;
        file.sync_all()?;

        log::debug!("appended page {} to {}", pid, self.path.display());
        Ok(pid)
    }

    /// Insert a tuple into the first page with an empty slot, appending a page if every page is
    /// full. The tuple's record id is set to where it was stored.
    ///
    /// Pages are checked for room under a shared lock and only the page that is written to is
    /// locked exclusively. The page is checked again once the exclusive lock is held since another
    /// transaction may have filled it in between.
    ///
    /// Returns the pages that were modified.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> DbResult<Vec<PageRef>> {
        self.schema.check_values(tuple.values())?;

        for page_num in 0..self.page_count()? {
            let pid = PageId::new(self.id, page_num);

            let has_room = {
                let page = pool.get_page(tid, pid, LockMode::Shared)?;
                let has_room = page::read(&page).num_empty_slots() > 0;
                has_room
            };
            if !has_room {
                continue;
            }

            let page = pool.get_page(tid, pid, LockMode::Exclusive)?;
            {
                let mut locked = page::write(&page);
                if locked.num_empty_slots() == 0 {
                    continue;
                }
                locked.insert_tuple(tuple)?;
            }
            return Ok(vec![page]);
        }

        let pid = self.append_empty_page()?;
        let page = pool.get_page(tid, pid, LockMode::Exclusive)?;
        page::write(&page).insert_tuple(tuple)?;
        Ok(vec![page])
    }

    /// Remove a tuple from the page its record id points to.
    ///
    /// Returns the pages that were modified.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> DbResult<Vec<PageRef>> {
        let rid = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        let pid = rid.page_id();
        self.check_table(&pid)?;
        if pid.page_num() >= self.page_count()? {
            return Err(DbError::TupleNotFound {
                pid,
                slot: rid.slot(),
            });
        }

        let page = pool.get_page(tid, pid, LockMode::Exclusive)?;
        page::write(&page).delete_tuple(tuple)?;
        Ok(vec![page])
    }

    /// Get a sequential scan over the tuples of this file, read on behalf of `tid`.
    pub fn iterator(self: &Arc<Self>, pool: Arc<BufferPool>, tid: TransactionId) -> HeapFileIterator {
        HeapFileIterator::new(self.clone(), pool, tid)
    }
}
