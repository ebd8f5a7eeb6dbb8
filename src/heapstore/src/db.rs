use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    buffer_pool::BufferPool, catalog::Catalog, config::DbConfig, error::DbResult,
    heap_file::HeapFile, lock_manager::LockManager, schema::Schema, transaction::Transaction,
};

/// One database session: the tables it knows about, the shared lock table and the buffer pool
/// every transaction reads pages through.
pub struct Database {
    data_dir: PathBuf,
    config: DbConfig,
    catalog: Arc<Catalog>,
    lock_manager: Arc<LockManager>,
    buffer_pool: Arc<BufferPool>,
}

impl Database {
    /// Open a database storing its tables under `data_dir`, creating the directory if needed.
    pub fn new(data_dir: &Path, config: DbConfig) -> DbResult<Self> {
        fs::create_dir_all(data_dir)?;

        let catalog = Arc::new(Catalog::new());
        let lock_manager = Arc::new(LockManager::new());
        let buffer_pool = Arc::new(BufferPool::new(
            config.buffer_pool_pages,
            lock_manager.clone(),
            catalog.clone(),
            config.lock_retry.clone(),
        ));

        log::debug!(
            "opened database in {} with {} byte pages and {} buffers",
            data_dir.display(),
            config.page_size,
            config.buffer_pool_pages
        );

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config,
            catalog,
            lock_manager,
            buffer_pool,
        })
    }

    /// Create (or reopen) the table `name`, stored in the data directory.
    pub fn create_table(&self, name: &str, schema: Schema) -> DbResult<Arc<HeapFile>> {
        let path = self.data_dir.join(format!("{name}.dat"));
        self.open_table(&path, name, schema)
    }

    /// Register the heap file at `path` as the table `name`.
    pub fn open_table(&self, path: &Path, name: &str, schema: Schema) -> DbResult<Arc<HeapFile>> {
        let file = Arc::new(HeapFile::new(path, schema, self.config.page_size)?);
        self.catalog.add_table(name, file.clone());
        Ok(file)
    }

    pub fn begin(&self) -> Transaction {
        Transaction::new(self.buffer_pool.clone())
    }

    pub fn buffer_pool(&self) -> Arc<BufferPool> {
        self.buffer_pool.clone()
    }

    pub fn lock_manager(&self) -> Arc<LockManager> {
        self.lock_manager.clone()
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.clone()
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }
}
