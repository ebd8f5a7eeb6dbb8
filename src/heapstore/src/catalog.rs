use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use crate::{
    error::{DbError, DbResult},
    heap_file::HeapFile,
    page_id::TableId,
    schema::Schema,
};

#[derive(Default)]
struct Tables {
    files: HashMap<TableId, Arc<HeapFile>>,
    names: HashMap<String, TableId>,
}

/// The registry of open tables. The buffer pool resolves a page id to the heap file that stores
/// it through the catalog.
#[derive(Default)]
pub struct Catalog {
    tables: RwLock<Tables>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a heap file under a table name. A table registered under the same name or backed
    /// by the same file is replaced.
    pub fn add_table(&self, name: &str, file: Arc<HeapFile>) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = tables.names.insert(name.to_string(), file.id()) {
            tables.files.remove(&old);
        }
        tables.names.retain(|n, id| n == name || *id != file.id());
        log::debug!("registered table '{}' with id {:x}", name, file.id());
        tables.files.insert(file.id(), file);
    }

    /// Get the heap file storing a table.
    pub fn file(&self, table_id: TableId) -> DbResult<Arc<HeapFile>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .files
            .get(&table_id)
            .cloned()
            .ok_or(DbError::NoSuchTable(table_id))
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .get(name)
            .copied()
    }

    pub fn schema(&self, table_id: TableId) -> DbResult<Arc<Schema>> {
        Ok(self.file(table_id)?.schema().clone())
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .files
            .keys()
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use crate::{error::DbError, heap_file::HeapFile, tests::test_utils::two_int_schema};

    use super::Catalog;

    #[test]
    fn test_lookup() {
        let td = tempdir().unwrap();
        let catalog = Catalog::new();
        let file = Arc::new(HeapFile::new(&td.path().join("a"), two_int_schema(), 4096).unwrap());
        catalog.add_table("a", file.clone());

        assert_eq!(catalog.table_id("a"), Some(file.id()));
        assert_eq!(catalog.file(file.id()).unwrap().path(), file.path());
        assert_eq!(*catalog.schema(file.id()).unwrap(), two_int_schema());
        assert!(matches!(
            catalog.file(file.id() ^ 1),
            Err(DbError::NoSuchTable(_))
        ));
    }

    #[test]
    fn test_replacing_a_name() {
        let td = tempdir().unwrap();
        let catalog = Catalog::new();
        let first = Arc::new(HeapFile::new(&td.path().join("a"), two_int_schema(), 4096).unwrap());
        let second = Arc::new(HeapFile::new(&td.path().join("b"), two_int_schema(), 4096).unwrap());

        catalog.add_table("t", first.clone());
        catalog.add_table("t", second.clone());

        assert_eq!(catalog.table_id("t"), Some(second.id()));
        assert!(catalog.file(first.id()).is_err());
        assert_eq!(catalog.table_ids(), vec![second.id()]);
    }
}
