use std::{fmt, io};

use crate::{page_id::PageId, page_id::TableId, transaction::TransactionId};

#[derive(Debug)]
pub enum DbError {
    /// A read or write against a heap file failed.
    Io(io::Error),
    /// A page id was handed to a heap file that does not own its table.
    TableMismatch { expected: TableId, actual: TableId },
    /// No heap file is registered for the table.
    NoSuchTable(TableId),
    /// A tuple does not match the schema of the table it was written to.
    SchemaMismatch(String),
    /// The tuple carries no record id, so its page cannot be located.
    MissingRecordId,
    /// The slot named by a record id holds no live tuple.
    TupleNotFound { pid: PageId, slot: usize },
    /// A page buffer does not have the page size of the file it is written to.
    PageSizeMismatch {
        pid: PageId,
        expected: usize,
        actual: usize,
    },
    /// Every slot in the page is in use.
    PageFull(PageId),
    /// Every cached page is pinned or dirty and nothing can be evicted.
    BufferPoolFull,
    /// A wait-for cycle was found while the transaction waited on a page.
    Deadlock { tid: TransactionId, pid: PageId },
    /// The transaction gave up waiting for a lock.
    TransactionAborted(TransactionId),
    Serialization(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Io(e) => write!(f, "i/o error: {e}"),
            DbError::TableMismatch { expected, actual } => write!(
                f,
                "page belongs to table {actual} but was sent to table {expected}"
            ),
            DbError::NoSuchTable(id) => write!(f, "no table registered with id {id}"),
            DbError::SchemaMismatch(msg) => write!(f, "schema mismatch: {msg}"),
            DbError::MissingRecordId => write!(f, "tuple has no record id"),
            DbError::TupleNotFound { pid, slot } => {
                write!(f, "no tuple stored at slot {slot} of page {pid}")
            }
            DbError::PageSizeMismatch {
                pid,
                expected,
                actual,
            } => write!(
                f,
                "page {pid} holds {actual} bytes but its file uses {expected} byte pages"
            ),
            DbError::PageFull(pid) => write!(f, "page {pid} has no empty slots"),
            DbError::BufferPoolFull => {
                write!(f, "buffer pool is full and every page is pinned or dirty")
            }
            DbError::Deadlock { tid, pid } => {
                write!(f, "deadlock detected while {tid} waited on page {pid}")
            }
            DbError::TransactionAborted(tid) => {
                write!(f, "{tid} aborted after waiting too long for a lock")
            }
            DbError::Serialization(msg) => write!(f, "serialization error: {msg}"),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DbError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DbError {
    fn from(e: io::Error) -> Self {
        DbError::Io(e)
    }
}

impl From<bincode::Error> for DbError {
    fn from(e: bincode::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl DbError {
    /// Whether the error means the transaction must be aborted rather than the operation retried.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            DbError::Deadlock { .. } | DbError::TransactionAborted(_)
        )
    }
}
