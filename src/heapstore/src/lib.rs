#[cfg(test)]
mod tests;

pub mod schema;
pub mod tuple;

pub mod buffer_pool;
pub mod catalog;
pub mod concurrency_manager;
pub mod config;
pub mod db;
pub mod error;
pub mod eviction_policy;
pub mod heap_file;
pub mod heap_file_iterator;
pub mod lock_manager;
pub mod page;
pub mod page_id;
pub mod record_id;
pub mod transaction;

pub use buffer_pool::BufferPool;
pub use config::{DbConfig, LockRetryConfig};
pub use db::Database;
pub use error::{DbError, DbResult};
pub use heap_file::HeapFile;
pub use heap_file_iterator::HeapFileIterator;
pub use lock_manager::{LockManager, LockMode};
pub use page_id::{PageId, TableId};
pub use record_id::RecordId;
pub use schema::Schema;
pub use transaction::{Transaction, TransactionId};
pub use tuple::{Tuple, Value};
