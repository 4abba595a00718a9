//! Persistence layer: the key/value record store and its backends.

pub mod db;
pub mod memory;
pub mod migration;
pub mod record_store;
pub mod schema;

pub use memory::MemoryRecordStore;
pub use record_store::{RecordStore, SqliteRecordStore};
