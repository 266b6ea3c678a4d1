//! Durable storage: key-value capability and its backends

pub mod database;
pub mod kv;
pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use database::{Database, DatabaseError};
pub use kv::{KeyValueStore, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
