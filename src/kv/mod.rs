//! Key-value storage with per-entry expiry.
//!
//! Session tokens live here.  The [`store::KeyValueStore`] trait defines
//! the interface; [`sqlite::SqliteKeyValueStore`] persists entries across
//! restarts and [`memory::MemoryKeyValueStore`] keeps them in process.

pub mod memory;
pub mod sqlite;
pub mod store;
