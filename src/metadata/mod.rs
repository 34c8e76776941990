//! Metadata storage layer.
//!
//! The metadata store keeps the users and files collections.  The
//! [`store::MetadataStore`] trait defines the interface;
//! [`sqlite::SqliteMetadataStore`] is the default implementation and
//! [`memory::MemoryMetadataStore`] backs tests and ephemeral runs.

pub mod memory;
pub mod sqlite;
pub mod store;
