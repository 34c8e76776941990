//! Blob storage backends.
//!
//! The [`backend::StorageBackend`] trait abstracts over where file bytes
//! physically live.  [`local::LocalBackend`] writes one file per blob
//! under a root directory; [`memory::MemoryBackend`] keeps blobs in
//! process.

pub mod backend;
pub mod local;
pub mod memory;
