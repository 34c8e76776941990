//! Abstract storage backend trait.
//!
//! Every storage backend must implement [`StorageBackend`].  Blobs are
//! opaque byte strings stored under a caller-chosen name; the backend
//! answers with a locator that is recorded in the file's metadata and
//! used for every later access.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::pin::Pin;

/// A stored blob's data plus its content hash.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Raw bytes of the blob.
    pub data: Bytes,
    /// Hex-encoded SHA-256 of `data`.
    pub content_hash: String,
}

impl StoredObject {
    pub fn new(data: Bytes) -> Self {
        let content_hash = hex::encode(Sha256::digest(&data));
        Self { data, content_hash }
    }
}

/// Async blob storage contract.
pub trait StorageBackend: Send + Sync + 'static {
    /// Write `data` as a new blob called `name`, creating the storage root
    /// if needed.  Returns the blob's locator.
    fn put(
        &self,
        name: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>>;

    /// Read the blob at `locator`.  `None` if it does not exist.
    fn get(
        &self,
        locator: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredObject>>> + Send + '_>>;

    /// Delete the blob at `locator`.  Deleting a missing blob is not an error.
    fn delete(
        &self,
        locator: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Check whether a blob exists at `locator`.
    fn exists(
        &self,
        locator: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>>;
}
