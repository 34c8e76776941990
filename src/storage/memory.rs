//! In-memory storage backend.
//!
//! Blobs are held in a `tokio::sync::RwLock<HashMap<...>>` keyed by their
//! locator (`memory://<name>`).  Nothing survives a restart.

use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use super::backend::{StorageBackend, StoredObject};

const SCHEME: &str = "memory://";

#[derive(Default)]
pub struct MemoryBackend {
    blobs: tokio::sync::RwLock<HashMap<String, Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl StorageBackend for MemoryBackend {
    fn put(
        &self,
        name: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let locator = format!("{SCHEME}{name}");
        Box::pin(async move {
            if name_is_invalid(&locator) {
                anyhow::bail!("Invalid blob name: {locator}");
            }
            self.blobs.write().await.insert(locator.clone(), data);
            Ok(locator)
        })
    }

    fn get(
        &self,
        locator: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredObject>>> + Send + '_>> {
        let locator = locator.to_string();
        Box::pin(async move {
            let blobs = self.blobs.read().await;
            Ok(blobs.get(&locator).cloned().map(StoredObject::new))
        })
    }

    fn delete(
        &self,
        locator: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let locator = locator.to_string();
        Box::pin(async move {
            self.blobs.write().await.remove(&locator);
            Ok(())
        })
    }

    fn exists(
        &self,
        locator: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let locator = locator.to_string();
        Box::pin(async move { Ok(self.blobs.read().await.contains_key(&locator)) })
    }
}

fn name_is_invalid(locator: &str) -> bool {
    let name = &locator[SCHEME.len()..];
    name.is_empty() || name.contains('/')
}
