//! In-memory key-value store.
//!
//! Entries live in a `Mutex<HashMap>` and carry an `Instant` deadline.
//! Expired entries are dropped lazily on read and in bulk by
//! [`KeyValueStore::purge_expired`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::store::KeyValueStore;

#[derive(Debug)]
struct Entry {
    value: String,
    /// `None` when the deadline is past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("key-value lock poisoned"))
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn ping(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.lock()?;
            Ok(())
        })
    }

    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<String>>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut entries = self.lock()?;
            let now = Instant::now();
            match entries.get(&key) {
                Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
                Some(_) => {
                    entries.remove(&key);
                    Ok(None)
                }
                None => Ok(None),
            }
        })
    }

    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let key = key.to_string();
        let entry = Entry {
            value: value.to_string(),
            expires_at: Instant::now().checked_add(ttl),
        };
        Box::pin(async move {
            self.lock()?.insert(key, entry);
            Ok(())
        })
    }

    fn del(&self, key: &str) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let removed = self.lock()?.remove(&key);
            Ok(removed.is_some_and(|e| e.is_live(Instant::now())))
        })
    }

    fn purge_expired(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>> {
        Box::pin(async move {
            let mut entries = self.lock()?;
            let now = Instant::now();
            let before = entries.len();
            entries.retain(|_, entry| entry.is_live(now));
            Ok((before - entries.len()) as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[tokio::test]
    async fn test_set_get_del() {
        let store = MemoryKeyValueStore::new();
        store.set("auth_t1", "user-1", DAY).await.unwrap();
        assert_eq!(store.get("auth_t1").await.unwrap().as_deref(), Some("user-1"));
        assert_eq!(store.get("auth_t1").await.unwrap().as_deref(), Some("user-1"));

        assert!(store.del("auth_t1").await.unwrap());
        assert!(store.get("auth_t1").await.unwrap().is_none());
        assert!(!store.del("auth_t1").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent() {
        let store = MemoryKeyValueStore::new();
        store.set("k", "v", Duration::ZERO).await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
        assert!(!store.del("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let store = MemoryKeyValueStore::new();
        store.set("k", "v", Duration::from_millis(30)).await.unwrap();
        assert!(store.get("k").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_replaces_value() {
        let store = MemoryKeyValueStore::new();
        store.set("k", "a", DAY).await.unwrap();
        store.set("k", "b", DAY).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryKeyValueStore::new();
        store.set("live", "1", DAY).await.unwrap();
        store.set("dead-1", "2", Duration::ZERO).await.unwrap();
        store.set("dead-2", "3", Duration::ZERO).await.unwrap();
        assert_eq!(store.purge_expired().await.unwrap(), 2);
        assert_eq!(store.get("live").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow() {
        let store = MemoryKeyValueStore::new();
        store.set("k", "v", Duration::MAX).await.unwrap();
        assert!(store.get("k").await.unwrap().is_some());
        assert_eq!(store.purge_expired().await.unwrap(), 0);
        assert!(store.del("k").await.unwrap());
    }
}
