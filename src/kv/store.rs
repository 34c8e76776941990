//! Abstract key-value store trait.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Async key-value contract with per-entry time-to-live.
///
/// An entry is visible from `set` until `del` or until its TTL elapses,
/// whichever comes first.  Expired entries must never be returned, even
/// if they have not been physically removed yet.
pub trait KeyValueStore: Send + Sync + 'static {
    /// Cheap liveness probe.
    fn ping(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Get the live value stored under `key`.
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<String>>> + Send + '_>>;

    /// Store `value` under `key`, replacing any previous entry, expiring
    /// after `ttl`.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Remove `key`.  Returns whether a live entry was removed.
    fn del(&self, key: &str) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>>;

    /// Physically remove expired entries.  Returns how many were removed.
    fn purge_expired(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>>;
}
