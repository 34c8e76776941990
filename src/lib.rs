//! files-manager library: token-authenticated file and folder storage.
//!
//! This crate provides the components for running the service: request
//! handling, session authentication, the metadata store for users and
//! files, the session key-value store, and pluggable blob storage.

use std::sync::Arc;
use std::time::Duration;

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod kv;
pub mod metadata;
pub mod metrics;
pub mod server;
pub mod storage;

use crate::config::Config;
use crate::kv::store::KeyValueStore;
use crate::metadata::store::MetadataStore;
use crate::storage::backend::StorageBackend;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Users and files collections.
    pub metadata: Arc<dyn MetadataStore>,
    /// Session tokens with expiry.
    pub sessions: Arc<dyn KeyValueStore>,
    /// Blob storage for file contents.
    pub storage: Arc<dyn StorageBackend>,
}

impl AppState {
    pub fn new(
        config: Config,
        metadata: Arc<dyn MetadataStore>,
        sessions: Arc<dyn KeyValueStore>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        Self {
            config,
            metadata,
            sessions,
            storage,
        }
    }

    /// How long a freshly issued session token stays valid.
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.config.auth.session_ttl_seconds)
    }
}
