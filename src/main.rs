//! files-manager -- token-authenticated file and folder storage server.
//!
//! SIGTERM/SIGINT stop accepting connections and give in-flight requests
//! `server.shutdown_timeout` seconds to finish.

use std::future::IntoFuture;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use files_manager::config::{LoggingConfig, MetadataConfig, SessionsConfig, StorageConfig};
use files_manager::kv::memory::MemoryKeyValueStore;
use files_manager::kv::sqlite::SqliteKeyValueStore;
use files_manager::kv::store::KeyValueStore;
use files_manager::metadata::memory::MemoryMetadataStore;
use files_manager::metadata::sqlite::SqliteMetadataStore;
use files_manager::metadata::store::MetadataStore;
use files_manager::storage::backend::StorageBackend;
use files_manager::storage::local::LocalBackend;
use files_manager::storage::memory::MemoryBackend;
use files_manager::AppState;

/// Command-line arguments for the files-manager server.
#[derive(Parser, Debug)]
#[command(
    name = "files-manager",
    version,
    about = "Token-authenticated file and folder storage server"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "files-manager.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = files_manager::config::load_config(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;
    config.apply_env_overrides()?;

    init_tracing(&config.logging);
    info!("Loaded configuration from {}", cli.config);

    let bind_addr = cli
        .bind
        .clone()
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        files_manager::metrics::init_metrics()?;
        files_manager::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let metadata = build_metadata(&config.metadata)?;
    let sessions = build_sessions(&config.sessions)?;
    let storage = build_storage(&config.storage);

    spawn_session_purge(
        sessions.clone(),
        Duration::from_secs(config.auth.purge_interval_seconds),
    );

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let state = Arc::new(AppState::new(config, metadata, sessions, storage));
    let app = files_manager::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!("files-manager listening on {}", bind_addr);

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stop_tx.send(true);
        })
        .into_future();
    let deadline = async move {
        if stop_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(shutdown_timeout).await;
    };

    tokio::select! {
        result = server => result?,
        _ = deadline => warn!("In-flight requests still running after {:?}, exiting", shutdown_timeout),
    }

    info!("files-manager shut down");
    Ok(())
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Create the parent directory of a SQLite database file.
fn ensure_parent_dir(path: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

fn build_metadata(config: &MetadataConfig) -> anyhow::Result<Arc<dyn MetadataStore>> {
    match config.engine.as_str() {
        "memory" => {
            info!("In-memory metadata store initialized");
            Ok(Arc::new(MemoryMetadataStore::new()))
        }
        "sqlite" => {
            let path = &config.sqlite.path;
            ensure_parent_dir(path)?;
            let store = SqliteMetadataStore::new(path)?;
            info!("SQLite metadata store initialized at {}", path);
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("unknown metadata engine '{other}'"),
    }
}

fn build_sessions(config: &SessionsConfig) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match config.engine.as_str() {
        "memory" => {
            info!("In-memory session store initialized");
            Ok(Arc::new(MemoryKeyValueStore::new()))
        }
        "sqlite" => {
            let path = &config.sqlite.path;
            ensure_parent_dir(path)?;
            let store = SqliteKeyValueStore::new(path)?;
            info!("SQLite session store initialized at {}", path);
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("unknown sessions engine '{other}'"),
    }
}

fn build_storage(config: &StorageConfig) -> Arc<dyn StorageBackend> {
    match config.backend.as_str() {
        "memory" => {
            info!("In-memory storage backend initialized");
            Arc::new(MemoryBackend::new())
        }
        backend => {
            if backend != "local" {
                warn!("Unknown storage backend '{}', using local", backend);
            }
            // The root is created on first write.
            info!("Local storage backend rooted at {}", config.local.root_dir);
            Arc::new(LocalBackend::new(&config.local.root_dir))
        }
    }
}

/// Periodically drop expired sessions. Expired tokens already fail to
/// resolve, so this only reclaims space.
fn spawn_session_purge(sessions: Arc<dyn KeyValueStore>, every: Duration) {
    if every.is_zero() {
        return;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match sessions.purge_expired().await {
                Ok(0) => {}
                Ok(n) => debug!("Purged {} expired sessions", n),
                Err(e) => warn!("Session purge failed: {}", e),
            }
        }
    });
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
