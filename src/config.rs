//! Configuration loading and types.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: networking, sessions, metadata persistence, blob storage,
//! logging and observability.  A handful of environment variables are
//! applied on top of the file (see [`Config::apply_env_overrides`]).

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication / session settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Metadata (users + files) store settings.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Session key-value store settings.
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Blob storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings (metrics + API docs).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Maximum request body size in bytes. Uploads arrive base64-encoded
    /// inside JSON, so this bounds the encoded size.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
            max_body_size: default_max_body_size(),
        }
    }
}

/// Session settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of a session token in seconds (default 24 hours).
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: u64,

    /// How often expired sessions are swept from the store, in seconds.
    /// Zero disables the sweep; expired tokens never resolve either way.
    #[serde(default = "default_purge_interval")]
    pub purge_interval_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: default_session_ttl(),
            purge_interval_seconds: default_purge_interval(),
        }
    }
}

/// Metadata store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// Backend type: `sqlite` or `memory`.
    #[serde(default = "default_sqlite_engine")]
    pub engine: String,

    /// SQLite-specific configuration.
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            engine: default_sqlite_engine(),
            sqlite: SqliteConfig::default(),
        }
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Backend type: `sqlite` or `memory`.
    #[serde(default = "default_sqlite_engine")]
    pub engine: String,

    /// SQLite-specific configuration.
    #[serde(default = "default_sessions_sqlite")]
    pub sqlite: SqliteConfig,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            engine: default_sqlite_engine(),
            sqlite: default_sessions_sqlite(),
        }
    }
}

/// SQLite database file location.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_metadata_path")]
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
        }
    }
}

/// Blob storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `local` or `memory`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Local storage configuration.
    #[serde(default)]
    pub local: LocalStorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            local: LocalStorageConfig::default(),
        }
    }
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    /// Root directory for stored blobs.
    #[serde(default = "default_storage_root")]
    pub root_dir: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings. Both are enabled by default.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Serve Swagger UI at `/docs` and the OpenAPI document at `/openapi.json`.
    #[serde(default = "default_true")]
    pub api_docs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            api_docs: true,
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_body_size() -> usize {
    64 * 1024 * 1024
}

fn default_session_ttl() -> u64 {
    24 * 60 * 60
}

fn default_purge_interval() -> u64 {
    300
}

fn default_sqlite_engine() -> String {
    "sqlite".to_string()
}

fn default_metadata_path() -> String {
    "./data/files_manager.db".to_string()
}

fn default_sessions_sqlite() -> SqliteConfig {
    SqliteConfig {
        path: "./data/sessions.db".to_string(),
    }
}

fn default_storage_backend() -> String {
    "local".to_string()
}

fn default_storage_root() -> String {
    "/tmp/files_manager".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Environment overrides ---------------------------------------------------

impl Config {
    /// Apply environment overrides on top of file-based settings.
    ///
    /// - `PORT` sets the listen port.
    /// - `FOLDER_PATH` sets the local blob root.
    /// - `DB_DATABASE` names the metadata database; the file keeps the
    ///   directory of the configured path and becomes `<name>.db`.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").filter(|v| !v.is_empty()) {
            self.server.port = port
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid PORT value '{port}': {e}"))?;
        }
        if let Some(root) = lookup("FOLDER_PATH").filter(|v| !v.is_empty()) {
            self.storage.local.root_dir = root;
        }
        if let Some(name) = lookup("DB_DATABASE").filter(|v| !v.is_empty()) {
            let dir = Path::new(&self.metadata.sqlite.path)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            self.metadata.sqlite.path = dir.join(format!("{name}.db")).to_string_lossy().into_owned();
        }
        Ok(())
    }
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
///
/// A missing file yields the defaults; a present but malformed file is an
/// error.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.auth.session_ttl_seconds, 86_400);
        assert_eq!(config.auth.purge_interval_seconds, 300);
        assert_eq!(config.metadata.engine, "sqlite");
        assert_eq!(config.sessions.sqlite.path, "./data/sessions.db");
        assert_eq!(config.storage.local.root_dir, "/tmp/files_manager");
        assert!(config.observability.metrics);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "server:\n  port: 8080\nstorage:\n  backend: memory\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.storage.local.root_dir, "/tmp/files_manager");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config("/nonexistent/files-manager.yaml").unwrap();
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "auth:\n  session_ttl_seconds: 60\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.auth.session_ttl_seconds, 60);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "7000"),
            ("FOLDER_PATH", "/srv/blobs"),
            ("DB_DATABASE", "files_test"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.storage.local.root_dir, "/srv/blobs");
        assert_eq!(
            Path::new(&config.metadata.sqlite.path),
            Path::new("./data/files_test.db")
        );
    }

    #[test]
    fn test_invalid_port_override_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_overrides(|name| (name == "PORT").then(|| "abc".to_string()));
        assert!(result.is_err());
    }
}
