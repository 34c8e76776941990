//! Local filesystem storage backend.
//!
//! Blobs are stored as flat files directly under a configurable root
//! directory.  The locator is the blob's full path, which is what file
//! records expose as `localPath`.
//!
//! All writes follow crash-only design: write to temp file, fsync, rename.

use bytes::Bytes;
use std::future::Future;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use super::backend::{StorageBackend, StoredObject};

const TMP_DIR: &str = ".tmp";

/// Stores blobs on the local filesystem.
pub struct LocalBackend {
    /// Root directory for all stored blobs.
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new `LocalBackend` rooted at `root`.
    ///
    /// Nothing is created on disk until the first write, so a root that
    /// disappears at runtime is recreated on demand.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path for a new blob called `name`.
    ///
    /// Names must be a single plain path component.
    fn blob_path(&self, name: &str) -> anyhow::Result<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) if part != TMP_DIR => Ok(self.root.join(part)),
            _ => anyhow::bail!("Invalid blob name: {name}"),
        }
    }

    /// Map a locator back to a path, rejecting anything outside the root.
    fn resolve(&self, locator: &str) -> anyhow::Result<PathBuf> {
        let path = Path::new(locator);
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            anyhow::bail!("Path traversal detected in locator: {locator}");
        }
        let name = path
            .strip_prefix(&self.root)
            .map_err(|_| anyhow::anyhow!("Locator outside storage root: {locator}"))?;
        self.blob_path(&name.to_string_lossy())
    }

    /// Generate a temp file path under .tmp/ for atomic writes.
    fn temp_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        self.root.join(TMP_DIR).join(format!("tmp-{id}"))
    }
}

impl StorageBackend for LocalBackend {
    fn put(
        &self,
        name: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            let final_path = self.blob_path(&name)?;

            // Creates the root as well when it is missing.
            let tmp_path = self.temp_path();
            if let Some(parent) = tmp_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;

            if let Err(e) = std::fs::rename(&tmp_path, &final_path) {
                let _ = std::fs::remove_file(&tmp_path);
                return Err(e.into());
            }

            Ok(final_path.to_string_lossy().into_owned())
        })
    }

    fn get(
        &self,
        locator: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredObject>>> + Send + '_>> {
        let locator = locator.to_string();
        Box::pin(async move {
            let path = self.resolve(&locator)?;
            match std::fs::read(&path) {
                Ok(data) => Ok(Some(StoredObject::new(Bytes::from(data)))),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn delete(
        &self,
        locator: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let locator = locator.to_string();
        Box::pin(async move {
            let path = self.resolve(&locator)?;
            match std::fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn exists(
        &self,
        locator: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let locator = locator.to_string();
        Box::pin(async move {
            let path = self.resolve(&locator)?;
            Ok(path.is_file())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_backend() -> (tempfile::TempDir, LocalBackend) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let backend = LocalBackend::new(dir.path().join("files_manager"));
        (dir, backend)
    }

    #[tokio::test]
    async fn test_put_creates_missing_root() {
        let (_dir, backend) = test_backend();
        assert!(!backend.root().exists());

        let locator = backend.put("blob-1", Bytes::from("hi")).await.unwrap();
        assert!(backend.root().is_dir());
        assert_eq!(Path::new(&locator), backend.root().join("blob-1"));
        assert_eq!(std::fs::read(&locator).unwrap(), b"hi");
    }

    #[tokio::test]
    async fn test_put_and_get_roundtrip() {
        let (_dir, backend) = test_backend();
        let locator = backend.put("blob-2", Bytes::from("hello world")).await.unwrap();

        let obj = backend.get(&locator).await.unwrap().unwrap();
        assert_eq!(obj.data, Bytes::from("hello world"));
        assert_eq!(
            obj.content_hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn test_put_empty_blob() {
        let (_dir, backend) = test_backend();
        let locator = backend.put("empty", Bytes::new()).await.unwrap();
        let obj = backend.get(&locator).await.unwrap().unwrap();
        assert!(obj.data.is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (_dir, backend) = test_backend();
        let locator = backend.root().join("absent").to_string_lossy().into_owned();
        assert!(backend.get(&locator).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_and_exists() {
        let (_dir, backend) = test_backend();
        let locator = backend.put("blob-3", Bytes::from("x")).await.unwrap();
        assert!(backend.exists(&locator).await.unwrap());

        backend.delete(&locator).await.unwrap();
        assert!(!backend.exists(&locator).await.unwrap());
        // Idempotent.
        backend.delete(&locator).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_nested_or_traversing_names() {
        let (_dir, backend) = test_backend();
        assert!(backend.put("a/b", Bytes::from("x")).await.is_err());
        assert!(backend.put("../escape", Bytes::from("x")).await.is_err());
        assert!(backend.put(".tmp", Bytes::from("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_locator_outside_root() {
        let (_dir, backend) = test_backend();
        assert!(backend.get("/etc/passwd").await.is_err());
        let sneaky = format!("{}/../secret", backend.root().display());
        assert!(backend.get(&sneaky).await.is_err());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let (_dir, backend) = test_backend();
        backend.put("blob-4", Bytes::from("data")).await.unwrap();
        let leftovers = std::fs::read_dir(backend.root().join(TMP_DIR))
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
    }
}
