//! In-memory metadata store.
//!
//! Stores all metadata in memory with no persistence. Useful for testing
//! and ephemeral deployments. Uses `RwLock` for thread-safe access; file
//! records are kept in insertion order so listings follow creation order.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::store::{
    new_id, now_rfc3339, FileRecord, MetadataStore, NewFile, ParentRef, UserRecord,
};

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<String, UserRecord>,
    /// email -> user id; acts as the unique index on email.
    emails: HashMap<String, String>,
    /// Insertion-ordered file records.
    files: Vec<FileRecord>,
    /// file id -> position in `files`.
    file_index: HashMap<String, usize>,
}

#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    inner: RwLock<Inner>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> anyhow::Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow::anyhow!("metadata lock poisoned"))
    }

    fn write(&self) -> anyhow::Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow::anyhow!("metadata lock poisoned"))
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn ping(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.read()?;
            Ok(())
        })
    }

    fn create_user(
        &self,
        email: &str,
        password_digest: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>> {
        let email = email.to_string();
        let password = password_digest.to_string();
        Box::pin(async move {
            let mut inner = self.write()?;
            if inner.emails.contains_key(&email) {
                return Ok(None);
            }
            let record = UserRecord {
                id: new_id(),
                email: email.clone(),
                password,
                created_at: now_rfc3339(),
            };
            inner.emails.insert(email, record.id.clone());
            inner.users.insert(record.id.clone(), record.clone());
            Ok(Some(record))
        })
    }

    fn get_user(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let inner = self.read()?;
            Ok(inner.users.get(&id).cloned())
        })
    }

    fn get_user_by_email(
        &self,
        email: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>> {
        let email = email.to_string();
        Box::pin(async move {
            let inner = self.read()?;
            Ok(inner
                .emails
                .get(&email)
                .and_then(|id| inner.users.get(id))
                .cloned())
        })
    }

    fn count_users(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>> {
        Box::pin(async move { Ok(self.read()?.users.len() as u64) })
    }

    fn insert_file(
        &self,
        file: NewFile,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<FileRecord>> + Send + '_>> {
        Box::pin(async move {
            let record = file.into_record(new_id(), now_rfc3339());
            let mut inner = self.write()?;
            let position = inner.files.len();
            inner.file_index.insert(record.id.clone(), position);
            inner.files.push(record.clone());
            Ok(record)
        })
    }

    fn get_file(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let inner = self.read()?;
            Ok(inner
                .file_index
                .get(&id)
                .and_then(|&pos| inner.files.get(pos))
                .cloned())
        })
    }

    fn list_files(
        &self,
        owner: &str,
        parent: &ParentRef,
        skip: u64,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<FileRecord>>> + Send + '_>> {
        let owner = owner.to_string();
        let parent = parent.clone();
        Box::pin(async move {
            let inner = self.read()?;
            Ok(inner
                .files
                .iter()
                .filter(|f| f.user_id == owner && f.parent_id == parent)
                .skip(usize::try_from(skip).unwrap_or(usize::MAX))
                .take(limit as usize)
                .cloned()
                .collect())
        })
    }

    fn count_files(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>> {
        Box::pin(async move { Ok(self.read()?.files.len() as u64) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::store::FileKind;

    fn test_store() -> MemoryMetadataStore {
        MemoryMetadataStore::new()
    }

    fn folder(owner: &str, name: &str, parent: ParentRef) -> NewFile {
        NewFile {
            user_id: owner.to_string(),
            name: name.to_string(),
            kind: FileKind::Folder,
            is_public: false,
            parent_id: parent,
            local_path: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let store = test_store();
        let user = store.create_user("a@x.com", "digest").await.unwrap().unwrap();
        assert_eq!(user.email, "a@x.com");

        let by_id = store.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "a@x.com");
        let by_email = store.get_user_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert!(store.get_user_by_email("A@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = test_store();
        assert!(store.create_user("a@x.com", "d1").await.unwrap().is_some());
        assert!(store.create_user("a@x.com", "d2").await.unwrap().is_none());
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_and_get_file() {
        let store = test_store();
        let record = store
            .insert_file(folder("u1", "Docs", ParentRef::Root))
            .await
            .unwrap();
        assert!(!record.id.is_empty());

        let fetched = store.get_file(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Docs");
        assert_eq!(fetched.kind, FileKind::Folder);
        assert!(store.get_file("missing").await.unwrap().is_none());
        assert_eq!(store.count_files().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_files_filters_and_pages_in_creation_order() {
        let store = test_store();
        for i in 0..25 {
            store
                .insert_file(folder("u1", &format!("f{i}"), ParentRef::Root))
                .await
                .unwrap();
        }
        store
            .insert_file(folder("u2", "other-owner", ParentRef::Root))
            .await
            .unwrap();
        store
            .insert_file(folder("u1", "nested", ParentRef::Folder("p".into())))
            .await
            .unwrap();

        let first = store.list_files("u1", &ParentRef::Root, 0, 20).await.unwrap();
        assert_eq!(first.len(), 20);
        assert_eq!(first[0].name, "f0");
        assert_eq!(first[19].name, "f19");

        let second = store.list_files("u1", &ParentRef::Root, 20, 20).await.unwrap();
        let names: Vec<_> = second.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["f20", "f21", "f22", "f23", "f24"]);

        let third = store.list_files("u1", &ParentRef::Root, 40, 20).await.unwrap();
        assert!(third.is_empty());

        let nested = store
            .list_files("u1", &ParentRef::Folder("p".into()), 0, 20)
            .await
            .unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].name, "nested");
    }
}
