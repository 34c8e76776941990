//! SQLite-backed metadata store.
//!
//! Uses `rusqlite` with the `bundled` feature so no system SQLite
//! library is required.  All async trait methods are thin wrappers
//! around synchronous rusqlite calls executed under a `Mutex`.
//!
//! Email uniqueness is a `UNIQUE` constraint on `users.email`; a violating
//! insert is reported as `Ok(None)` rather than an error.  File listings
//! are ordered by the `seq` rowid, i.e. creation order.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use super::store::{
    new_id, now_rfc3339, FileKind, FileRecord, MetadataStore, NewFile, ParentRef, UserRecord,
};

/// Current schema version. Bumped when migrations are added.
const SCHEMA_VERSION: i64 = 1;

const FILE_COLUMNS: &str =
    "id, user_id, name, type, is_public, parent_id, local_path, created_at";

/// Metadata store backed by a single SQLite database file.
pub struct SqliteMetadataStore {
    /// The database connection, guarded by a mutex for Send + Sync.
    conn: Mutex<Connection>,
}

impl SqliteMetadataStore {
    /// Open (or create) the database at `path` and initialize the schema.
    ///
    /// Passing `":memory:"` creates an in-memory database (useful for tests).
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.apply_pragmas()?;
        store.init_db()?;
        Ok(store)
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("metadata connection mutex poisoned"))
    }

    /// Apply recommended SQLite pragmas for performance and safety.
    fn apply_pragmas(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        Ok(())
    }

    /// Create the required tables and indexes if they do not already exist.
    /// Idempotent; safe to call on every startup.
    fn init_db(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_version (
                version    INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                id         TEXT PRIMARY KEY,
                email      TEXT NOT NULL UNIQUE,
                password   TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS files (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                id         TEXT NOT NULL UNIQUE,
                user_id    TEXT NOT NULL,
                name       TEXT NOT NULL,
                type       TEXT NOT NULL,
                is_public  INTEGER NOT NULL DEFAULT 0,
                parent_id  TEXT NOT NULL DEFAULT '0',
                local_path TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_files_owner_parent
                ON files(user_id, parent_id, seq);
            ",
        )?;

        let existing: Option<i64> = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();

        if existing.map_or(true, |v| v < SCHEMA_VERSION) {
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                params![SCHEMA_VERSION, now_rfc3339()],
            )?;
        }

        Ok(())
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let kind: String = row.get(3)?;
    let kind = FileKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown file type '{kind}'").into(),
        )
    })?;
    let is_public: i64 = row.get(4)?;
    let parent_id: String = row.get(5)?;
    Ok(FileRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        kind,
        is_public: is_public != 0,
        parent_id: ParentRef::parse(&parent_id),
        local_path: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl MetadataStore for SqliteMetadataStore {
    fn ping(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.lock()?;
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }

    fn create_user(
        &self,
        email: &str,
        password_digest: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>> {
        let record = UserRecord {
            id: new_id(),
            email: email.to_string(),
            password: password_digest.to_string(),
            created_at: now_rfc3339(),
        };
        Box::pin(async move {
            let conn = self.lock()?;
            let inserted = conn.execute(
                "INSERT INTO users (id, email, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![record.id, record.email, record.password, record.created_at],
            );
            match inserted {
                Ok(_) => Ok(Some(record)),
                Err(e) if is_unique_violation(&e) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn get_user(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let conn = self.lock()?;
            let user = conn
                .query_row(
                    "SELECT id, email, password, created_at FROM users WHERE id = ?1",
                    params![id],
                    user_from_row,
                )
                .optional()?;
            Ok(user)
        })
    }

    fn get_user_by_email(
        &self,
        email: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>> {
        let email = email.to_string();
        Box::pin(async move {
            let conn = self.lock()?;
            let user = conn
                .query_row(
                    "SELECT id, email, password, created_at FROM users WHERE email = ?1",
                    params![email],
                    user_from_row,
                )
                .optional()?;
            Ok(user)
        })
    }

    fn count_users(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    fn insert_file(
        &self,
        file: NewFile,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<FileRecord>> + Send + '_>> {
        Box::pin(async move {
            let record = file.into_record(new_id(), now_rfc3339());
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO files (id, user_id, name, type, is_public, parent_id, local_path, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.user_id,
                    record.name,
                    record.kind.as_str(),
                    record.is_public as i64,
                    record.parent_id.as_str(),
                    record.local_path,
                    record.created_at,
                ],
            )?;
            Ok(record)
        })
    }

    fn get_file(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let conn = self.lock()?;
            let file = conn
                .query_row(
                    &format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1"),
                    params![id],
                    file_from_row,
                )
                .optional()?;
            Ok(file)
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
        let parent = parent.as_str().to_string();
        let skip = i64::try_from(skip).unwrap_or(i64::MAX);
        Box::pin(async move {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {FILE_COLUMNS} FROM files
                 WHERE user_id = ?1 AND parent_id = ?2
                 ORDER BY seq
                 LIMIT ?3 OFFSET ?4"
            ))?;
            let files = stmt
                .query_map(params![owner, parent, limit as i64, skip], file_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(files)
        })
    }

    fn count_files(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.lock()?;
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> SqliteMetadataStore {
        SqliteMetadataStore::new(":memory:").expect("failed to create in-memory store")
    }

    fn new_file(owner: &str, name: &str, kind: FileKind, parent: ParentRef) -> NewFile {
        NewFile {
            user_id: owner.to_string(),
            name: name.to_string(),
            kind,
            is_public: false,
            parent_id: parent,
            local_path: kind.has_content().then(|| format!("/tmp/blobs/{name}")),
        }
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.db");
        let path = path.to_str().unwrap();
        {
            let store = SqliteMetadataStore::new(path).unwrap();
            store.create_user("a@x.com", "d").await.unwrap();
        }
        let reopened = SqliteMetadataStore::new(path).unwrap();
        assert_eq!(reopened.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ping() {
        assert!(test_store().ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_user_roundtrip_and_unique_email() {
        let store = test_store();
        let user = store.create_user("u@x.com", "abc").await.unwrap().unwrap();

        let by_email = store.get_user_by_email("u@x.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(by_email.password, "abc");
        let by_id = store.get_user(&user.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "u@x.com");

        assert!(store.create_user("u@x.com", "other").await.unwrap().is_none());
        assert!(store.create_user("U@x.com", "other").await.unwrap().is_some());
        assert_eq!(store.count_users().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_file_roundtrip() {
        let store = test_store();
        let folder = store
            .insert_file(new_file("u1", "Docs", FileKind::Folder, ParentRef::Root))
            .await
            .unwrap();
        let image = store
            .insert_file(new_file(
                "u1",
                "cat.png",
                FileKind::Image,
                ParentRef::Folder(folder.id.clone()),
            ))
            .await
            .unwrap();

        let fetched = store.get_file(&folder.id).await.unwrap().unwrap();
        assert_eq!(fetched.kind, FileKind::Folder);
        assert!(fetched.parent_id.is_root());
        assert!(fetched.local_path.is_none());

        let fetched = store.get_file(&image.id).await.unwrap().unwrap();
        assert_eq!(fetched.kind, FileKind::Image);
        assert_eq!(fetched.parent_id, ParentRef::Folder(folder.id.clone()));
        assert_eq!(fetched.local_path.as_deref(), Some("/tmp/blobs/cat.png"));

        assert!(store.get_file("nope").await.unwrap().is_none());
        assert_eq!(store.count_files().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_files_pagination() {
        let store = test_store();
        for i in 0..23 {
            store
                .insert_file(new_file("u1", &format!("n{i:02}"), FileKind::File, ParentRef::Root))
                .await
                .unwrap();
        }
        store
            .insert_file(new_file("u2", "theirs", FileKind::File, ParentRef::Root))
            .await
            .unwrap();

        let page0 = store.list_files("u1", &ParentRef::Root, 0, 20).await.unwrap();
        assert_eq!(page0.len(), 20);
        assert_eq!(page0[0].name, "n00");

        let page1 = store.list_files("u1", &ParentRef::Root, 20, 20).await.unwrap();
        assert_eq!(page1.len(), 3);
        assert_eq!(page1[2].name, "n22");

        let empty = store
            .list_files("u1", &ParentRef::Folder("x".into()), 0, 20)
            .await
            .unwrap();
        assert!(empty.is_empty());
    }
}
