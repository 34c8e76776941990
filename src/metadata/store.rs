//! Abstract metadata store trait.
//!
//! Any document-store backend must implement [`MetadataStore`].  The trait
//! uses manually desugared async methods (pinned boxed futures) so it can be
//! used as a trait object behind `Arc<dyn MetadataStore>`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Stored value of the root sentinel parent reference.
pub const ROOT_PARENT: &str = "0";

// ── File kinds ─────────────────────────────────────────────────────

/// The kind of a file record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Folder,
    File,
    Image,
}

impl FileKind {
    /// Parse the wire/storage representation. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "folder" => Some(FileKind::Folder),
            "file" => Some(FileKind::File),
            "image" => Some(FileKind::Image),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Folder => "folder",
            FileKind::File => "file",
            FileKind::Image => "image",
        }
    }

    /// Whether records of this kind carry blob content.
    pub fn has_content(&self) -> bool {
        !matches!(self, FileKind::Folder)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Parent references ──────────────────────────────────────────────

/// Where a file record sits in the hierarchy.
///
/// On the wire the root sentinel is the integer `0`; a folder reference is
/// the folder's id string.  Both `0` and `"0"` are accepted as root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ParentRef {
    #[default]
    Root,
    Folder(String),
}

impl ParentRef {
    /// Parse a raw (query string or stored) value.
    pub fn parse(raw: &str) -> Self {
        if raw == ROOT_PARENT {
            ParentRef::Root
        } else {
            ParentRef::Folder(raw.to_string())
        }
    }

    /// The value stored in the index (`"0"` for root).
    pub fn as_str(&self) -> &str {
        match self {
            ParentRef::Root => ROOT_PARENT,
            ParentRef::Folder(id) => id,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, ParentRef::Root)
    }
}

impl Serialize for ParentRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParentRef::Root => serializer.serialize_u8(0),
            ParentRef::Folder(id) => serializer.serialize_str(id),
        }
    }
}

impl<'de> Deserialize<'de> for ParentRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Str(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(0) => ParentRef::Root,
            Raw::Int(n) => ParentRef::Folder(n.to_string()),
            Raw::Str(s) => ParentRef::parse(&s),
        })
    }
}

// ── Record types ───────────────────────────────────────────────────

/// A registered user.
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// Store-assigned identifier.
    pub id: String,
    /// Email address, unique and case-sensitive.
    pub email: String,
    /// Hex password digest. Never leaves the service.
    pub password: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Metadata record for a folder, file or image.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Store-assigned identifier.
    pub id: String,
    /// Owner user id.
    pub user_id: String,
    pub name: String,
    pub kind: FileKind,
    pub is_public: bool,
    pub parent_id: ParentRef,
    /// Blob locator; present exactly when `kind.has_content()`.
    pub local_path: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Fields supplied by the caller when inserting a file record.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub user_id: String,
    pub name: String,
    pub kind: FileKind,
    pub is_public: bool,
    pub parent_id: ParentRef,
    pub local_path: Option<String>,
}

impl NewFile {
    /// Attach a store-assigned id and timestamp.
    pub fn into_record(self, id: String, created_at: String) -> FileRecord {
        FileRecord {
            id,
            user_id: self.user_id,
            name: self.name,
            kind: self.kind,
            is_public: self.is_public,
            parent_id: self.parent_id,
            local_path: self.local_path,
            created_at,
        }
    }
}

/// Generate a fresh store-assigned identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time as an RFC 3339 string with millisecond precision.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ── Trait ───────────────────────────────────────────────────────────

/// Async document-store contract for the users and files collections.
pub trait MetadataStore: Send + Sync + 'static {
    /// Cheap liveness probe.
    fn ping(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    // ── Users ───────────────────────────────────────────────────────

    /// Insert a new user.  Returns `None` when the email is already taken;
    /// the store enforces uniqueness atomically.
    fn create_user(
        &self,
        email: &str,
        password_digest: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>>;

    /// Get a user by id.
    fn get_user(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>>;

    /// Get a user by exact email.
    fn get_user_by_email(
        &self,
        email: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>>;

    /// Number of registered users.
    fn count_users(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>>;

    // ── Files ───────────────────────────────────────────────────────

    /// Insert a file record and return it with its assigned id.
    fn insert_file(
        &self,
        file: NewFile,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<FileRecord>> + Send + '_>>;

    /// Get a file record by id.
    fn get_file(
        &self,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>>;

    /// List `owner`'s records directly under `parent`, in creation order,
    /// skipping the first `skip` matches and returning at most `limit`.
    fn list_files(
        &self,
        owner: &str,
        parent: &ParentRef,
        skip: u64,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<FileRecord>>> + Send + '_>>;

    /// Number of file records.
    fn count_files(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>>;
}
