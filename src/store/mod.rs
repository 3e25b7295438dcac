//! Storage backend contract.
//!
//! The transfer engine never talks to a concrete backend. It consumes
//! [`Document`] and [`Collection`] trait objects, wrapped in an [`Entry`], and
//! asks their [`FileSystem`] for capabilities (native ETags, a dead-property
//! store). Two entries belong to the same backend iff their
//! [`FileSystemId`]s are equal, which is what selects native copy/move.
//!
//! Two backends ship with the crate: [`MemoryFileSystem`] and
//! [`LocalFileSystem`].

mod local;
mod memory;

pub use local::LocalFileSystem;
pub use memory::{MemoryFileSystem, MemoryPropertyStore, NodeAccess};

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncWrite};

/// Readable document content.
pub type ReadStream = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Writable document content.
///
/// Content is committed when the stream is shut down
/// ([`AsyncWriteExt::shutdown`](tokio::io::AsyncWriteExt::shutdown)). Dropping
/// the stream without shutting it down discards the write.
pub type WriteStream = Box<dyn AsyncWrite + Send + Unpin>;

/// Process-unique identity of a file system instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileSystemId(u64);

impl FileSystemId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        FileSystemId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Opaque entity tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityTag {
    /// Tag value without quotes
    pub value: String,
    /// Weak validator (`W/` prefix)
    pub weak: bool,
}

impl EntityTag {
    /// Strong tag.
    pub fn strong(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            weak: false,
        }
    }

    /// Parse the header form (`"abc"` or `W/"abc"`); unquoted values are accepted.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let (weak, rest) = match raw.strip_prefix("W/") {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let value = rest
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(rest);
        Self {
            value: value.to_owned(),
            weak,
        }
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.weak {
            f.write_str("W/")?;
        }
        write!(f, "\"{}\"", self.value)
    }
}

/// Namespace-qualified property name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyName {
    /// XML namespace URI
    pub namespace: String,
    /// Local element name
    pub name: String,
}

impl PropertyName {
    /// The `DAV:` namespace.
    pub const DAV: &'static str = "DAV:";

    /// Create a property name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// `DAV:getetag`
    pub fn getetag() -> Self {
        Self::new(Self::DAV, "getetag")
    }

    /// Returns true for `DAV:getetag`.
    pub fn is_getetag(&self) -> bool {
        self.namespace == Self::DAV && self.name == "getetag"
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.name)
    }
}

/// A property stored without server interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadProperty {
    /// Property name
    pub name: PropertyName,
    /// Text content
    pub value: String,
}

impl DeadProperty {
    /// Create a dead property.
    pub fn new(name: PropertyName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }

    /// `DAV:getetag` carrying an entity tag in header form.
    pub fn etag(etag: &EntityTag) -> Self {
        Self::new(PropertyName::getetag(), etag.to_string())
    }
}

/// Operations shared by documents and collections.
#[async_trait]
pub trait Node: Send + Sync + fmt::Debug {
    /// Last path segment (empty for the root).
    fn name(&self) -> &str;

    /// Slash-separated path from the root (`/` for the root).
    fn path(&self) -> &str;

    /// Backend this entry lives in.
    fn file_system(&self) -> Arc<dyn FileSystem>;

    /// Delete the entry (recursively for collections).
    async fn delete(&self) -> Result<()>;
}

/// A resource with content.
#[async_trait]
pub trait Document: Node {
    /// Content length in bytes.
    async fn len(&self) -> Result<u64>;

    /// Native entity tag, when the backend computes one.
    async fn etag(&self) -> Result<Option<EntityTag>> {
        Ok(None)
    }

    /// Open the content for reading.
    async fn open_read(&self) -> Result<ReadStream>;

    /// Open the content for replacement.
    async fn open_write(&self) -> Result<WriteStream>;

    /// Native copy into `collection` under `name`, replacing an existing document.
    ///
    /// Only called when `collection` belongs to the same file system.
    async fn copy_to(&self, collection: &dyn Collection, name: &str) -> Result<Arc<dyn Document>> {
        let _ = (collection, name);
        Err(Error::NotSupported("native copy"))
    }

    /// Native move into `collection` under `name`.
    ///
    /// Only called when `collection` belongs to the same file system.
    async fn move_to(&self, collection: &dyn Collection, name: &str) -> Result<Arc<dyn Document>> {
        let _ = (collection, name);
        Err(Error::NotSupported("native move"))
    }
}

/// A resource containing other resources.
#[async_trait]
pub trait Collection: Node {
    /// Look up a direct child. Always consults the backend.
    async fn child(&self, name: &str) -> Result<Option<Entry>>;

    /// Snapshot of the direct children, sorted by name.
    async fn children(&self) -> Result<Vec<Entry>>;

    /// Create an empty document.
    async fn create_document(&self, name: &str) -> Result<Arc<dyn Document>>;

    /// Create an empty collection.
    async fn create_collection(&self, name: &str) -> Result<Arc<dyn Collection>>;
}

/// Dead-property storage of one file system.
#[async_trait]
pub trait PropertyStore: Send + Sync + fmt::Debug {
    /// All dead properties of the entry at `path`.
    async fn get(&self, path: &str) -> Result<Vec<DeadProperty>>;

    /// Set (insert or replace) one property.
    async fn set(&self, path: &str, property: DeadProperty) -> Result<()>;

    /// Drop every property of `path`.
    async fn remove_all(&self, path: &str) -> Result<()>;
}

/// A storage backend.
#[async_trait]
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Identity used to detect same-backend transfers.
    fn id(&self) -> FileSystemId;

    /// Whether documents report a native ETag.
    fn supports_etag(&self) -> bool;

    /// Dead-property storage, if the backend has one.
    fn property_store(&self) -> Option<Arc<dyn PropertyStore>>;

    /// Root collection.
    async fn root(&self) -> Result<Arc<dyn Collection>>;
}

/// A document or a collection.
#[derive(Debug, Clone)]
pub enum Entry {
    /// A document
    Document(Arc<dyn Document>),
    /// A collection
    Collection(Arc<dyn Collection>),
}

impl Entry {
    /// Last path segment.
    pub fn name(&self) -> &str {
        match self {
            Entry::Document(d) => d.name(),
            Entry::Collection(c) => c.name(),
        }
    }

    /// Path from the backend root.
    pub fn path(&self) -> &str {
        match self {
            Entry::Document(d) => d.path(),
            Entry::Collection(c) => c.path(),
        }
    }

    /// Backend of the entry.
    pub fn file_system(&self) -> Arc<dyn FileSystem> {
        match self {
            Entry::Document(d) => d.file_system(),
            Entry::Collection(c) => c.file_system(),
        }
    }

    /// Returns true for collections.
    pub fn is_collection(&self) -> bool {
        matches!(self, Entry::Collection(_))
    }

    /// Delete the entry.
    pub async fn delete(&self) -> Result<()> {
        match self {
            Entry::Document(d) => d.delete().await,
            Entry::Collection(c) => c.delete().await,
        }
    }
}

/// Resolve a slash-separated path from the root of `fs`.
///
/// Returns `None` when any segment is missing or an intermediate segment is a document.
pub async fn lookup(fs: &dyn FileSystem, path: &str) -> Result<Option<Entry>> {
    let mut current = Entry::Collection(fs.root().await?);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let Entry::Collection(collection) = current else {
            return Ok(None);
        };
        match collection.child(segment).await? {
            Some(entry) => current = entry,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Join a collection path and a child name.
pub(crate) fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Last segment of a path.
pub(crate) fn last_segment(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}
