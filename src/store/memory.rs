//! In-memory storage backend.
//!
//! Nodes live in a path-keyed `BTreeMap` guarded by a mutex that is never held
//! across an `.await`. Every node carries [`NodeAccess`] flags so callers can
//! make individual reads or writes fail the way a `chmod` would on disk.

use super::{
    Collection, DeadProperty, Document, EntityTag, Entry, FileSystem, FileSystemId, Node,
    PropertyStore, ReadStream, WriteStream, join_path, last_segment,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// Access flags of a memory node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAccess {
    /// Content (documents) or listing (collections) can be read
    pub read: bool,
    /// Node can be replaced, deleted, moved or (collections) receive children
    pub write: bool,
}

impl NodeAccess {
    /// Read and write allowed.
    pub const FULL: NodeAccess = NodeAccess {
        read: true,
        write: true,
    };
    /// Only reads allowed.
    pub const READ_ONLY: NodeAccess = NodeAccess {
        read: true,
        write: false,
    };
    /// Nothing allowed.
    pub const NONE: NodeAccess = NodeAccess {
        read: false,
        write: false,
    };
}

impl Default for NodeAccess {
    fn default() -> Self {
        Self::FULL
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Collection,
    Document { content: Bytes, revision: u64 },
}

#[derive(Debug, Clone)]
struct MemoryNode {
    kind: NodeKind,
    access: NodeAccess,
}

impl MemoryNode {
    fn collection() -> Self {
        Self {
            kind: NodeKind::Collection,
            access: NodeAccess::FULL,
        }
    }

    fn document(content: Bytes, revision: u64) -> Self {
        Self {
            kind: NodeKind::Document { content, revision },
            access: NodeAccess::FULL,
        }
    }

    fn is_collection(&self) -> bool {
        matches!(self.kind, NodeKind::Collection)
    }
}

type NodeMap = BTreeMap<String, MemoryNode>;

#[derive(Debug)]
struct Inner {
    id: FileSystemId,
    native_etag: AtomicBool,
    next_revision: AtomicU64,
    nodes: Mutex<NodeMap>,
    properties: Option<Arc<MemoryPropertyStore>>,
}

/// A file system held entirely in memory.
///
/// Cloning is cheap and yields a handle to the same tree.
///
/// # Example
///
/// ```
/// use davcopy::MemoryFileSystem;
///
/// let fs = MemoryFileSystem::new();
/// fs.write("/docs/readme.txt", "hello")?;
/// assert!(fs.is_collection("/docs"));
/// assert_eq!(fs.read("/docs/readme.txt").unwrap(), "hello");
/// # Ok::<(), davcopy::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct MemoryFileSystem {
    inner: Arc<Inner>,
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFileSystem {
    /// Empty file system with native ETags and a dead-property store.
    pub fn new() -> Self {
        Self::build(Some(Arc::new(MemoryPropertyStore::default())))
    }

    /// Empty file system that cannot store dead properties.
    pub fn without_property_store() -> Self {
        Self::build(None)
    }

    fn build(properties: Option<Arc<MemoryPropertyStore>>) -> Self {
        let mut nodes = NodeMap::new();
        nodes.insert("/".to_owned(), MemoryNode::collection());
        Self {
            inner: Arc::new(Inner {
                id: FileSystemId::next(),
                native_etag: AtomicBool::new(true),
                next_revision: AtomicU64::new(1),
                nodes: Mutex::new(nodes),
                properties,
            }),
        }
    }

    /// Enable or disable native ETag support.
    #[must_use]
    pub fn with_native_etag(self, enabled: bool) -> Self {
        self.inner.native_etag.store(enabled, Ordering::Relaxed);
        self
    }

    /// The dead-property store, if any.
    pub fn properties(&self) -> Option<Arc<MemoryPropertyStore>> {
        self.inner.properties.clone()
    }

    /// Create or replace a document, creating missing parent collections.
    pub fn write(&self, path: &str, content: impl Into<Bytes>) -> Result<()> {
        let path = normalize(path);
        let parent = parent_path(&path);
        self.create_dir_all(&parent)?;
        let revision = self.next_revision();
        let mut nodes = self.nodes();
        match nodes.get_mut(&path) {
            Some(node) if node.is_collection() => Err(Error::AlreadyExists(path)),
            Some(node) => {
                node.kind = NodeKind::Document {
                    content: content.into(),
                    revision,
                };
                Ok(())
            }
            None => {
                nodes.insert(path, MemoryNode::document(content.into(), revision));
                Ok(())
            }
        }
    }

    /// Create a collection and all missing ancestors.
    pub fn create_dir_all(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        let mut nodes = self.nodes();
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            match nodes.get(&current) {
                Some(node) if node.is_collection() => {}
                Some(_) => return Err(Error::AlreadyExists(current)),
                None => {
                    nodes.insert(current.clone(), MemoryNode::collection());
                }
            }
        }
        Ok(())
    }

    /// Content of a document.
    pub fn read(&self, path: &str) -> Option<Bytes> {
        match self.nodes().get(&normalize(path)).map(|n| &n.kind) {
            Some(NodeKind::Document { content, .. }) => Some(content.clone()),
            _ => None,
        }
    }

    /// Returns true if anything exists at `path`.
    pub fn exists(&self, path: &str) -> bool {
        self.nodes().contains_key(&normalize(path))
    }

    /// Returns true if a collection exists at `path`.
    pub fn is_collection(&self, path: &str) -> bool {
        self.nodes()
            .get(&normalize(path))
            .is_some_and(MemoryNode::is_collection)
    }

    /// Change the access flags of a node.
    pub fn set_access(&self, path: &str, access: NodeAccess) -> Result<()> {
        let path = normalize(path);
        let mut nodes = self.nodes();
        let node = nodes.get_mut(&path).ok_or(Error::NotFound(path))?;
        node.access = access;
        Ok(())
    }

    /// Every path in the tree, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.nodes().keys().cloned().collect()
    }

    /// Entry at `path`.
    pub fn lookup(&self, path: &str) -> Option<Entry> {
        let path = normalize(path);
        let is_collection = self.nodes().get(&path)?.is_collection();
        Some(self.entry(path, is_collection))
    }

    fn entry(&self, path: String, is_collection: bool) -> Entry {
        let name = last_segment(&path).to_owned();
        if is_collection {
            Entry::Collection(Arc::new(MemoryCollection {
                fs: self.clone(),
                name,
                path,
            }))
        } else {
            Entry::Document(Arc::new(MemoryDocument {
                fs: self.clone(),
                name,
                path,
            }))
        }
    }

    fn nodes(&self) -> MutexGuard<'_, NodeMap> {
        self.inner
            .nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn next_revision(&self) -> u64 {
        self.inner.next_revision.fetch_add(1, Ordering::Relaxed)
    }

    fn commit(&self, path: &str, content: Vec<u8>) -> io::Result<()> {
        let revision = self.next_revision();
        let mut nodes = self.nodes();
        match nodes.get_mut(path) {
            Some(node) if !node.is_collection() => {
                if !node.access.write {
                    return Err(io::Error::new(io::ErrorKind::PermissionDenied, path));
                }
                node.kind = NodeKind::Document {
                    content: Bytes::from(content),
                    revision,
                };
                Ok(())
            }
            _ => Err(io::Error::new(io::ErrorKind::NotFound, path)),
        }
    }

    /// Validate the destination of a native copy/move and return its path.
    fn check_destination(&self, nodes: &NodeMap, collection: &str, name: &str) -> Result<String> {
        validate_name(name)?;
        match nodes.get(collection) {
            Some(parent) if parent.is_collection() => {
                if !parent.access.write {
                    return Err(Error::PermissionDenied(collection.to_owned()));
                }
            }
            Some(_) => return Err(Error::AlreadyExists(collection.to_owned())),
            None => return Err(Error::NotFound(collection.to_owned())),
        }
        let path = join_path(collection, name);
        match nodes.get(&path) {
            Some(existing) if existing.is_collection() => Err(Error::AlreadyExists(path)),
            Some(existing) if !existing.access.write => Err(Error::PermissionDenied(path)),
            _ => Ok(path),
        }
    }

    fn same_file_system(&self, collection: &dyn Collection) -> Result<()> {
        if collection.file_system().id() == self.inner.id {
            Ok(())
        } else {
            Err(Error::NotSupported("native transfer across file systems"))
        }
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    fn id(&self) -> FileSystemId {
        self.inner.id
    }

    fn supports_etag(&self) -> bool {
        self.inner.native_etag.load(Ordering::Relaxed)
    }

    fn property_store(&self) -> Option<Arc<dyn PropertyStore>> {
        self.inner
            .properties
            .clone()
            .map(|store| store as Arc<dyn PropertyStore>)
    }

    async fn root(&self) -> Result<Arc<dyn Collection>> {
        Ok(Arc::new(MemoryCollection {
            fs: self.clone(),
            name: String::new(),
            path: "/".to_owned(),
        }))
    }
}

#[derive(Debug)]
struct MemoryDocument {
    fs: MemoryFileSystem,
    name: String,
    path: String,
}

#[derive(Debug)]
struct MemoryCollection {
    fs: MemoryFileSystem,
    name: String,
    path: String,
}

#[async_trait]
impl Node for MemoryDocument {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn file_system(&self) -> Arc<dyn FileSystem> {
        Arc::new(self.fs.clone())
    }

    async fn delete(&self) -> Result<()> {
        {
            let mut nodes = self.fs.nodes();
            match nodes.get(&self.path) {
                Some(node) if !node.access.write => {
                    return Err(Error::PermissionDenied(self.path.clone()));
                }
                Some(_) => {
                    nodes.remove(&self.path);
                }
                None => return Err(Error::NotFound(self.path.clone())),
            }
        }
        if let Some(store) = &self.fs.inner.properties {
            store.remove_prefix(&self.path);
        }
        Ok(())
    }
}

#[async_trait]
impl Document for MemoryDocument {
    async fn len(&self) -> Result<u64> {
        match self.fs.nodes().get(&self.path).map(|n| &n.kind) {
            Some(NodeKind::Document { content, .. }) => Ok(content.len() as u64),
            _ => Err(Error::NotFound(self.path.clone())),
        }
    }

    async fn etag(&self) -> Result<Option<EntityTag>> {
        if !self.fs.supports_etag() {
            return Ok(None);
        }
        match self.fs.nodes().get(&self.path).map(|n| &n.kind) {
            Some(NodeKind::Document { revision, .. }) => {
                Ok(Some(EntityTag::strong(format!("mem-{revision:x}"))))
            }
            _ => Err(Error::NotFound(self.path.clone())),
        }
    }

    async fn open_read(&self) -> Result<ReadStream> {
        match self.fs.nodes().get(&self.path) {
            Some(node) if !node.access.read => Err(Error::PermissionDenied(self.path.clone())),
            Some(MemoryNode {
                kind: NodeKind::Document { content, .. },
                ..
            }) => Ok(Box::new(io::Cursor::new(content.clone()))),
            _ => Err(Error::NotFound(self.path.clone())),
        }
    }

    async fn open_write(&self) -> Result<WriteStream> {
        match self.fs.nodes().get(&self.path) {
            Some(node) if node.is_collection() => Err(Error::AlreadyExists(self.path.clone())),
            Some(node) if !node.access.write => Err(Error::PermissionDenied(self.path.clone())),
            Some(_) => Ok(Box::new(MemoryWriter {
                fs: self.fs.clone(),
                path: self.path.clone(),
                buf: Vec::new(),
                committed: false,
            })),
            None => Err(Error::NotFound(self.path.clone())),
        }
    }

    async fn copy_to(&self, collection: &dyn Collection, name: &str) -> Result<Arc<dyn Document>> {
        self.fs.same_file_system(collection)?;
        let revision = self.fs.next_revision();
        let path = {
            let mut nodes = self.fs.nodes();
            let content = match nodes.get(&self.path) {
                Some(node) if !node.access.read => {
                    return Err(Error::PermissionDenied(self.path.clone()));
                }
                Some(MemoryNode {
                    kind: NodeKind::Document { content, .. },
                    ..
                }) => content.clone(),
                _ => return Err(Error::NotFound(self.path.clone())),
            };
            let path = self.fs.check_destination(&nodes, collection.path(), name)?;
            nodes.insert(path.clone(), MemoryNode::document(content, revision));
            path
        };
        if let Some(store) = &self.fs.inner.properties {
            store.remove_prefix(&path);
            store.copy_prefix(&self.path, &path);
        }
        Ok(Arc::new(MemoryDocument {
            fs: self.fs.clone(),
            name: name.to_owned(),
            path,
        }))
    }

    async fn move_to(&self, collection: &dyn Collection, name: &str) -> Result<Arc<dyn Document>> {
        self.fs.same_file_system(collection)?;
        let path = {
            let mut nodes = self.fs.nodes();
            match nodes.get(&self.path) {
                Some(node) if !node.access.write => {
                    return Err(Error::PermissionDenied(self.path.clone()));
                }
                Some(node) if !node.is_collection() => {}
                _ => return Err(Error::NotFound(self.path.clone())),
            }
            let path = self.fs.check_destination(&nodes, collection.path(), name)?;
            if let Some(node) = nodes.remove(&self.path) {
                nodes.insert(path.clone(), node);
            }
            path
        };
        if let Some(store) = &self.fs.inner.properties {
            store.remove_prefix(&path);
            store.rename_prefix(&self.path, &path);
        }
        Ok(Arc::new(MemoryDocument {
            fs: self.fs.clone(),
            name: name.to_owned(),
            path,
        }))
    }
}

#[async_trait]
impl Node for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn file_system(&self) -> Arc<dyn FileSystem> {
        Arc::new(self.fs.clone())
    }

    async fn delete(&self) -> Result<()> {
        if self.path == "/" {
            return Err(Error::PermissionDenied(self.path.clone()));
        }
        {
            let mut nodes = self.fs.nodes();
            match nodes.get(&self.path) {
                Some(node) if !node.access.write => {
                    return Err(Error::PermissionDenied(self.path.clone()));
                }
                Some(_) => {}
                None => return Err(Error::NotFound(self.path.clone())),
            }
            let prefix = format!("{}/", self.path);
            nodes.retain(|key, _| key != &self.path && !key.starts_with(&prefix));
        }
        if let Some(store) = &self.fs.inner.properties {
            store.remove_prefix(&self.path);
        }
        Ok(())
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    async fn child(&self, name: &str) -> Result<Option<Entry>> {
        let path = join_path(&self.path, name);
        let is_collection = match self.fs.nodes().get(&path) {
            Some(node) => node.is_collection(),
            None => return Ok(None),
        };
        Ok(Some(self.fs.entry(path, is_collection)))
    }

    async fn children(&self) -> Result<Vec<Entry>> {
        let listing: Vec<(String, bool)> = {
            let nodes = self.fs.nodes();
            match nodes.get(&self.path) {
                Some(node) if !node.access.read => {
                    return Err(Error::PermissionDenied(self.path.clone()));
                }
                Some(_) => {}
                None => return Err(Error::NotFound(self.path.clone())),
            }
            let prefix = join_path(&self.path, "");
            nodes
                .range(prefix.clone()..)
                .take_while(|(key, _)| key.starts_with(&prefix))
                .filter(|(key, _)| {
                    let rest = &key[prefix.len()..];
                    !rest.is_empty() && !rest.contains('/')
                })
                .map(|(key, node)| (key.clone(), node.is_collection()))
                .collect()
        };
        Ok(listing
            .into_iter()
            .map(|(path, is_collection)| self.fs.entry(path, is_collection))
            .collect())
    }

    async fn create_document(&self, name: &str) -> Result<Arc<dyn Document>> {
        validate_name(name)?;
        let revision = self.fs.next_revision();
        let path = join_path(&self.path, name);
        {
            let mut nodes = self.fs.nodes();
            self.check_writable(&nodes)?;
            if nodes.contains_key(&path) {
                return Err(Error::AlreadyExists(path));
            }
            nodes.insert(path.clone(), MemoryNode::document(Bytes::new(), revision));
        }
        Ok(Arc::new(MemoryDocument {
            fs: self.fs.clone(),
            name: name.to_owned(),
            path,
        }))
    }

    async fn create_collection(&self, name: &str) -> Result<Arc<dyn Collection>> {
        validate_name(name)?;
        let path = join_path(&self.path, name);
        {
            let mut nodes = self.fs.nodes();
            self.check_writable(&nodes)?;
            if nodes.contains_key(&path) {
                return Err(Error::AlreadyExists(path));
            }
            nodes.insert(path.clone(), MemoryNode::collection());
        }
        Ok(Arc::new(MemoryCollection {
            fs: self.fs.clone(),
            name: name.to_owned(),
            path,
        }))
    }
}

impl MemoryCollection {
    fn check_writable(&self, nodes: &NodeMap) -> Result<()> {
        match nodes.get(&self.path) {
            Some(node) if node.access.write => Ok(()),
            Some(_) => Err(Error::PermissionDenied(self.path.clone())),
            None => Err(Error::NotFound(self.path.clone())),
        }
    }
}

/// Buffers a replacement body and swaps it in on shutdown.
struct MemoryWriter {
    fs: MemoryFileSystem,
    path: String,
    buf: Vec<u8>,
    committed: bool,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.buf.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.committed {
            return Poll::Ready(Ok(()));
        }
        let content = std::mem::take(&mut self.buf);
        let result = self.fs.commit(&self.path, content);
        if result.is_ok() {
            self.committed = true;
        }
        Poll::Ready(result)
    }
}

/// Dead properties keyed by path.
#[derive(Debug, Default)]
pub struct MemoryPropertyStore {
    entries: Mutex<BTreeMap<String, Vec<DeadProperty>>>,
}

impl MemoryPropertyStore {
    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, Vec<DeadProperty>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn matching(entries: &BTreeMap<String, Vec<DeadProperty>>, path: &str) -> Vec<String> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        entries
            .keys()
            .filter(|key| key.as_str() == path || key.starts_with(&prefix))
            .cloned()
            .collect()
    }

    fn remove_prefix(&self, path: &str) {
        let mut entries = self.entries();
        for key in Self::matching(&entries, path) {
            entries.remove(&key);
        }
    }

    fn copy_prefix(&self, from: &str, to: &str) {
        let mut entries = self.entries();
        for key in Self::matching(&entries, from) {
            if let Some(props) = entries.get(&key).cloned() {
                entries.insert(format!("{to}{}", &key[from.len()..]), props);
            }
        }
    }

    fn rename_prefix(&self, from: &str, to: &str) {
        let mut entries = self.entries();
        for key in Self::matching(&entries, from) {
            if let Some(props) = entries.remove(&key) {
                entries.insert(format!("{to}{}", &key[from.len()..]), props);
            }
        }
    }
}

#[async_trait]
impl PropertyStore for MemoryPropertyStore {
    async fn get(&self, path: &str) -> Result<Vec<DeadProperty>> {
        Ok(self.entries().get(path).cloned().unwrap_or_default())
    }

    async fn set(&self, path: &str, property: DeadProperty) -> Result<()> {
        let mut entries = self.entries();
        let props = entries.entry(path.to_owned()).or_default();
        match props.iter_mut().find(|p| p.name == property.name) {
            Some(existing) => existing.value = property.value,
            None => props.push(property),
        }
        Ok(())
    }

    async fn remove_all(&self, path: &str) -> Result<()> {
        self.entries().remove(path);
        Ok(())
    }
}

fn normalize(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

fn parent_path(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_owned(),
        Some(idx) => path[..idx].to_owned(),
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(Error::InvalidName(name.to_owned()));
    }
    Ok(())
}
