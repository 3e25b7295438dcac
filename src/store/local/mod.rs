//! Local file system backend.
//!
//! Paths handed to the engine are slash-separated and relative to the root
//! directory the file system was opened at. Names that could escape the root
//! are rejected.

mod atomic;

use super::{
    Collection, Document, EntityTag, Entry, FileSystem, FileSystemId, Node, PropertyStore,
    ReadStream, WriteStream, join_path, last_segment,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use atomic::AtomicWriter;
use filetime::FileTime;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Inner {
    root: PathBuf,
    id: FileSystemId,
    fsync: bool,
    preserve_timestamps: bool,
}

/// A directory on disk exposed as a WebDAV resource tree.
///
/// Documents report a native ETag built from their length and modification
/// time. There is no dead-property store.
///
/// # Example
///
/// ```no_run
/// use davcopy::LocalFileSystem;
///
/// let fs = LocalFileSystem::new("/srv/dav")?.without_fsync();
/// # Ok::<(), davcopy::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    inner: Arc<Inner>,
}

impl LocalFileSystem {
    /// Open the directory at `root`.
    ///
    /// The root is canonicalized so two instances opened on the same
    /// directory address the same files.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root =
            std::fs::canonicalize(root).map_err(|e| io_error(e, &root.display().to_string()))?;
        if !root.is_dir() {
            return Err(Error::NotFound(root.display().to_string()));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                root,
                id: FileSystemId::next(),
                fsync: true,
                preserve_timestamps: true,
            }),
        })
    }

    /// Skip fsync before committing a document
    #[must_use]
    pub fn without_fsync(mut self) -> Self {
        Arc::make_mut(&mut self.inner).fsync = false;
        self
    }

    /// Set whether native copies keep the source modification time
    #[must_use]
    pub fn with_timestamps(mut self, preserve: bool) -> Self {
        Arc::make_mut(&mut self.inner).preserve_timestamps = preserve;
        self
    }

    /// Root directory.
    pub fn root_path(&self) -> &Path {
        &self.inner.root
    }

    /// Location on disk of the slash-separated `path`.
    pub fn disk_path(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|s| !s.is_empty())
            .fold(self.inner.root.clone(), |acc, segment| acc.join(segment))
    }

    /// Slash-separated path of a location under the root.
    ///
    /// `location` must be absolute; it is not required to exist.
    pub fn entry_path(&self, location: &Path) -> Result<String> {
        let relative = location
            .strip_prefix(&self.inner.root)
            .map_err(|_| Error::NotFound(location.display().to_string()))?;
        let mut path = String::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => {
                    let segment = segment
                        .to_str()
                        .ok_or_else(|| Error::InvalidName(segment.to_string_lossy().into_owned()))?;
                    path.push('/');
                    path.push_str(segment);
                }
                Component::CurDir => {}
                _ => return Err(Error::InvalidName(relative.display().to_string())),
            }
        }
        if path.is_empty() {
            path.push('/');
        }
        Ok(path)
    }

    fn document(&self, path: String) -> Arc<dyn Document> {
        Arc::new(LocalDocument {
            fs: self.clone(),
            name: last_segment(&path).to_owned(),
            path,
        })
    }

    fn collection(&self, path: String) -> Arc<dyn Collection> {
        Arc::new(LocalCollection {
            fs: self.clone(),
            name: last_segment(&path).to_owned(),
            path,
        })
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
impl FileSystem for LocalFileSystem {
    fn id(&self) -> FileSystemId {
        self.inner.id
    }

    fn supports_etag(&self) -> bool {
        true
    }

    fn property_store(&self) -> Option<Arc<dyn PropertyStore>> {
        None
    }

    async fn root(&self) -> Result<Arc<dyn Collection>> {
        Ok(self.collection("/".to_owned()))
    }
}

/// Map an IO error onto the backend error naming `path`.
fn io_error(e: io::Error, path: &str) -> Error {
    match e.kind() {
        io::ErrorKind::NotFound => Error::NotFound(path.to_owned()),
        io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.to_owned()),
        io::ErrorKind::AlreadyExists => Error::AlreadyExists(path.to_owned()),
        _ => Error::Io(e),
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(Error::InvalidName(name.to_owned()));
    }
    Ok(())
}

#[derive(Debug)]
struct LocalDocument {
    fs: LocalFileSystem,
    name: String,
    path: String,
}

#[derive(Debug)]
struct LocalCollection {
    fs: LocalFileSystem,
    name: String,
    path: String,
}

impl LocalDocument {
    fn disk_path(&self) -> PathBuf {
        self.fs.disk_path(&self.path)
    }
}

impl LocalCollection {
    fn disk_path(&self) -> PathBuf {
        self.fs.disk_path(&self.path)
    }

    fn child_path(&self, name: &str) -> Result<(String, PathBuf)> {
        validate_name(name)?;
        let path = join_path(&self.path, name);
        let disk = self.fs.disk_path(&path);
        Ok((path, disk))
    }
}

#[async_trait]
impl Node for LocalDocument {
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
        tokio::fs::remove_file(self.disk_path())
            .await
            .map_err(|e| io_error(e, &self.path))
    }
}

#[async_trait]
impl Document for LocalDocument {
    async fn len(&self) -> Result<u64> {
        let meta = tokio::fs::metadata(self.disk_path())
            .await
            .map_err(|e| io_error(e, &self.path))?;
        Ok(meta.len())
    }

    async fn etag(&self) -> Result<Option<EntityTag>> {
        let meta = tokio::fs::metadata(self.disk_path())
            .await
            .map_err(|e| io_error(e, &self.path))?;
        let mtime = FileTime::from_last_modification_time(&meta);
        Ok(Some(EntityTag::strong(format!(
            "{:x}-{:x}.{:x}",
            meta.len(),
            mtime.unix_seconds(),
            mtime.nanoseconds()
        ))))
    }

    async fn open_read(&self) -> Result<ReadStream> {
        let file = tokio::fs::File::open(self.disk_path())
            .await
            .map_err(|e| io_error(e, &self.path))?;
        Ok(Box::new(file))
    }

    async fn open_write(&self) -> Result<WriteStream> {
        let writer = AtomicWriter::create(self.disk_path(), self.fs.inner.fsync)
            .await
            .map_err(|e| io_error(e, &self.path))?;
        Ok(Box::new(writer))
    }

    async fn copy_to(&self, collection: &dyn Collection, name: &str) -> Result<Arc<dyn Document>> {
        self.fs.same_file_system(collection)?;
        validate_name(name)?;
        let path = join_path(collection.path(), name);
        let src = self.disk_path();
        let dst = self.fs.disk_path(&path);
        let fsync = self.fs.inner.fsync;
        let timestamps = self.fs.inner.preserve_timestamps;
        tokio::task::spawn_blocking(move || atomic::copy_file(&src, &dst, fsync, timestamps))
            .await
            .map_err(io::Error::other)?
            .map_err(|e| io_error(e, &path))?;
        Ok(self.fs.document(path))
    }

    async fn move_to(&self, collection: &dyn Collection, name: &str) -> Result<Arc<dyn Document>> {
        self.fs.same_file_system(collection)?;
        validate_name(name)?;
        let path = join_path(collection.path(), name);
        let dst = self.fs.disk_path(&path);
        if tokio::fs::metadata(&dst).await.is_ok_and(|m| m.is_dir()) {
            return Err(Error::AlreadyExists(path));
        }
        tokio::fs::rename(self.disk_path(), &dst)
            .await
            .map_err(|e| io_error(e, &self.path))?;
        Ok(self.fs.document(path))
    }
}

#[async_trait]
impl Node for LocalCollection {
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
        tokio::fs::remove_dir_all(self.disk_path())
            .await
            .map_err(|e| io_error(e, &self.path))
    }
}

#[async_trait]
impl Collection for LocalCollection {
    async fn child(&self, name: &str) -> Result<Option<Entry>> {
        let (path, disk) = self.child_path(name)?;
        match tokio::fs::metadata(&disk).await {
            Ok(meta) if meta.is_dir() => Ok(Some(Entry::Collection(self.fs.collection(path)))),
            Ok(_) => Ok(Some(Entry::Document(self.fs.document(path)))),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(io_error(e, &path)),
        }
    }

    async fn children(&self) -> Result<Vec<Entry>> {
        let mut dir = tokio::fs::read_dir(self.disk_path())
            .await
            .map_err(|e| io_error(e, &self.path))?;
        let mut listing = Vec::new();
        while let Some(item) = dir.next_entry().await.map_err(|e| io_error(e, &self.path))? {
            // Names that are not valid UTF-8 cannot be addressed by a URL path
            let Ok(name) = item.file_name().into_string() else {
                continue;
            };
            let path = join_path(&self.path, &name);
            let meta = tokio::fs::metadata(item.path())
                .await
                .map_err(|e| io_error(e, &path))?;
            listing.push((name, path, meta.is_dir()));
        }
        listing.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(listing
            .into_iter()
            .map(|(_, path, is_dir)| {
                if is_dir {
                    Entry::Collection(self.fs.collection(path))
                } else {
                    Entry::Document(self.fs.document(path))
                }
            })
            .collect())
    }

    async fn create_document(&self, name: &str) -> Result<Arc<dyn Document>> {
        let (path, disk) = self.child_path(name)?;
        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&disk)
            .await
            .map_err(|e| io_error(e, &path))?;
        Ok(self.fs.document(path))
    }

    async fn create_collection(&self, name: &str) -> Result<Arc<dyn Collection>> {
        let (path, disk) = self.child_path(name)?;
        tokio::fs::create_dir(&disk)
            .await
            .map_err(|e| io_error(e, &path))?;
        Ok(self.fs.collection(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::lookup;
    use std::fs;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn document(fs: &LocalFileSystem, path: &str) -> Arc<dyn Document> {
        match lookup(fs, path).await.unwrap().unwrap() {
            Entry::Document(d) => d,
            Entry::Collection(_) => panic!("{path} is a collection"),
        }
    }

    async fn collection(fs: &LocalFileSystem, path: &str) -> Arc<dyn Collection> {
        match lookup(fs, path).await.unwrap().unwrap() {
            Entry::Collection(c) => c,
            Entry::Document(_) => panic!("{path} is a document"),
        }
    }

    #[tokio::test]
    async fn test_children_sorted_with_kinds() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let local = LocalFileSystem::new(dir.path()).unwrap();
        let children = local.root().await.unwrap().children().await.unwrap();
        let listing: Vec<_> = children
            .iter()
            .map(|e| (e.path().to_owned(), e.is_collection()))
            .collect();
        assert_eq!(
            listing,
            [
                ("/a.txt".to_owned(), false),
                ("/b.txt".to_owned(), false),
                ("/sub".to_owned(), true)
            ]
        );
    }

    #[tokio::test]
    async fn test_rejects_escaping_names() {
        let dir = tempdir().unwrap();
        let local = LocalFileSystem::new(dir.path()).unwrap();
        let root = local.root().await.unwrap();
        for name in ["..", ".", "a/b", "a\\b", ""] {
            assert!(
                matches!(root.create_document(name).await, Err(Error::InvalidName(_))),
                "{name:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_write_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let local = LocalFileSystem::new(dir.path()).unwrap();
        let root = local.root().await.unwrap();
        let doc = root.create_document("doc.txt").await.unwrap();

        let mut writer = doc.open_write().await.unwrap();
        writer.write_all(b"on disk").await.unwrap();
        writer.shutdown().await.unwrap();

        let mut content = String::new();
        doc.open_read()
            .await
            .unwrap()
            .read_to_string(&mut content)
            .await
            .unwrap();
        assert_eq!(content, "on disk");
        assert_eq!(doc.len().await.unwrap(), 7);
        assert!(doc.etag().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_native_copy_and_move() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::create_dir(dir.path().join("dst")).unwrap();
        fs::write(dir.path().join("src/a.txt"), "alpha").unwrap();

        let local = LocalFileSystem::new(dir.path()).unwrap();
        let dst = collection(&local, "/dst").await;
        let copied = document(&local, "/src/a.txt")
            .await
            .copy_to(dst.as_ref(), "b.txt")
            .await
            .unwrap();
        assert_eq!(copied.path(), "/dst/b.txt");
        assert_eq!(fs::read_to_string(dir.path().join("dst/b.txt")).unwrap(), "alpha");

        document(&local, "/src/a.txt")
            .await
            .move_to(dst.as_ref(), "c.txt")
            .await
            .unwrap();
        assert!(!dir.path().join("src/a.txt").exists());
        assert_eq!(fs::read_to_string(dir.path().join("dst/c.txt")).unwrap(), "alpha");
    }

    #[tokio::test]
    async fn test_native_copy_rejects_other_instance() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let first = LocalFileSystem::new(dir.path()).unwrap();
        let second = LocalFileSystem::new(dir.path()).unwrap();
        let root = second.root().await.unwrap();
        let err = document(&first, "/a.txt")
            .await
            .copy_to(root.as_ref(), "b.txt")
            .await
            .unwrap_err();
        assert!(err.is_not_supported());
    }

    #[tokio::test]
    async fn test_child_of_missing_or_document() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        let local = LocalFileSystem::new(dir.path()).unwrap();
        assert!(lookup(&local, "/missing").await.unwrap().is_none());
        assert!(lookup(&local, "/a.txt/b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_root_is_denied() {
        let dir = tempdir().unwrap();
        let local = LocalFileSystem::new(dir.path()).unwrap();
        assert!(matches!(
            local.root().await.unwrap().delete().await,
            Err(Error::PermissionDenied(_))
        ));
        assert!(dir.path().exists());
    }

    #[test]
    fn test_entry_path_mapping() {
        let dir = tempdir().unwrap();
        let local = LocalFileSystem::new(dir.path()).unwrap();
        let root = local.root_path().to_path_buf();
        assert_eq!(local.entry_path(&root).unwrap(), "/");
        assert_eq!(local.entry_path(&root.join("a").join("b.txt")).unwrap(), "/a/b.txt");
        assert_eq!(local.disk_path("/a/b.txt"), root.join("a").join("b.txt"));
        assert!(local.entry_path(Path::new("/definitely/elsewhere")).is_err());
    }
}
