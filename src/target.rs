//! Destination locations of a transfer.
//!
//! A [`Target`] is what currently lives at a destination URL: nothing
//! ([`MissingTarget`]), a document ([`DocumentTarget`]) or a collection
//! ([`CollectionTarget`]). Targets are projections created fresh for every
//! traversal step and consumed by the transitions below; nothing is cached.
//!
//! ```text
//! Missing    --create_collection--> Collection
//! Document   --delete-------------> Missing
//! Collection --delete-------------> Missing
//! Collection --resolve(name)------> Missing | Document | Collection
//! ```
//!
//! A target's handle is either a backend entry or a [`RemoteClient`]; remote
//! targets are addressed purely by URL.

use crate::error::{Error, Result};
use crate::properties::set_property;
use crate::remote::{RemoteClient, RemoteKind};
use crate::store::{Collection, DeadProperty, Document, Entry, FileSystem, FileSystemId, join_path};
use std::sync::Arc;
use url::Url;

/// Backend handle of an existing document.
#[derive(Debug, Clone)]
pub enum DocumentHandle {
    /// Entry of a local backend
    Local(Arc<dyn Document>),
    /// Resource on a WebDAV server
    Remote(RemoteClient),
}

/// Backend handle of an existing collection.
#[derive(Debug, Clone)]
pub enum CollectionHandle {
    /// Entry of a local backend
    Local(Arc<dyn Collection>),
    /// Collection on a WebDAV server
    Remote(RemoteClient),
}

/// Destination location, dispatched by pattern match.
#[derive(Debug)]
pub enum Target {
    /// Nothing exists at the location
    Missing(MissingTarget),
    /// A document exists at the location
    Document(DocumentTarget),
    /// A collection exists at the location
    Collection(Arc<CollectionTarget>),
}

/// A location with nothing at it.
#[derive(Debug)]
pub struct MissingTarget {
    name: String,
    url: Url,
    parent: Arc<CollectionTarget>,
}

/// An existing destination document.
#[derive(Debug)]
pub struct DocumentTarget {
    name: String,
    url: Url,
    handle: DocumentHandle,
    parent: Arc<CollectionTarget>,
}

/// An existing destination collection.
#[derive(Debug)]
pub struct CollectionTarget {
    name: String,
    url: Url,
    handle: CollectionHandle,
    created: bool,
    parent: Option<Arc<CollectionTarget>>,
}

/// URL of the child `name` below the collection URL `parent`.
///
/// Collection URLs end with a slash.
pub(crate) fn child_url(parent: &Url, name: &str, collection: bool) -> Result<Url> {
    let mut url = parent.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| Error::InvalidDestination(parent.clone()))?;
        segments.pop_if_empty().push(name);
        if collection {
            segments.push("");
        }
    }
    Ok(url)
}

fn with_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn without_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    let trimmed = url.path().trim_end_matches('/');
    if !trimmed.is_empty() {
        let path = trimmed.to_owned();
        url.set_path(&path);
    }
    url
}

async fn set_local_properties(entry: Entry, properties: &[DeadProperty]) -> Result<()> {
    for property in properties {
        set_property(&entry, property.clone()).await?;
    }
    Ok(())
}

impl Target {
    /// Resolve `path` on a backend.
    ///
    /// `base_url` is the URL of the backend root and must end with a slash.
    /// Every ancestor of `path` must be an existing collection.
    pub async fn local(fs: &dyn FileSystem, path: &str, base_url: &Url) -> Result<Target> {
        let base = with_trailing_slash(base_url);
        if base.cannot_be_a_base() {
            return Err(Error::InvalidDestination(base));
        }
        let mut parent = Arc::new(CollectionTarget {
            name: String::new(),
            url: base,
            handle: CollectionHandle::Local(fs.root().await?),
            created: false,
            parent: None,
        });

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((name, ancestors)) = segments.split_last() else {
            return Ok(Target::Collection(parent));
        };
        for segment in ancestors {
            match parent.resolve(segment).await? {
                Target::Collection(collection) => parent = collection,
                Target::Document(document) => {
                    return Err(Error::ParentNotCollection(document.url));
                }
                Target::Missing(missing) => {
                    return Err(Error::ParentNotFound(missing.url));
                }
            }
        }
        parent.resolve(name).await
    }

    /// Resolve `url` on a WebDAV server.
    ///
    /// The URL is kept exactly as given; the parent collection must exist.
    pub async fn remote(client: RemoteClient, url: Url) -> Result<Target> {
        if url.cannot_be_a_base() {
            return Err(Error::InvalidDestination(url));
        }
        let name = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
            .map(str::to_owned);

        let Some(name) = name else {
            // Server root: it can only be an existing collection
            return match client.stat(&url).await? {
                Some(RemoteKind::Collection) => Ok(Target::Collection(Arc::new(CollectionTarget {
                    name: String::new(),
                    url: with_trailing_slash(&url),
                    handle: CollectionHandle::Remote(client),
                    created: false,
                    parent: None,
                }))),
                _ => Err(Error::InvalidDestination(url)),
            };
        };

        let mut parent_url = url.clone();
        parent_url
            .path_segments_mut()
            .map_err(|_| Error::InvalidDestination(url.clone()))?
            .pop_if_empty()
            .pop()
            .push("");
        match client.stat(&parent_url).await? {
            Some(RemoteKind::Collection) => {}
            Some(RemoteKind::Document) => return Err(Error::ParentNotCollection(url)),
            None => return Err(Error::ParentNotFound(url)),
        }
        let parent = Arc::new(CollectionTarget {
            name: parent_url
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
                .unwrap_or_default()
                .to_owned(),
            url: parent_url,
            handle: CollectionHandle::Remote(client.clone()),
            created: false,
            parent: None,
        });

        Ok(match client.stat(&url).await? {
            None => Target::Missing(MissingTarget {
                name,
                url,
                parent,
            }),
            Some(RemoteKind::Document) => Target::Document(DocumentTarget {
                name,
                url,
                handle: DocumentHandle::Remote(client),
                parent,
            }),
            Some(RemoteKind::Collection) => Target::Collection(Arc::new(CollectionTarget {
                name,
                url: with_trailing_slash(&url),
                handle: CollectionHandle::Remote(client),
                created: false,
                parent: Some(parent),
            })),
        })
    }

    /// Last path segment of the location.
    pub fn name(&self) -> &str {
        match self {
            Target::Missing(t) => &t.name,
            Target::Document(t) => &t.name,
            Target::Collection(t) => &t.name,
        }
    }

    /// Fully-qualified destination URL.
    pub fn url(&self) -> &Url {
        match self {
            Target::Missing(t) => &t.url,
            Target::Document(t) => &t.url,
            Target::Collection(t) => &t.url,
        }
    }

    /// Returns true if nothing exists at the location.
    pub fn is_missing(&self) -> bool {
        matches!(self, Target::Missing(_))
    }

    /// Whether the backend holding the location computes ETags natively.
    pub fn supports_etag(&self) -> bool {
        match self {
            Target::Missing(t) => t.parent.supports_etag(),
            Target::Document(t) => t.supports_etag(),
            Target::Collection(t) => t.supports_etag(),
        }
    }

    /// Delete whatever exists at the location.
    pub async fn delete(self) -> Result<MissingTarget> {
        match self {
            Target::Missing(t) => Ok(t),
            Target::Document(t) => t.delete().await,
            Target::Collection(t) => t.delete().await,
        }
    }

    /// Backend identity and path, for local locations.
    pub(crate) fn location(&self) -> Option<(FileSystemId, String)> {
        match self {
            Target::Missing(t) => {
                let (id, parent) = t.parent.location()?;
                Some((id, join_path(&parent, &t.name)))
            }
            Target::Document(t) => match &t.handle {
                DocumentHandle::Local(d) => Some((d.file_system().id(), d.path().to_owned())),
                DocumentHandle::Remote(_) => None,
            },
            Target::Collection(t) => t.location(),
        }
    }

    /// Client of a remote location.
    pub(crate) fn remote_client(&self) -> Option<&RemoteClient> {
        let handle = match self {
            Target::Missing(t) => &t.parent.handle,
            Target::Document(t) => {
                return match &t.handle {
                    DocumentHandle::Remote(client) => Some(client),
                    DocumentHandle::Local(_) => None,
                };
            }
            Target::Collection(t) => &t.handle,
        };
        match handle {
            CollectionHandle::Remote(client) => Some(client),
            CollectionHandle::Local(_) => None,
        }
    }
}

impl MissingTarget {
    /// Name the location will get.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// URL of the location as a document.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// URL of the location as a collection.
    pub fn collection_url(&self) -> Url {
        with_trailing_slash(&self.url)
    }

    /// Collection the location belongs to.
    pub fn parent(&self) -> &Arc<CollectionTarget> {
        &self.parent
    }

    /// Create a collection at the location.
    pub async fn create_collection(self) -> Result<Arc<CollectionTarget>> {
        let url = self.collection_url();
        let handle = match &self.parent.handle {
            CollectionHandle::Local(parent) => {
                CollectionHandle::Local(parent.create_collection(&self.name).await?)
            }
            CollectionHandle::Remote(client) => {
                client.mkcol(&url).await?;
                CollectionHandle::Remote(client.clone())
            }
        };
        Ok(Arc::new(CollectionTarget {
            name: self.name,
            url,
            handle,
            created: true,
            parent: Some(self.parent),
        }))
    }

    /// Create an empty document at the location (local backends only).
    pub async fn create_document(&self) -> Result<Arc<dyn Document>> {
        match &self.parent.handle {
            CollectionHandle::Local(parent) => parent.create_document(&self.name).await,
            CollectionHandle::Remote(_) => Err(Error::NotSupported("remote document creation")),
        }
    }

    /// The document that now exists at the location.
    pub fn into_document(self, handle: DocumentHandle) -> DocumentTarget {
        DocumentTarget {
            name: self.name,
            url: self.url,
            handle,
            parent: self.parent,
        }
    }
}

impl DocumentTarget {
    /// Last path segment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Backend handle.
    pub fn handle(&self) -> &DocumentHandle {
        &self.handle
    }

    /// Collection the document belongs to.
    pub fn parent(&self) -> &Arc<CollectionTarget> {
        &self.parent
    }

    /// Whether the document's backend computes ETags natively.
    pub fn supports_etag(&self) -> bool {
        match &self.handle {
            DocumentHandle::Local(d) => d.file_system().supports_etag(),
            DocumentHandle::Remote(_) => true,
        }
    }

    /// Delete the document.
    pub async fn delete(self) -> Result<MissingTarget> {
        match &self.handle {
            DocumentHandle::Local(d) => d.delete().await?,
            DocumentHandle::Remote(client) => client.delete(&self.url).await?,
        }
        Ok(MissingTarget {
            name: self.name,
            url: self.url,
            parent: self.parent,
        })
    }

    /// Write dead properties.
    pub async fn set_properties(&self, properties: &[DeadProperty]) -> Result<()> {
        match &self.handle {
            DocumentHandle::Local(d) => {
                set_local_properties(Entry::Document(d.clone()), properties).await
            }
            DocumentHandle::Remote(client) => client.proppatch(&self.url, properties).await,
        }
    }
}

impl CollectionTarget {
    /// Last path segment (empty for a root).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified URL, ending with a slash.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Backend handle.
    pub fn handle(&self) -> &CollectionHandle {
        &self.handle
    }

    /// Returns true if the collection was created during this transfer.
    pub fn created(&self) -> bool {
        self.created
    }

    /// Parent collection, if known.
    pub fn parent(&self) -> Option<&Arc<CollectionTarget>> {
        self.parent.as_ref()
    }

    /// The local collection, if this is not a remote target.
    pub fn local_collection(&self) -> Option<&Arc<dyn Collection>> {
        match &self.handle {
            CollectionHandle::Local(c) => Some(c),
            CollectionHandle::Remote(_) => None,
        }
    }

    /// Whether the collection's backend computes ETags natively.
    pub fn supports_etag(&self) -> bool {
        match &self.handle {
            CollectionHandle::Local(c) => c.file_system().supports_etag(),
            CollectionHandle::Remote(_) => true,
        }
    }

    /// Resolve the child `name`, querying the backend every time.
    pub async fn resolve(self: &Arc<Self>, name: &str) -> Result<Target> {
        match &self.handle {
            CollectionHandle::Local(collection) => Ok(match collection.child(name).await? {
                None => Target::Missing(self.missing_child(name)?),
                Some(Entry::Document(document)) => Target::Document(DocumentTarget {
                    name: name.to_owned(),
                    url: child_url(&self.url, name, false)?,
                    handle: DocumentHandle::Local(document),
                    parent: self.clone(),
                }),
                Some(Entry::Collection(child)) => Target::Collection(Arc::new(CollectionTarget {
                    name: name.to_owned(),
                    url: child_url(&self.url, name, true)?,
                    handle: CollectionHandle::Local(child),
                    created: false,
                    parent: Some(self.clone()),
                })),
            }),
            CollectionHandle::Remote(client) => {
                let url = child_url(&self.url, name, false)?;
                Ok(match client.stat(&url).await? {
                    None => Target::Missing(self.missing_child(name)?),
                    Some(RemoteKind::Document) => Target::Document(DocumentTarget {
                        name: name.to_owned(),
                        url,
                        handle: DocumentHandle::Remote(client.clone()),
                        parent: self.clone(),
                    }),
                    Some(RemoteKind::Collection) => {
                        Target::Collection(Arc::new(CollectionTarget {
                            name: name.to_owned(),
                            url: child_url(&self.url, name, true)?,
                            handle: CollectionHandle::Remote(client.clone()),
                            created: false,
                            parent: Some(self.clone()),
                        }))
                    }
                })
            }
        }
    }

    /// A missing child location, without consulting the backend.
    pub fn missing_child(self: &Arc<Self>, name: &str) -> Result<MissingTarget> {
        Ok(MissingTarget {
            name: name.to_owned(),
            url: child_url(&self.url, name, false)?,
            parent: self.clone(),
        })
    }

    /// Delete the collection and everything below it.
    ///
    /// A root collection cannot be deleted.
    pub async fn delete(self: Arc<Self>) -> Result<MissingTarget> {
        let Some(parent) = self.parent.clone() else {
            return Err(Error::PermissionDenied(self.url.to_string()));
        };
        match &self.handle {
            CollectionHandle::Local(c) => c.delete().await?,
            CollectionHandle::Remote(client) => client.delete(&self.url).await?,
        }
        Ok(MissingTarget {
            name: self.name.clone(),
            url: without_trailing_slash(&self.url),
            parent,
        })
    }

    /// Write dead properties.
    pub async fn set_properties(&self, properties: &[DeadProperty]) -> Result<()> {
        match &self.handle {
            CollectionHandle::Local(c) => {
                set_local_properties(Entry::Collection(c.clone()), properties).await
            }
            CollectionHandle::Remote(client) => client.proppatch(&self.url, properties).await,
        }
    }

    fn location(&self) -> Option<(FileSystemId, String)> {
        match &self.handle {
            CollectionHandle::Local(c) => Some((c.file_system().id(), c.path().to_owned())),
            CollectionHandle::Remote(_) => None,
        }
    }
}
