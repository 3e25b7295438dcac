//! Transfer strategies.
//!
//! A [`TransferActions`] implementation knows *how* bytes move for one
//! source/destination pairing; the engine decides *what* happens to each
//! [`Target`]. Five strategies cover every pairing:
//!
//! | Strategy | Pairing | Existing targets |
//! |----------|---------|------------------|
//! | [`CopyInFileSystem`] | same backend | overwritten in place |
//! | [`MoveInFileSystem`] | same backend | deleted first |
//! | [`CopyBetweenFileSystems`] | two backends | overwritten in place |
//! | [`MoveBetweenFileSystems`] | two backends | deleted first |
//! | [`RemoteCopy`] / [`RemoteMove`] | backend to WebDAV server | overwritten / deleted first |
//!
//! Use [`select_actions`] to pick the right one.

mod between;
mod local;
mod remote;

pub use between::{CopyBetweenFileSystems, MoveBetweenFileSystems};
pub use local::{CopyInFileSystem, MoveInFileSystem};
pub use remote::{RemoteCopy, RemoteMove};

use crate::error::Result;
use crate::options::{TransferKind, TransferOptions};
use crate::properties::{dead_properties, get_etag};
use crate::result::{ActionResult, CollectionActionResult};
use crate::store::{Collection, DeadProperty, Document, Entry};
use crate::target::{CollectionTarget, DocumentTarget, MissingTarget, Target};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};

/// How a strategy treats a destination that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecursiveTargetBehaviour {
    /// Replace documents in place and merge into existing collections
    Overwrite,
    /// Delete the existing destination before transferring
    DeleteTarget,
}

/// Transfer primitives for one source/destination pairing.
///
/// Implementations must never let a failure on one item escape as a panic;
/// every fallible step returns a [`Result`] the engine records per item.
#[async_trait]
pub trait TransferActions: Send + Sync + fmt::Debug {
    /// Treatment of existing destinations below the root.
    fn existing_target_behaviour(&self) -> RecursiveTargetBehaviour;

    /// Create `target` as a copy of `source`.
    async fn transfer_to_missing(
        &self,
        source: &Arc<dyn Document>,
        target: MissingTarget,
    ) -> Result<DocumentTarget>;

    /// Replace the content of `target` with `source`.
    ///
    /// Never fails: a failure is reported as
    /// [`OverwriteFailed`](crate::ActionStatus::OverwriteFailed).
    async fn transfer_to_document(
        &self,
        source: &Arc<dyn Document>,
        target: &DocumentTarget,
    ) -> ActionResult;

    /// Prepare the destination collection before its children are processed.
    ///
    /// `target` is either missing (create it) or an existing collection.
    async fn enter(
        &self,
        source: &Arc<dyn Collection>,
        target: Target,
    ) -> Result<Arc<CollectionTarget>> {
        let _ = source;
        match target {
            Target::Collection(collection) => Ok(collection),
            Target::Missing(missing) => missing.create_collection().await,
            Target::Document(document) => {
                Err(crate::Error::AlreadyExists(document.url().to_string()))
            }
        }
    }

    /// Called once every child of a collection has been processed.
    async fn cleanup(
        &self,
        source: &Arc<dyn Collection>,
        target: &CollectionTarget,
        results: &CollectionActionResult,
    ) -> Result<()> {
        let _ = (source, target, results);
        Ok(())
    }

    /// Dead properties to write on the destination of `source`.
    async fn transferred_properties(
        &self,
        source: &Entry,
        target_supports_etag: bool,
    ) -> Result<Vec<DeadProperty>> {
        let _ = target_supports_etag;
        dead_properties(source).await
    }

    /// Called after a document and its properties arrived.
    async fn finish_document(
        &self,
        source: &Arc<dyn Document>,
        result: &ActionResult,
    ) -> Result<()> {
        let _ = (source, result);
        Ok(())
    }
}

/// Pick the strategy for `kind` between `source` and `destination`.
///
/// Remote destinations get the HTTP strategies; a destination on the same
/// backend as the source gets the native ones.
pub fn select_actions(
    kind: TransferKind,
    source: &Entry,
    destination: &Target,
    options: &TransferOptions,
) -> Arc<dyn TransferActions> {
    let buffer_size = options.buffer_size;
    if let Some(client) = destination.remote_client() {
        return match kind {
            TransferKind::Copy => Arc::new(RemoteCopy::new(client.clone(), buffer_size)),
            TransferKind::Move => Arc::new(RemoteMove::new(client.clone(), buffer_size)),
        };
    }
    let same_backend = destination
        .location()
        .is_some_and(|(id, _)| id == source.file_system().id());
    match (kind, same_backend) {
        (TransferKind::Copy, true) => Arc::new(CopyInFileSystem::new(buffer_size)),
        (TransferKind::Move, true) => Arc::new(MoveInFileSystem::new(buffer_size)),
        (TransferKind::Copy, false) => Arc::new(CopyBetweenFileSystems::new(buffer_size)),
        (TransferKind::Move, false) => Arc::new(MoveBetweenFileSystems::new(buffer_size)),
    }
}

/// Copy the content of `source` into `target` through a bounded buffer.
///
/// The write is committed by shutting the write stream down; both streams
/// are dropped on every exit path.
pub(crate) async fn stream_copy(
    source: &dyn Document,
    target: &dyn Document,
    buffer_size: usize,
) -> Result<u64> {
    let mut reader = BufReader::with_capacity(buffer_size, source.open_read().await?);
    let mut writer = target.open_write().await?;
    let bytes = tokio::io::copy_buf(&mut reader, &mut writer).await?;
    writer.shutdown().await?;
    Ok(bytes)
}

/// Dead properties plus the source ETag when the destination cannot compute one.
pub(crate) async fn properties_with_etag(
    source: &Entry,
    target_supports_etag: bool,
) -> Result<Vec<DeadProperty>> {
    let mut properties = dead_properties(source).await?;
    if !target_supports_etag {
        if let Some(etag) = get_etag(source).await? {
            properties.push(DeadProperty::etag(&etag));
        }
    }
    Ok(properties)
}

/// Copy `source` into a freshly created document at `target`.
///
/// The empty document is removed again if the copy fails.
pub(crate) async fn stream_to_missing(
    source: &Arc<dyn Document>,
    target: MissingTarget,
    buffer_size: usize,
) -> Result<DocumentTarget> {
    let document = target.create_document().await?;
    if let Err(e) = stream_copy(source.as_ref(), document.as_ref(), buffer_size).await {
        let _ = document.delete().await;
        return Err(e);
    }
    Ok(target.into_document(crate::target::DocumentHandle::Local(document)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EntityTag, FileSystem, MemoryFileSystem, PropertyName, PropertyStore};
    use url::Url;

    fn base() -> Url {
        Url::parse("http://example.com/").unwrap()
    }

    #[tokio::test]
    async fn test_select_actions_by_locality() {
        let fs = MemoryFileSystem::new();
        let other = MemoryFileSystem::new();
        fs.write("/a.txt", "a").unwrap();
        let source = fs.lookup("/a.txt").unwrap();
        let options = TransferOptions::default();

        let same = Target::local(&fs, "/b.txt", &base()).await.unwrap();
        let actions = select_actions(TransferKind::Copy, &source, &same, &options);
        assert!(format!("{actions:?}").starts_with("CopyInFileSystem"));
        let actions = select_actions(TransferKind::Move, &source, &same, &options);
        assert_eq!(
            actions.existing_target_behaviour(),
            RecursiveTargetBehaviour::DeleteTarget
        );

        let across = Target::local(&other, "/b.txt", &base()).await.unwrap();
        let actions = select_actions(TransferKind::Copy, &source, &across, &options);
        assert!(format!("{actions:?}").starts_with("CopyBetweenFileSystems"));
        let actions = select_actions(TransferKind::Move, &source, &across, &options);
        assert!(format!("{actions:?}").starts_with("MoveBetweenFileSystems"));
    }

    #[tokio::test]
    async fn test_stream_copy_commits() {
        let fs = MemoryFileSystem::new();
        let other = MemoryFileSystem::new();
        fs.write("/a.txt", "payload").unwrap();
        other.write("/b.txt", "old").unwrap();
        let (Some(Entry::Document(a)), Some(Entry::Document(b))) =
            (fs.lookup("/a.txt"), other.lookup("/b.txt"))
        else {
            panic!("expected documents");
        };
        assert_eq!(stream_copy(a.as_ref(), b.as_ref(), 2).await.unwrap(), 7);
        assert_eq!(other.read("/b.txt").unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_properties_with_etag() {
        let fs = MemoryFileSystem::new();
        fs.write("/a.txt", "a").unwrap();
        fs.properties()
            .unwrap()
            .set("/a.txt", DeadProperty::new(PropertyName::new("urn:x", "k"), "v"))
            .await
            .unwrap();
        let source = fs.lookup("/a.txt").unwrap();
        let Entry::Document(doc) = &source else {
            panic!("expected document");
        };
        let etag: EntityTag = doc.etag().await.unwrap().unwrap();

        let with = properties_with_etag(&source, false).await.unwrap();
        assert_eq!(with.len(), 2);
        assert!(with.contains(&DeadProperty::etag(&etag)));

        let without = properties_with_etag(&source, true).await.unwrap();
        assert_eq!(without.len(), 1);
        assert!(fs.supports_etag());
    }
}
