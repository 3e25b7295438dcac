//! Strategies for moving bytes between two backends through streams.

use super::{
    RecursiveTargetBehaviour, TransferActions, properties_with_etag, stream_copy,
    stream_to_missing,
};
use crate::error::{Error, Result};
use crate::result::{ActionResult, ActionStatus, CollectionActionResult};
use crate::store::{Collection, DeadProperty, Document, Entry};
use crate::target::{CollectionTarget, DocumentHandle, DocumentTarget, MissingTarget};
use async_trait::async_trait;
use std::sync::Arc;

async fn overwrite(
    source: &Arc<dyn Document>,
    target: &DocumentTarget,
    buffer_size: usize,
) -> ActionResult {
    let href = target.url().clone();
    let copied = match target.handle() {
        DocumentHandle::Local(document) => {
            stream_copy(source.as_ref(), document.as_ref(), buffer_size).await
        }
        DocumentHandle::Remote(_) => Err(Error::NotSupported("stream copy to a remote document")),
    };
    match copied {
        Ok(_) => ActionResult::new(ActionStatus::Overwritten, href),
        Err(e) => ActionResult::failed(ActionStatus::OverwriteFailed, href, e),
    }
}

/// COPY between two backends.
///
/// Content is streamed through a bounded buffer. When the destination cannot
/// compute ETags, the source ETag travels along as a `DAV:getetag` dead
/// property.
#[derive(Debug, Clone)]
pub struct CopyBetweenFileSystems {
    buffer_size: usize,
}

impl CopyBetweenFileSystems {
    /// Create the strategy with the stream buffer size.
    pub fn new(buffer_size: usize) -> Self {
        Self { buffer_size }
    }
}

#[async_trait]
impl TransferActions for CopyBetweenFileSystems {
    fn existing_target_behaviour(&self) -> RecursiveTargetBehaviour {
        RecursiveTargetBehaviour::Overwrite
    }

    async fn transfer_to_missing(
        &self,
        source: &Arc<dyn Document>,
        target: MissingTarget,
    ) -> Result<DocumentTarget> {
        stream_to_missing(source, target, self.buffer_size).await
    }

    async fn transfer_to_document(
        &self,
        source: &Arc<dyn Document>,
        target: &DocumentTarget,
    ) -> ActionResult {
        overwrite(source, target, self.buffer_size).await
    }

    async fn transferred_properties(
        &self,
        source: &Entry,
        target_supports_etag: bool,
    ) -> Result<Vec<DeadProperty>> {
        properties_with_etag(source, target_supports_etag).await
    }
}

/// MOVE between two backends.
///
/// Nothing can be atomic across backends, so each source document is deleted
/// as soon as it and its properties arrived. Source collections are removed
/// once their whole subtree arrived.
#[derive(Debug, Clone)]
pub struct MoveBetweenFileSystems {
    buffer_size: usize,
}

impl MoveBetweenFileSystems {
    /// Create the strategy with the stream buffer size.
    pub fn new(buffer_size: usize) -> Self {
        Self { buffer_size }
    }
}

#[async_trait]
impl TransferActions for MoveBetweenFileSystems {
    fn existing_target_behaviour(&self) -> RecursiveTargetBehaviour {
        RecursiveTargetBehaviour::DeleteTarget
    }

    async fn transfer_to_missing(
        &self,
        source: &Arc<dyn Document>,
        target: MissingTarget,
    ) -> Result<DocumentTarget> {
        stream_to_missing(source, target, self.buffer_size).await
    }

    async fn transfer_to_document(
        &self,
        source: &Arc<dyn Document>,
        target: &DocumentTarget,
    ) -> ActionResult {
        overwrite(source, target, self.buffer_size).await
    }

    async fn cleanup(
        &self,
        source: &Arc<dyn Collection>,
        _target: &CollectionTarget,
        results: &CollectionActionResult,
    ) -> Result<()> {
        if results.result.is_failure() || results.has_incomplete_children() {
            return Ok(());
        }
        source.delete().await
    }

    async fn transferred_properties(
        &self,
        source: &Entry,
        target_supports_etag: bool,
    ) -> Result<Vec<DeadProperty>> {
        properties_with_etag(source, target_supports_etag).await
    }

    async fn finish_document(
        &self,
        source: &Arc<dyn Document>,
        _result: &ActionResult,
    ) -> Result<()> {
        source.delete().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryFileSystem, NodeAccess};
    use crate::target::Target;
    use url::Url;

    fn base() -> Url {
        Url::parse("http://example.com/").unwrap()
    }

    fn document(fs: &MemoryFileSystem, path: &str) -> Arc<dyn Document> {
        match fs.lookup(path) {
            Some(Entry::Document(d)) => d,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_copy_streams_into_other_backend() {
        let src = MemoryFileSystem::new();
        let dst = MemoryFileSystem::new();
        src.write("/a.txt", "x".repeat(1000)).unwrap();
        let Target::Missing(missing) = Target::local(&dst, "/a.txt", &base()).await.unwrap() else {
            panic!("expected missing");
        };
        CopyBetweenFileSystems::new(16)
            .transfer_to_missing(&document(&src, "/a.txt"), missing)
            .await
            .unwrap();
        assert_eq!(dst.read("/a.txt").unwrap().len(), 1000);
    }

    #[tokio::test]
    async fn test_failed_stream_removes_created_document() {
        let src = MemoryFileSystem::new();
        let dst = MemoryFileSystem::new();
        src.write("/a.txt", "secret").unwrap();
        src.set_access("/a.txt", NodeAccess::NONE).unwrap();
        let Target::Missing(missing) = Target::local(&dst, "/a.txt", &base()).await.unwrap() else {
            panic!("expected missing");
        };
        let err = CopyBetweenFileSystems::new(16)
            .transfer_to_missing(&document(&src, "/a.txt"), missing)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
        assert!(!dst.exists("/a.txt"));
    }

    #[tokio::test]
    async fn test_move_finish_deletes_source() {
        let src = MemoryFileSystem::new();
        src.write("/a.txt", "a").unwrap();
        let source = document(&src, "/a.txt");
        let result = ActionResult::new(ActionStatus::Created, base().join("a.txt").unwrap());
        MoveBetweenFileSystems::new(16)
            .finish_document(&source, &result)
            .await
            .unwrap();
        assert!(!src.exists("/a.txt"));
    }

    #[tokio::test]
    async fn test_etag_travels_only_without_native_support() {
        let src = MemoryFileSystem::new();
        src.write("/a.txt", "a").unwrap();
        let entry = src.lookup("/a.txt").unwrap();
        let actions = CopyBetweenFileSystems::new(16);

        let props = actions.transferred_properties(&entry, false).await.unwrap();
        assert!(props.iter().any(|p| p.name.is_getetag()));
        let props = actions.transferred_properties(&entry, true).await.unwrap();
        assert!(props.is_empty());
    }
}
