//! Same-backend strategies built on the native copy/move primitives.

use super::{RecursiveTargetBehaviour, TransferActions, stream_copy, stream_to_missing};
use crate::error::{Error, Result};
use crate::result::{ActionResult, ActionStatus, CollectionActionResult};
use crate::store::{Collection, Document};
use crate::target::{CollectionTarget, DocumentHandle, DocumentTarget, MissingTarget};
use async_trait::async_trait;
use std::sync::Arc;

fn parent_collection(parent: &CollectionTarget) -> Result<&Arc<dyn Collection>> {
    parent
        .local_collection()
        .ok_or(Error::NotSupported("native transfer to a remote collection"))
}

fn local_document(target: &DocumentTarget) -> Result<&Arc<dyn Document>> {
    match target.handle() {
        DocumentHandle::Local(document) => Ok(document),
        DocumentHandle::Remote(_) => Err(Error::NotSupported(
            "native transfer to a remote document",
        )),
    }
}

/// COPY within one backend using [`Document::copy_to`].
///
/// Falls back to a stream copy when the backend has no native copy.
#[derive(Debug, Clone)]
pub struct CopyInFileSystem {
    buffer_size: usize,
}

impl CopyInFileSystem {
    /// Create the strategy; `buffer_size` is used by the stream fallback.
    pub fn new(buffer_size: usize) -> Self {
        Self { buffer_size }
    }

    async fn overwrite(&self, source: &Arc<dyn Document>, target: &DocumentTarget) -> Result<()> {
        let parent = parent_collection(target.parent())?;
        match source.copy_to(parent.as_ref(), target.name()).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_supported() => {
                stream_copy(source.as_ref(), local_document(target)?.as_ref(), self.buffer_size)
                    .await
                    .map(drop)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TransferActions for CopyInFileSystem {
    fn existing_target_behaviour(&self) -> RecursiveTargetBehaviour {
        RecursiveTargetBehaviour::Overwrite
    }

    async fn transfer_to_missing(
        &self,
        source: &Arc<dyn Document>,
        target: MissingTarget,
    ) -> Result<DocumentTarget> {
        let parent = parent_collection(target.parent())?;
        match source.copy_to(parent.as_ref(), target.name()).await {
            Ok(document) => Ok(target.into_document(DocumentHandle::Local(document))),
            Err(e) if e.is_not_supported() => {
                stream_to_missing(source, target, self.buffer_size).await
            }
            Err(e) => Err(e),
        }
    }

    async fn transfer_to_document(
        &self,
        source: &Arc<dyn Document>,
        target: &DocumentTarget,
    ) -> ActionResult {
        let href = target.url().clone();
        match self.overwrite(source, target).await {
            Ok(()) => ActionResult::new(ActionStatus::Overwritten, href),
            Err(e) => ActionResult::failed(ActionStatus::OverwriteFailed, href, e),
        }
    }
}

/// MOVE within one backend using [`Document::move_to`].
///
/// Collections are recreated at the destination and the source collection is
/// removed in [`cleanup`](TransferActions::cleanup), but only when every
/// descendant arrived.
#[derive(Debug, Clone)]
pub struct MoveInFileSystem {
    buffer_size: usize,
}

impl MoveInFileSystem {
    /// Create the strategy; `buffer_size` is used by the stream fallback.
    pub fn new(buffer_size: usize) -> Self {
        Self { buffer_size }
    }

    async fn move_into(
        &self,
        source: &Arc<dyn Document>,
        parent: &CollectionTarget,
        name: &str,
    ) -> Result<Option<Arc<dyn Document>>> {
        let collection = parent_collection(parent)?;
        match source.move_to(collection.as_ref(), name).await {
            Ok(document) => Ok(Some(document)),
            Err(e) if e.is_not_supported() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TransferActions for MoveInFileSystem {
    fn existing_target_behaviour(&self) -> RecursiveTargetBehaviour {
        RecursiveTargetBehaviour::DeleteTarget
    }

    async fn transfer_to_missing(
        &self,
        source: &Arc<dyn Document>,
        target: MissingTarget,
    ) -> Result<DocumentTarget> {
        if let Some(document) = self.move_into(source, target.parent(), target.name()).await? {
            return Ok(target.into_document(DocumentHandle::Local(document)));
        }
        // The source is removed in finish_document once properties arrived
        stream_to_missing(source, target, self.buffer_size).await
    }

    async fn transfer_to_document(
        &self,
        source: &Arc<dyn Document>,
        target: &DocumentTarget,
    ) -> ActionResult {
        let href = target.url().clone();
        let moved = match self.move_into(source, target.parent(), target.name()).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => match local_document(target) {
                Ok(document) => {
                    stream_copy(source.as_ref(), document.as_ref(), self.buffer_size)
                        .await
                        .map(drop)
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        match moved {
            Ok(()) => ActionResult::new(ActionStatus::Overwritten, href),
            Err(e) => ActionResult::failed(ActionStatus::OverwriteFailed, href, e),
        }
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

    /// Removes a source left behind by the stream fallback.
    async fn finish_document(
        &self,
        source: &Arc<dyn Document>,
        _result: &ActionResult,
    ) -> Result<()> {
        match source.delete().await {
            // Natively moved sources are already gone
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }
}
