//! Strategies that upload to a WebDAV server.
//!
//! The destination is addressed purely by URL. Documents are sent with `PUT`
//! and streamed straight from the source reader; collections are created with
//! `MKCOL` by the default [`enter`](TransferActions::enter).

use super::{RecursiveTargetBehaviour, TransferActions};
use crate::error::Result;
use crate::remote::RemoteClient;
use crate::result::{ActionResult, ActionStatus, CollectionActionResult};
use crate::store::{Collection, Document};
use crate::target::{CollectionTarget, DocumentHandle, DocumentTarget, MissingTarget};
use async_trait::async_trait;
use reqwest::Body;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use url::Url;

async fn upload(
    client: &RemoteClient,
    source: &Arc<dyn Document>,
    url: &Url,
    buffer_size: usize,
) -> Result<bool> {
    let reader = source.open_read().await?;
    let body = Body::wrap_stream(ReaderStream::with_capacity(reader, buffer_size));
    client.put(url, body, true).await
}

/// COPY to a WebDAV server.
#[derive(Debug, Clone)]
pub struct RemoteCopy {
    client: RemoteClient,
    buffer_size: usize,
}

impl RemoteCopy {
    /// Create the strategy around `client`.
    pub fn new(client: RemoteClient, buffer_size: usize) -> Self {
        Self {
            client,
            buffer_size,
        }
    }
}

#[async_trait]
impl TransferActions for RemoteCopy {
    fn existing_target_behaviour(&self) -> RecursiveTargetBehaviour {
        RecursiveTargetBehaviour::Overwrite
    }

    async fn transfer_to_missing(
        &self,
        source: &Arc<dyn Document>,
        target: MissingTarget,
    ) -> Result<DocumentTarget> {
        upload(&self.client, source, target.url(), self.buffer_size).await?;
        Ok(target.into_document(DocumentHandle::Remote(self.client.clone())))
    }

    async fn transfer_to_document(
        &self,
        source: &Arc<dyn Document>,
        target: &DocumentTarget,
    ) -> ActionResult {
        let href = target.url().clone();
        match upload(&self.client, source, &href, self.buffer_size).await {
            Ok(_) => ActionResult::new(ActionStatus::Overwritten, href),
            Err(e) => ActionResult::failed(ActionStatus::OverwriteFailed, href, e),
        }
    }
}

/// MOVE to a WebDAV server.
///
/// Source documents are deleted once uploaded; source collections once
/// their whole subtree was uploaded.
#[derive(Debug, Clone)]
pub struct RemoteMove {
    inner: RemoteCopy,
}

impl RemoteMove {
    /// Create the strategy around `client`.
    pub fn new(client: RemoteClient, buffer_size: usize) -> Self {
        Self {
            inner: RemoteCopy::new(client, buffer_size),
        }
    }
}

#[async_trait]
impl TransferActions for RemoteMove {
    fn existing_target_behaviour(&self) -> RecursiveTargetBehaviour {
        RecursiveTargetBehaviour::DeleteTarget
    }

    async fn transfer_to_missing(
        &self,
        source: &Arc<dyn Document>,
        target: MissingTarget,
    ) -> Result<DocumentTarget> {
        self.inner.transfer_to_missing(source, target).await
    }

    async fn transfer_to_document(
        &self,
        source: &Arc<dyn Document>,
        target: &DocumentTarget,
    ) -> ActionResult {
        self.inner.transfer_to_document(source, target).await
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

    async fn finish_document(
        &self,
        source: &Arc<dyn Document>,
        _result: &ActionResult,
    ) -> Result<()> {
        source.delete().await
    }
}
