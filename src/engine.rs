//! Recursive COPY/MOVE engine.
//!
//! The engine walks the source tree one item at a time, resolves the matching
//! destination [`Target`] afresh at every step and lets a [`TransferActions`]
//! strategy move the bytes. Each item ends in exactly one [`ActionResult`];
//! a failure is recorded at the item that caused it and never stops its
//! siblings. When a collection step fails, its untried descendants are
//! reported as [`ActionStatus::ParentFailed`] without touching them.
//!
//! # Processing order
//!
//! ```text
//! collection: properties -> enter -> set properties -> children (sorted) -> cleanup
//! document:   properties -> transfer -> set properties -> finish_document
//! ```

use crate::actions::{RecursiveTargetBehaviour, TransferActions, select_actions};
use crate::depth::Depth;
use crate::error::{Error, Result};
use crate::options::{TransferKind, TransferOptions};
use crate::result::{ActionResult, ActionStatus, CollectionActionResult, TransferOutcome};
use crate::store::{Collection, DeadProperty, Document, Entry};
use crate::target::{DocumentTarget, MissingTarget, Target, child_url};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use url::Url;

/// Drives one COPY or MOVE request.
#[derive(Debug)]
pub struct RecursiveEngine {
    kind: TransferKind,
    actions: Arc<dyn TransferActions>,
    options: TransferOptions,
}

/// Run a COPY or MOVE of `source` onto `destination` with the matching strategy.
///
/// Structural problems (invalid depth, existing destination without
/// overwrite, copying onto itself, below itself or onto an ancestor) are
/// returned as errors before anything is touched. Everything else is reported per item in the
/// returned [`TransferOutcome`].
///
/// # Example
///
/// ```
/// use davcopy::{MemoryFileSystem, Target, TransferKind, TransferOptions, transfer};
/// use url::Url;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> davcopy::Result<()> {
/// let fs = MemoryFileSystem::new();
/// fs.write("/a.txt", "hello")?;
///
/// let base = Url::parse("http://localhost/")?;
/// let source = fs.lookup("/a.txt").unwrap();
/// let destination = Target::local(&fs, "/b.txt", &base).await?;
///
/// let outcome = transfer(TransferKind::Copy, source, destination, TransferOptions::default()).await?;
/// assert_eq!(outcome.root().href.as_str(), "http://localhost/b.txt");
/// assert_eq!(fs.read("/b.txt").unwrap(), "hello");
/// # Ok(())
/// # }
/// ```
pub async fn transfer(
    kind: TransferKind,
    source: Entry,
    destination: Target,
    options: TransferOptions,
) -> Result<TransferOutcome> {
    let actions = select_actions(kind, &source, &destination, &options);
    RecursiveEngine::new(kind, actions, options)
        .execute(source, destination)
        .await
}

fn child_href(parent: &Url, entry: &Entry) -> Url {
    child_url(parent, entry.name(), entry.is_collection()).unwrap_or_else(|_| parent.clone())
}

fn normalize(path: &str) -> &str {
    path.trim_end_matches('/')
}

impl RecursiveEngine {
    /// Create an engine for `kind` using `actions`.
    pub fn new(
        kind: TransferKind,
        actions: Arc<dyn TransferActions>,
        options: TransferOptions,
    ) -> Self {
        Self {
            kind,
            actions,
            options,
        }
    }

    /// Transfer `source` onto `destination`.
    pub async fn execute(&self, source: Entry, destination: Target) -> Result<TransferOutcome> {
        self.options.validate(self.kind)?;
        self.check_structure(&source, &destination)?;
        self.options.verbose(&format!(
            "{} {} -> {}",
            self.kind,
            source.path(),
            destination.url()
        ));

        Ok(match source {
            Entry::Document(document) => {
                TransferOutcome::Document(self.transfer_document(&document, destination).await)
            }
            Entry::Collection(collection) => {
                let behaviour = self.root_behaviour(&destination);
                TransferOutcome::Collection(
                    self.transfer_collection(collection, destination, self.options.depth, behaviour)
                        .await,
                )
            }
        })
    }

    fn check_structure(&self, source: &Entry, destination: &Target) -> Result<()> {
        if let Some((id, path)) = destination.location() {
            if id == source.file_system().id() {
                let source_path = normalize(source.path());
                let destination_path = normalize(&path);
                if source_path == destination_path {
                    return Err(Error::SameResource(destination.url().clone()));
                }
                if source.is_collection()
                    && destination_path.starts_with(&format!("{source_path}/"))
                {
                    return Err(Error::RecursiveDestination(destination.url().clone()));
                }
                if source_path.starts_with(&format!("{destination_path}/")) {
                    return Err(Error::DestinationContainsSource(destination.url().clone()));
                }
            }
        }
        if !self.options.overwrite && !destination.is_missing() {
            return Err(Error::DestinationExists(destination.url().clone()));
        }
        Ok(())
    }

    /// A shallow COPY onto an existing collection deletes it first.
    fn root_behaviour(&self, destination: &Target) -> RecursiveTargetBehaviour {
        if self.kind == TransferKind::Copy
            && !self.options.depth.is_infinite()
            && matches!(destination, Target::Collection(_))
        {
            RecursiveTargetBehaviour::DeleteTarget
        } else {
            self.actions.existing_target_behaviour()
        }
    }

    fn report(&self, result: &ActionResult) {
        match &result.error {
            Some(error) if result.is_failure() => self.options.warn(&format!(
                "{} {}: {} ({error})",
                self.kind,
                result.href,
                result.status.as_str()
            )),
            _ => self.options.verbose(&format!(
                "{} {}: {}",
                self.kind,
                result.href,
                result.status.as_str()
            )),
        }
    }

    async fn properties(&self, source: Entry, target: &Target) -> Result<Vec<DeadProperty>> {
        self.actions
            .transferred_properties(&source, target.supports_etag())
            .await
    }

    async fn transfer_document(&self, source: &Arc<dyn Document>, target: Target) -> ActionResult {
        let properties = self
            .properties(Entry::Document(source.clone()), &target)
            .await;
        let (mut result, document) = self.place_document(source, target).await;

        if let Some(document) = document {
            let stored = match properties {
                Ok(properties) => document.set_properties(&properties).await,
                Err(e) => Err(e),
            };
            if let Err(e) = stored {
                result.fail(ActionStatus::PropSetFailed, e);
            }
        }
        if !result.is_failure() {
            if let Err(e) = self.actions.finish_document(source, &result).await {
                result.fail(ActionStatus::CleanupFailed, e);
            }
        }
        self.report(&result);
        result
    }

    /// Put the content of `source` at `target`.
    ///
    /// Returns the destination document when the data arrived.
    async fn place_document(
        &self,
        source: &Arc<dyn Document>,
        target: Target,
    ) -> (ActionResult, Option<DocumentTarget>) {
        match target {
            Target::Missing(missing) => {
                self.create_document(
                    source,
                    missing,
                    ActionStatus::Created,
                    ActionStatus::CreateFailed,
                )
                .await
            }
            existing if !self.options.overwrite => (
                ActionResult::new(ActionStatus::CannotOverwrite, existing.url().clone()),
                None,
            ),
            Target::Document(existing)
                if self.actions.existing_target_behaviour()
                    == RecursiveTargetBehaviour::Overwrite =>
            {
                let result = self.actions.transfer_to_document(source, &existing).await;
                if result.is_failure() {
                    (result, None)
                } else {
                    (result, Some(existing))
                }
            }
            // Collections are always replaced, whatever the strategy
            existing => {
                let href = existing.url().clone();
                match existing.delete().await {
                    Ok(missing) => {
                        self.create_document(
                            source,
                            missing,
                            ActionStatus::Overwritten,
                            ActionStatus::OverwriteFailed,
                        )
                        .await
                    }
                    Err(e) => (
                        ActionResult::failed(ActionStatus::TargetDeleteFailed, href, e),
                        None,
                    ),
                }
            }
        }
    }

    async fn create_document(
        &self,
        source: &Arc<dyn Document>,
        missing: MissingTarget,
        success: ActionStatus,
        failure: ActionStatus,
    ) -> (ActionResult, Option<DocumentTarget>) {
        let href = missing.url().clone();
        match self.actions.transfer_to_missing(source, missing).await {
            Ok(document) => (ActionResult::new(success, document.url().clone()), Some(document)),
            Err(e) => (ActionResult::failed(failure, href, e), None),
        }
    }

    fn transfer_collection(
        &self,
        source: Arc<dyn Collection>,
        target: Target,
        depth: Depth,
        behaviour: RecursiveTargetBehaviour,
    ) -> BoxFuture<'_, CollectionActionResult> {
        async move {
            let properties = self
                .properties(Entry::Collection(source.clone()), &target)
                .await;
            let existed = !target.is_missing();

            let target = match target {
                existing @ (Target::Document(_) | Target::Collection(_))
                    if !self.options.overwrite =>
                {
                    let result =
                        ActionResult::new(ActionStatus::CannotOverwrite, existing.url().clone());
                    return self.abandon(result, source, depth).await;
                }
                Target::Collection(existing)
                    if behaviour == RecursiveTargetBehaviour::Overwrite =>
                {
                    Target::Collection(existing)
                }
                Target::Missing(missing) => Target::Missing(missing),
                existing => {
                    let href = existing.url().clone();
                    match existing.delete().await {
                        Ok(missing) => Target::Missing(missing),
                        Err(e) => {
                            let result =
                                ActionResult::failed(ActionStatus::TargetDeleteFailed, href, e);
                            return self.abandon(result, source, depth).await;
                        }
                    }
                }
            };

            let create_href = match &target {
                Target::Missing(missing) => missing.collection_url(),
                other => other.url().clone(),
            };
            let collection = match self.actions.enter(&source, target).await {
                Ok(collection) => collection,
                Err(e) => {
                    let result = ActionResult::failed(ActionStatus::CreateFailed, create_href, e);
                    return self.abandon(result, source, depth).await;
                }
            };

            let status = if existed {
                ActionStatus::Overwritten
            } else {
                ActionStatus::Created
            };
            let mut results =
                CollectionActionResult::new(ActionResult::new(status, collection.url().clone()));
            let stored = match properties {
                Ok(properties) => collection.set_properties(&properties).await,
                Err(e) => Err(e),
            };
            if let Err(e) = stored {
                results.result.fail(ActionStatus::PropSetFailed, e);
            }

            if let Some(child_depth) = depth.descend() {
                let children = match source.children().await {
                    Ok(children) => children,
                    Err(e) => {
                        results.result.fail(ActionStatus::CreateFailed, e);
                        self.report(&results.result);
                        return results;
                    }
                };
                self.report(&results.result);

                let mut children = children.into_iter();
                while let Some(child) = children.next() {
                    if self.options.is_cancelled() {
                        self.options
                            .warn(&format!("{} cancelled below {}", self.kind, collection.url()));
                        for skipped in std::iter::once(child).chain(children.by_ref()) {
                            let result = ActionResult::new(
                                ActionStatus::Ignored,
                                child_href(collection.url(), &skipped),
                            );
                            match skipped {
                                Entry::Document(_) => results.documents.push(result),
                                Entry::Collection(_) => {
                                    results.collections.push(CollectionActionResult::new(result));
                                }
                            }
                        }
                        break;
                    }

                    let href = child_href(collection.url(), &child);
                    let target = match collection.resolve(child.name()).await {
                        Ok(target) => target,
                        Err(e) => {
                            let result = ActionResult::failed(ActionStatus::CreateFailed, href, e);
                            self.report(&result);
                            match child {
                                Entry::Document(_) => results.documents.push(result),
                                Entry::Collection(child) => {
                                    results
                                        .collections
                                        .push(self.abandon(result, child, child_depth).await);
                                }
                            }
                            continue;
                        }
                    };
                    match child {
                        Entry::Document(document) => {
                            results
                                .documents
                                .push(self.transfer_document(&document, target).await);
                        }
                        Entry::Collection(child) => {
                            let behaviour = self.actions.existing_target_behaviour();
                            results.collections.push(
                                self.transfer_collection(child, target, child_depth, behaviour)
                                    .await,
                            );
                        }
                    }
                }
            } else {
                self.report(&results.result);
            }

            if let Err(e) = self.actions.cleanup(&source, &collection, &results).await {
                if results.result.is_failure() {
                    self.options
                        .warn(&format!("cleanup of {} failed: {e}", source.path()));
                } else {
                    results.result.fail(ActionStatus::CleanupFailed, e);
                    self.report(&results.result);
                }
            }
            results
        }
        .boxed()
    }

    /// Report `result` for a collection whose step failed and mark every
    /// source descendant within `depth` as [`ActionStatus::ParentFailed`].
    fn abandon(
        &self,
        result: ActionResult,
        source: Arc<dyn Collection>,
        depth: Depth,
    ) -> BoxFuture<'_, CollectionActionResult> {
        async move {
            if result.status != ActionStatus::ParentFailed {
                self.report(&result);
            }
            let mut results = CollectionActionResult::new(result);
            let Some(child_depth) = depth.descend() else {
                return results;
            };
            let children = match source.children().await {
                Ok(children) => children,
                Err(e) => {
                    self.options
                        .warn(&format!("cannot list {}: {e}", source.path()));
                    return results;
                }
            };
            for child in children {
                let skipped = ActionResult::new(
                    ActionStatus::ParentFailed,
                    child_href(&results.result.href, &child),
                );
                match child {
                    Entry::Document(_) => results.documents.push(skipped),
                    Entry::Collection(child) => {
                        results
                            .collections
                            .push(self.abandon(skipped, child, child_depth).await);
                    }
                }
            }
            results
        }
        .boxed()
    }
}
