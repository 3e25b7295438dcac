//! Per-item outcomes of a transfer.
//!
//! Every document and collection touched by the engine produces exactly one
//! [`ActionResult`]. Collection results nest into a [`CollectionActionResult`]
//! tree that mirrors the source tree; [`CollectionActionResult::flatten`]
//! walks it in traversal order.

use crate::error::Error;
use http::{StatusCode, Version};
use url::Url;

/// Outcome of a single item.
///
/// Declaration order is the order groups appear in a multistatus response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum ActionStatus {
    /// Destination did not exist and was created
    Created,
    /// Destination existed and was replaced
    Overwritten,
    /// Destination existed and replacing it failed
    OverwriteFailed,
    /// Destination existed and overwriting was not allowed
    CannotOverwrite,
    /// Destination could not be created
    CreateFailed,
    /// Existing destination could not be deleted
    TargetDeleteFailed,
    /// Data arrived but properties could not be set
    PropSetFailed,
    /// Post-processing (e.g. removing a moved source) failed
    CleanupFailed,
    /// Not attempted because an ancestor failed
    ParentFailed,
    /// Not attempted because the transfer was cancelled
    Ignored,
}

impl ActionStatus {
    /// Returns true if the status reports a failure.
    pub fn is_failure(self) -> bool {
        !matches!(
            self,
            ActionStatus::Created | ActionStatus::Overwritten | ActionStatus::Ignored
        )
    }

    /// HTTP status code reported for this outcome.
    ///
    /// `Ignored` entries are never rendered and have no code.
    pub fn status_code(self) -> Option<StatusCode> {
        match self {
            ActionStatus::Created => Some(StatusCode::CREATED),
            ActionStatus::Overwritten => Some(StatusCode::NO_CONTENT),
            ActionStatus::OverwriteFailed
            | ActionStatus::PropSetFailed
            | ActionStatus::CleanupFailed => Some(StatusCode::CONFLICT),
            ActionStatus::CannotOverwrite => Some(StatusCode::PRECONDITION_FAILED),
            ActionStatus::CreateFailed | ActionStatus::TargetDeleteFailed => {
                Some(StatusCode::FORBIDDEN)
            }
            ActionStatus::ParentFailed => Some(StatusCode::FAILED_DEPENDENCY),
            ActionStatus::Ignored => None,
        }
    }

    /// Stable snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Created => "created",
            ActionStatus::Overwritten => "overwritten",
            ActionStatus::OverwriteFailed => "overwrite_failed",
            ActionStatus::CannotOverwrite => "cannot_overwrite",
            ActionStatus::CreateFailed => "create_failed",
            ActionStatus::TargetDeleteFailed => "target_delete_failed",
            ActionStatus::PropSetFailed => "prop_set_failed",
            ActionStatus::CleanupFailed => "cleanup_failed",
            ActionStatus::ParentFailed => "parent_failed",
            ActionStatus::Ignored => "ignored",
        }
    }
}

/// Outcome of one item, addressed by its destination URL.
#[derive(Debug)]
pub struct ActionResult {
    /// Fully-qualified destination URL
    pub href: Url,
    /// What happened
    pub status: ActionStatus,
    /// Underlying error for failed items
    pub error: Option<Error>,
}

impl ActionResult {
    /// Successful or informational outcome without an error.
    pub fn new(status: ActionStatus, href: Url) -> Self {
        Self {
            href,
            status,
            error: None,
        }
    }

    /// Failed outcome carrying its cause.
    pub fn failed(status: ActionStatus, href: Url, error: Error) -> Self {
        Self {
            href,
            status,
            error: Some(error),
        }
    }

    /// Returns true if this item failed.
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Replace the status and error, keeping the href.
    pub(crate) fn fail(&mut self, status: ActionStatus, error: Error) {
        self.status = status;
        self.error = Some(error);
    }
}

/// Result tree for a collection: its own outcome plus those of its children.
#[derive(Debug)]
pub struct CollectionActionResult {
    /// Outcome of the collection itself
    pub result: ActionResult,
    /// Outcomes of the documents directly inside the collection
    pub documents: Vec<ActionResult>,
    /// Result trees of the child collections
    pub collections: Vec<CollectionActionResult>,
}

impl CollectionActionResult {
    /// Create a result tree with no children yet.
    pub fn new(result: ActionResult) -> Self {
        Self {
            result,
            documents: Vec::new(),
            collections: Vec::new(),
        }
    }

    /// Status of the collection itself.
    pub fn status(&self) -> ActionStatus {
        self.result.status
    }

    /// Destination URL of the collection.
    pub fn href(&self) -> &Url {
        &self.result.href
    }

    /// All results of the subtree: the collection first, then its documents,
    /// then each child collection's subtree.
    pub fn flatten(&self) -> Box<dyn Iterator<Item = &ActionResult> + '_> {
        Box::new(
            std::iter::once(&self.result)
                .chain(self.documents.iter())
                .chain(self.collections.iter().flat_map(CollectionActionResult::flatten)),
        )
    }

    /// Returns true if any descendant failed or was skipped.
    ///
    /// A source collection must only be removed after a move when this is false.
    pub fn has_incomplete_children(&self) -> bool {
        self.flatten()
            .skip(1)
            .any(|r| r.is_failure() || r.status == ActionStatus::Ignored)
    }
}

/// Result of one COPY or MOVE request.
#[derive(Debug)]
pub enum TransferOutcome {
    /// The source was a document
    Document(ActionResult),
    /// The source was a collection
    Collection(CollectionActionResult),
}

impl TransferOutcome {
    /// Outcome of the request's root item.
    pub fn root(&self) -> &ActionResult {
        match self {
            TransferOutcome::Document(result) => result,
            TransferOutcome::Collection(tree) => &tree.result,
        }
    }

    /// All results in traversal order.
    pub fn flatten(&self) -> Box<dyn Iterator<Item = &ActionResult> + '_> {
        match self {
            TransferOutcome::Document(result) => Box::new(std::iter::once(result)),
            TransferOutcome::Collection(tree) => tree.flatten(),
        }
    }

    /// Number of failed items.
    pub fn failure_count(&self) -> usize {
        self.flatten().filter(|r| r.is_failure()).count()
    }

    /// Aggregate into a WebDAV response.
    pub fn evaluate(&self, version: Version) -> crate::Result<crate::DavResponse> {
        crate::evaluate::evaluate(self.flatten(), version)
    }
}
