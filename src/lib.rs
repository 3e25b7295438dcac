//! # davcopy
//!
//! Recursive WebDAV `COPY` and `MOVE` for Rust, with RFC 4918 partial-failure
//! reporting.
//!
//! ## Core Features
//!
//! - **One walker, every pairing**: the same traversal serves same-backend,
//!   cross-backend and backend-to-server transfers; only the strategy differs
//! - **Failure containment**: a failing item never stops its siblings and never
//!   destroys data that already arrived
//! - **Safe MOVE**: a source collection is only removed once its whole subtree
//!   arrived
//! - **Depth aware**: `Depth: 0`, `1`, ... and `infinity` as an explicit tri-state
//! - **ETag preservation**: ETags survive copies onto backends that cannot compute
//!   their own
//! - **Multistatus rendering**: uniform outcomes become one status, mixed
//!   outcomes a `207 Multi-Status` body
//! - **Atomic local writes**: documents on disk are written to a temp file and
//!   renamed into place
//! - **Cancellable**: a cancel token stops the walk between items
//!
//! ## Quick Start with Builder API
//!
//! ```
//! use davcopy::{Destination, MemoryFileSystem, TransferBuilder};
//! use http::Version;
//! use std::sync::Arc;
//! use url::Url;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> davcopy::Result<()> {
//! let fs = MemoryFileSystem::new();
//! fs.write("/src/f1.txt", "one")?;
//! fs.write("/src/f2.txt", "two")?;
//! fs.write("/dst/f1.txt", "old")?;
//!
//! let shared = Arc::new(fs.clone());
//! let outcome = TransferBuilder::copy(
//!     shared.clone(),
//!     "/src",
//!     Destination::local(shared, "/dst", Url::parse("http://localhost/")?),
//! )
//! .run()
//! .await?;
//!
//! // f1 was overwritten, f2 created: a 207 with two groups
//! let response = outcome.evaluate(Version::HTTP_11)?;
//! assert_eq!(response.status().as_u16(), 207);
//! # Ok(())
//! # }
//! ```
//!
//! ## Function API
//!
//! For more control, resolve the [`Target`] yourself and pick or supply a
//! [`TransferActions`] strategy:
//!
//! ```
//! use davcopy::{
//!     CopyBetweenFileSystems, MemoryFileSystem, RecursiveEngine, Target, TransferKind,
//!     TransferOptions,
//! };
//! use std::sync::Arc;
//! use url::Url;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> davcopy::Result<()> {
//! let src = MemoryFileSystem::new();
//! let dst = MemoryFileSystem::new();
//! src.write("/a.txt", "alpha")?;
//!
//! let target = Target::local(&dst, "/a.txt", &Url::parse("http://localhost/")?).await?;
//! let engine = RecursiveEngine::new(
//!     TransferKind::Copy,
//!     Arc::new(CopyBetweenFileSystems::new(16 * 1024)),
//!     TransferOptions::default(),
//! );
//! let outcome = engine.execute(src.lookup("/a.txt").unwrap(), target).await?;
//! assert_eq!(outcome.failure_count(), 0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Strategies
//!
//! | Strategy | Used when | Existing targets |
//! |----------|-----------|------------------|
//! | [`CopyInFileSystem`] / [`MoveInFileSystem`] | same backend | overwritten / deleted first |
//! | [`CopyBetweenFileSystems`] / [`MoveBetweenFileSystems`] | two backends | overwritten / deleted first |
//! | [`RemoteCopy`] / [`RemoteMove`] | destination is a WebDAV URL | overwritten / deleted first |
//!
//! ## Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `tracing` | Structured logging with tracing crate (default) |
//! | `serde` | Serialize/Deserialize for [`TransferOptions`], [`Depth`] and [`ActionStatus`] |
//! | `full` | Enable all optional features |

#![cfg_attr(docsrs, feature(doc_cfg))]

mod actions;
mod builder;
mod depth;
mod engine;
mod error;
mod evaluate;
mod options;
mod properties;
mod remote;
mod result;
mod store;
mod target;

pub use actions::{
    CopyBetweenFileSystems, CopyInFileSystem, MoveBetweenFileSystems, MoveInFileSystem,
    RecursiveTargetBehaviour, RemoteCopy, RemoteMove, TransferActions, select_actions,
};
pub use builder::{Destination, TransferBuilder};
pub use depth::Depth;
pub use engine::{RecursiveEngine, transfer};
pub use error::{Error, Result};
pub use evaluate::{DavResponse, evaluate};
pub use options::{DEFAULT_BUFFER_SIZE, TransferKind, TransferOptions};
pub use properties::{dead_properties, get_etag, set_property};
pub use remote::{RemoteClient, RemoteKind};
pub use result::{ActionResult, ActionStatus, CollectionActionResult, TransferOutcome};
pub use store::{
    Collection, DeadProperty, Document, EntityTag, Entry, FileSystem, FileSystemId,
    LocalFileSystem, MemoryFileSystem, MemoryPropertyStore, Node, NodeAccess, PropertyName,
    PropertyStore, ReadStream, WriteStream, lookup,
};
pub use target::{
    CollectionHandle, CollectionTarget, DocumentHandle, DocumentTarget, MissingTarget, Target,
};
