//! Builder API for ergonomic COPY/MOVE requests.
//!
//! The builder pattern provides a fluent interface for configuring and executing
//! transfers. This is often more convenient than resolving the source entry and
//! destination [`Target`] by hand and calling [`transfer`](crate::transfer).
//!
//! # Examples
//!
//! ## Basic Usage
//!
//! ```
//! use davcopy::{Destination, MemoryFileSystem, TransferBuilder};
//! use std::sync::Arc;
//! use url::Url;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> davcopy::Result<()> {
//! let fs = MemoryFileSystem::new();
//! fs.write("/src/a.txt", "alpha")?;
//! let base = Url::parse("http://localhost/")?;
//!
//! let outcome = TransferBuilder::copy(
//!     Arc::new(fs.clone()),
//!     "/src",
//!     Destination::local(Arc::new(fs.clone()), "/dst", base),
//! )
//! .run()
//! .await?;
//! assert_eq!(outcome.failure_count(), 0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Shallow Copy Without Overwrite
//!
//! ```no_run
//! use davcopy::{Depth, Destination, LocalFileSystem, RemoteClient, TransferBuilder};
//! use std::sync::Arc;
//! use url::Url;
//!
//! # async fn run() -> davcopy::Result<()> {
//! let local = LocalFileSystem::new("/srv/data")?;
//! let destination = Destination::remote(
//!     RemoteClient::new()?,
//!     Url::parse("https://dav.example.com/backup/")?,
//! );
//! let outcome = TransferBuilder::copy(Arc::new(local), "/reports", destination)
//!     .depth(Depth::Zero)
//!     .no_overwrite()
//!     .run()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::depth::Depth;
use crate::engine::transfer;
use crate::error::{Error, Result};
use crate::options::{TransferKind, TransferOptions};
use crate::remote::RemoteClient;
use crate::result::TransferOutcome;
use crate::store::{FileSystem, lookup};
use crate::target::Target;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use url::Url;

/// Where a transfer should land.
#[derive(Debug, Clone)]
pub enum Destination {
    /// A path on a backend whose root is published at `base_url`
    Local {
        /// Destination backend
        fs: Arc<dyn FileSystem>,
        /// Path from the backend root
        path: String,
        /// URL of the backend root, used for result hrefs
        base_url: Url,
    },
    /// A URL on a WebDAV server
    Remote {
        /// Client used for every request
        client: RemoteClient,
        /// Destination URL
        url: Url,
    },
}

impl Destination {
    /// Destination on a backend.
    pub fn local(fs: Arc<dyn FileSystem>, path: impl Into<String>, base_url: Url) -> Self {
        Destination::Local {
            fs,
            path: path.into(),
            base_url,
        }
    }

    /// Destination on a WebDAV server.
    pub fn remote(client: RemoteClient, url: Url) -> Self {
        Destination::Remote { client, url }
    }

    /// Resolve into a [`Target`].
    pub async fn resolve(self) -> Result<Target> {
        match self {
            Destination::Local { fs, path, base_url } => {
                Target::local(fs.as_ref(), &path, &base_url).await
            }
            Destination::Remote { client, url } => Target::remote(client, url).await,
        }
    }
}

/// A builder for configuring and executing COPY and MOVE requests.
///
/// `TransferBuilder` provides a fluent interface that is often more ergonomic
/// than constructing [`TransferOptions`] and targets manually. The strategy is
/// picked from the source and destination locations.
#[derive(Debug, Clone)]
pub struct TransferBuilder {
    kind: TransferKind,
    fs: Arc<dyn FileSystem>,
    path: String,
    destination: Destination,
    options: TransferOptions,
}

impl TransferBuilder {
    /// Prepare a request of `kind` with default options.
    pub fn new(
        kind: TransferKind,
        fs: Arc<dyn FileSystem>,
        path: impl Into<String>,
        destination: Destination,
    ) -> Self {
        Self {
            kind,
            fs,
            path: path.into(),
            destination,
            options: TransferOptions::default(),
        }
    }

    /// Prepare a COPY of `path` on `fs`.
    pub fn copy(
        fs: Arc<dyn FileSystem>,
        path: impl Into<String>,
        destination: Destination,
    ) -> Self {
        Self::new(TransferKind::Copy, fs, path, destination)
    }

    /// Prepare a MOVE of `path` on `fs`.
    ///
    /// Named `moving` because `move` is a keyword.
    pub fn moving(
        fs: Arc<dyn FileSystem>,
        path: impl Into<String>,
        destination: Destination,
    ) -> Self {
        Self::new(TransferKind::Move, fs, path, destination)
    }

    /// Set the depth.
    ///
    /// Default is [`Depth::Infinite`]. MOVE rejects anything else.
    #[must_use]
    pub fn depth(mut self, depth: Depth) -> Self {
        self.options = self.options.with_depth(depth);
        self
    }

    /// Replace existing destinations (default behavior, `Overwrite: T`).
    #[must_use]
    pub fn overwrite(mut self) -> Self {
        self.options = self.options.with_overwrite(true);
        self
    }

    /// Refuse to replace existing destinations (`Overwrite: F`).
    ///
    /// # Example
    ///
    /// ```
    /// use davcopy::{Destination, Error, MemoryFileSystem, TransferBuilder};
    /// use std::sync::Arc;
    /// use url::Url;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> davcopy::Result<()> {
    /// let fs = MemoryFileSystem::new();
    /// fs.write("/a.txt", "new")?;
    /// fs.write("/b.txt", "old")?;
    ///
    /// let dst = Destination::local(Arc::new(fs.clone()), "/b.txt", Url::parse("http://localhost/")?);
    /// let result = TransferBuilder::copy(Arc::new(fs.clone()), "/a.txt", dst)
    ///     .no_overwrite()
    ///     .run()
    ///     .await;
    /// assert!(matches!(result, Err(Error::DestinationExists(_))));
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn no_overwrite(mut self) -> Self {
        self.options = self.options.without_overwrite();
        self
    }

    /// Set the buffer size for stream copies.
    #[must_use]
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.options = self.options.with_buffer_size(size);
        self
    }

    /// Set a cancellation token for cooperative cancellation.
    ///
    /// When the token is set to `true`, the transfer stops before the next
    /// item; the remaining items are reported as
    /// [`Ignored`](crate::ActionStatus::Ignored).
    #[must_use]
    pub fn cancel_token(mut self, token: Arc<AtomicBool>) -> Self {
        self.options = self.options.with_cancel_token(token);
        self
    }

    /// Set a warning handler called for every failed item.
    #[must_use]
    pub fn on_warning(mut self, handler: fn(&str)) -> Self {
        self.options = self.options.with_warn_handler(handler);
        self
    }

    /// Set a handler called for every item outcome.
    #[must_use]
    pub fn verbose(mut self, handler: fn(&str)) -> Self {
        self.options = self.options.with_verbose_handler(handler);
        self
    }

    /// Replace all options at once.
    #[must_use]
    pub fn with_options(mut self, options: TransferOptions) -> Self {
        self.options = options;
        self
    }

    /// Get a reference to the current options.
    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Execute the request.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The source does not exist ([`Error::SourceNotFound`])
    /// - The destination parent is missing or not a collection
    /// - The request is structurally invalid (see [`transfer`](crate::transfer))
    ///
    /// Failures of individual items are reported inside the outcome.
    pub async fn run(self) -> Result<TransferOutcome> {
        let source = lookup(self.fs.as_ref(), &self.path)
            .await?
            .ok_or_else(|| Error::SourceNotFound(self.path.clone()))?;
        let destination = self.destination.resolve().await?;
        transfer(self.kind, source, destination, self.options).await
    }
}
