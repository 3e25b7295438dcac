//! Configuration options for transfer operations.
//!
//! This module provides [`TransferOptions`] for configuring COPY/MOVE behavior
//! and [`TransferKind`] naming the method being executed.
//!
//! # Example
//!
//! ```
//! use davcopy::{Depth, TransferOptions};
//!
//! let options = TransferOptions::default()
//!     .with_depth(Depth::Zero)
//!     .without_overwrite()
//!     .with_buffer_size(128 * 1024);
//! ```

use crate::depth::Depth;
use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Buffer size used for stream copies between file systems (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// The WebDAV method being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferKind {
    /// `COPY`: the source is left untouched.
    Copy,
    /// `MOVE`: the source is removed once its data arrived.
    Move,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Copy => f.write_str("COPY"),
            TransferKind::Move => f.write_str("MOVE"),
        }
    }
}

/// Options for transfer operations.
///
/// Use [`Default::default()`] to get RFC 4918 defaults, then customize
/// using the builder methods.
///
/// # Default Values
///
/// | Field | Default | Description |
/// |-------|---------|-------------|
/// | `depth` | `Infinite` | Whole subtree |
/// | `overwrite` | `true` | `Overwrite: T` |
/// | `buffer_size` | 64 KiB | Stream copy buffer |
/// | `cancel_token` | `None` | Not cancellable |
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransferOptions {
    /// Value of the `Depth` header (default: infinity)
    pub depth: Depth,

    /// Value of the `Overwrite` header (default: true)
    ///
    /// When false, an existing destination fails the whole request with
    /// 412 and existing children are reported as `CannotOverwrite`.
    pub overwrite: bool,

    /// Buffer size for stream copies (default: 64 KiB)
    pub buffer_size: usize,

    /// Cancellation token (optional)
    ///
    /// When set to `true`, the traversal stops before the next item. Items
    /// already transferred are not rolled back.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub cancel_token: Option<Arc<AtomicBool>>,

    /// Callback for warnings (optional)
    ///
    /// If not set and `tracing` feature is enabled, warnings are logged via tracing.
    /// Otherwise, warnings are silently ignored.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub warn_handler: Option<fn(&str)>,

    /// Callback for per-item progress messages (optional)
    #[cfg_attr(feature = "serde", serde(skip))]
    pub verbose_handler: Option<fn(&str)>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            depth: Depth::Infinite,
            overwrite: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
            cancel_token: None,
            warn_handler: None,
            verbose_handler: None,
        }
    }
}

impl TransferOptions {
    /// Set the depth
    #[must_use]
    pub fn with_depth(mut self, depth: Depth) -> Self {
        self.depth = depth;
        self
    }

    /// Set the `Overwrite` flag
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Refuse to replace existing destinations (`Overwrite: F`)
    #[must_use]
    pub fn without_overwrite(self) -> Self {
        self.with_overwrite(false)
    }

    /// Set the stream copy buffer size
    ///
    /// Value is clamped to at least 1 byte.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Attach a cancellation token
    #[must_use]
    pub fn with_cancel_token(mut self, token: Arc<AtomicBool>) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Create options with a warning handler
    #[must_use]
    pub fn with_warn_handler(mut self, handler: fn(&str)) -> Self {
        self.warn_handler = Some(handler);
        self
    }

    /// Create options with a per-item progress handler
    #[must_use]
    pub fn with_verbose_handler(mut self, handler: fn(&str)) -> Self {
        self.verbose_handler = Some(handler);
        self
    }

    /// Check the depth against the method.
    ///
    /// MOVE must always operate on the whole subtree.
    pub fn validate(&self, kind: TransferKind) -> Result<()> {
        if kind == TransferKind::Move && !self.depth.is_infinite() {
            return Err(Error::InvalidDepth {
                kind,
                depth: self.depth,
            });
        }
        Ok(())
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(|token| token.load(Ordering::Relaxed))
    }

    pub(crate) fn warn(&self, msg: &str) {
        if let Some(handler) = self.warn_handler {
            handler(msg);
        } else {
            #[cfg(feature = "tracing")]
            tracing::warn!("{}", msg);
        }
    }

    pub(crate) fn verbose(&self, msg: &str) {
        if let Some(handler) = self.verbose_handler {
            handler(msg);
        } else {
            #[cfg(feature = "tracing")]
            tracing::debug!("{}", msg);
        }
    }
}
