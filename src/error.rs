//! Error types for davcopy.
//!
//! This module provides the [`Error`] enum containing all possible errors
//! that can occur while resolving, transferring or reporting resources, and
//! the [`Result`] type alias.
//!
//! # Error Categories
//!
//! | Category | Errors |
//! |----------|--------|
//! | IO | [`Error::Io`], [`Error::PermissionDenied`], [`Error::NotFound`], [`Error::AlreadyExists`] |
//! | Remote | [`Error::Http`], [`Error::RemoteStatus`], [`Error::Xml`] |
//! | Validation | [`Error::InvalidName`], [`Error::InvalidUrl`], [`Error::InvalidDestination`], [`Error::InvalidDepthHeader`] |
//! | Structural | [`Error::SourceNotFound`], [`Error::ParentNotFound`], [`Error::ParentNotCollection`], [`Error::DestinationExists`], [`Error::SameResource`], [`Error::RecursiveDestination`], [`Error::DestinationContainsSource`], [`Error::InvalidDepth`] |
//! | Backend | [`Error::NotSupported`] |
//!
//! Structural errors abort a request before any resource is touched. All other
//! errors are captured per item inside an
//! [`ActionResult`](crate::ActionResult) and never unwind past it.

use crate::depth::Depth;
use crate::options::TransferKind;
use http::StatusCode;
use std::io;
use thiserror::Error;
use url::Url;

/// Result type for davcopy operations.
///
/// This is a type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during transfer operations.
///
/// All errors include the relevant path or URL to aid debugging.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// IO error during backend operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// HTTP transport error talking to a remote server
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote server answered with a non-success status
    #[error("{method} {url} failed with {status}")]
    RemoteStatus {
        /// Request method
        method: String,
        /// Request URL
        url: Url,
        /// Status returned by the server
        status: StatusCode,
        /// Precondition/postcondition named in a DAV `<error>` body, if any
        condition: Option<String>,
    },

    /// Malformed XML in a remote response
    #[error("XML error: {0}")]
    Xml(String),

    /// URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// URL cannot address a WebDAV resource (e.g. `mailto:`)
    #[error("URL cannot be used as a destination: {0}")]
    InvalidDestination(Url),

    /// Resource name is not acceptable for the backend
    #[error("Invalid resource name: {0:?}")]
    InvalidName(String),

    /// Resource does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Resource already exists
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Backend refused access to the resource
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Backend does not implement the requested capability
    #[error("Operation not supported: {0}")]
    NotSupported(&'static str),

    /// Source of a COPY/MOVE does not exist
    #[error("Source resource does not exist: {0}")]
    SourceNotFound(String),

    /// Parent collection of the destination does not exist
    #[error("Parent collection of {0} does not exist")]
    ParentNotFound(Url),

    /// Parent of the destination exists but is not a collection
    #[error("Parent of {0} is not a collection")]
    ParentNotCollection(Url),

    /// Destination exists and overwriting was not allowed
    #[error("Destination {0} exists and overwrite is disabled")]
    DestinationExists(Url),

    /// Source and destination are the same resource
    #[error("Source and destination are the same resource: {0}")]
    SameResource(Url),

    /// Destination lies inside the source collection
    #[error("Destination {0} is inside the source collection")]
    RecursiveDestination(Url),

    /// Destination is a collection holding the source; replacing it would
    /// delete the source
    #[error("Destination {0} contains the source")]
    DestinationContainsSource(Url),

    /// Depth not permitted for the requested method
    #[error("Depth {depth} is not allowed for {kind}")]
    InvalidDepth {
        /// Requested method
        kind: TransferKind,
        /// Requested depth
        depth: Depth,
    },

    /// Depth header could not be parsed
    #[error("Invalid Depth header: {0:?}")]
    InvalidDepthHeader(String),
}

impl Error {
    /// HTTP status code used when this error is reported as a protocol-level
    /// response instead of a per-item result.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Io(e) => match e.kind() {
                io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
                io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
                io::ErrorKind::AlreadyExists => StatusCode::METHOD_NOT_ALLOWED,
                io::ErrorKind::StorageFull => StatusCode::INSUFFICIENT_STORAGE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Http(_) | Error::RemoteStatus { .. } => StatusCode::BAD_GATEWAY,
            Error::Xml(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::InvalidUrl(_)
            | Error::InvalidDestination(_)
            | Error::InvalidName(_)
            | Error::InvalidDepth { .. }
            | Error::InvalidDepthHeader(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) | Error::SourceNotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyExists(_) => StatusCode::METHOD_NOT_ALLOWED,
            Error::PermissionDenied(_)
            | Error::SameResource(_)
            | Error::RecursiveDestination(_)
            | Error::DestinationContainsSource(_) => StatusCode::FORBIDDEN,
            Error::NotSupported(_) => StatusCode::NOT_IMPLEMENTED,
            Error::ParentNotFound(_) | Error::ParentNotCollection(_) => StatusCode::CONFLICT,
            Error::DestinationExists(_) => StatusCode::PRECONDITION_FAILED,
        }
    }

    /// Returns true if the backend reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(e) => e.kind() == io::ErrorKind::NotFound,
            Error::RemoteStatus { status, .. } => *status == StatusCode::NOT_FOUND,
            _ => false,
        }
    }

    /// Returns true if the error is a backend capability gap rather than a failure.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Error::NotSupported(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_status_codes() {
        let url = Url::parse("http://example.com/dst/").unwrap();
        assert_eq!(
            Error::DestinationExists(url.clone()).status_code(),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(
            Error::ParentNotFound(url.clone()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::SameResource(url.clone()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::DestinationContainsSource(url.clone()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::InvalidDepth {
                kind: TransferKind::Move,
                depth: Depth::Zero,
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::SourceNotFound("/src".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_io_error_mapping() {
        let e = Error::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert_eq!(e.status_code(), StatusCode::FORBIDDEN);

        let e = Error::Io(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
        assert!(e.is_not_found());

        let e = Error::Io(io::Error::other("boom"));
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!e.is_not_found());
    }

    #[test]
    fn test_invalid_depth_display() {
        let e = Error::InvalidDepth {
            kind: TransferKind::Move,
            depth: Depth::Zero,
        };
        assert_eq!(e.to_string(), "Depth 0 is not allowed for MOVE");
    }
}
