//! Error types for cas-node.
//!
//! Two layers of errors exist:
//!
//! - [`Error`] covers fatal conditions (I/O failures, a corrupt state file,
//!   a broken record store). These propagate to the transport layer as a
//!   server error and are never turned into a domain error code.
//! - [`RequestError`] is the outcome of a single client request: a rejection
//!   carrying an [`ErrorCode`], an existence-hiding blacklist match, a lost
//!   file, or a wrapped fatal [`Error`].

use crate::protocol::ErrorCode;
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors that can occur in cas-node.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Record store error.
    #[error("database error: {0}")]
    Database(String),

    /// Cryptographic error.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Outcome of a rejected or failed client request.
#[derive(Error, Debug)]
pub enum RequestError {
    /// The request failed a validation, policy, or integrity check.
    #[error("request rejected: {0}")]
    Rejected(ErrorCode),

    /// The content hash is blacklisted.
    ///
    /// Surfaced to clients as a bare not-found so the existence of
    /// blacklisted content is not revealed.
    #[error("not found")]
    Blacklisted,

    /// A record exists for the hash but the blob is missing from disk.
    ///
    /// Carries the node's known peers, which may still hold the content.
    #[error("file is lost on this node ({} known peers)", peers.len())]
    LostFile {
        /// Peers that may hold the same content hash.
        peers: Vec<String>,
    },

    /// Unexpected failure inside the node.
    #[error(transparent)]
    Fatal(#[from] Error),
}

impl RequestError {
    /// HTTP status an HTTP front end should answer with.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Rejected(code) => code.http_status(),
            Self::Blacklisted | Self::LostFile { .. } => 404,
            Self::Fatal(_) => 500,
        }
    }

    /// The error code carried by a rejection, if any.
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Rejected(code) => Some(*code),
            _ => None,
        }
    }
}

impl From<ErrorCode> for RequestError {
    fn from(code: ErrorCode) -> Self {
        Self::Rejected(code)
    }
}

impl From<crate::records::RecordError> for RequestError {
    fn from(err: crate::records::RecordError) -> Self {
        Self::Fatal(err.into())
    }
}
