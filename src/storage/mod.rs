//! Durable blob storage keyed by content hash.
//!
//! ```text
//! {root}/{h[0..2]}/{h[2..4]}/{hash}
//! ```
//!
//! Blobs are written atomically (unique temp file + rename) and read back as
//! lazy [`BlobStream`]s, so a blob is never held in memory as a whole on the
//! download and audit paths.

mod disk;

pub use disk::{ContentStore, StorageStats};

use bytes::Bytes;
use futures::Stream;
use std::io;
use std::pin::Pin;
use thiserror::Error;

/// Lazy, single-pass stream of blob chunks.
pub type BlobStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Errors raised by the [`ContentStore`].
#[derive(Debug, Error)]
pub enum ContentError {
    /// No blob is stored under this hash.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// The decryption key is malformed or does not open the blob.
    #[error("decryption key does not open blob")]
    InvalidKey,

    /// The hash is not a valid content address.
    #[error("invalid content address: {0:?}")]
    InvalidAddress(String),

    /// Filesystem failure.
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<ContentError> for crate::error::Error {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::Io(e) => Self::Io(e),
            other => Self::Storage(other.to_string()),
        }
    }
}
