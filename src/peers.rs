//! Known peers, reported to clients when a blob has gone missing.

use crate::config::read_list_file;
use crate::error::{RequestError, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Line-oriented list of peer addresses.
///
/// The file is read on every lookup, so edits take effect immediately.
#[derive(Debug, Clone)]
pub struct PeerList {
    path: PathBuf,
}

impl PeerList {
    /// Peer list backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current peers. A missing file yields no peers.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn peers(&self) -> Result<Vec<String>> {
        read_list_file(&self.path).await
    }

    /// Lost-file outcome for `hash`, carrying the current peers.
    pub async fn lost_file(&self, hash: &str) -> RequestError {
        warn!("Record for {hash} exists but its blob is missing");
        match self.peers().await {
            Ok(peers) => RequestError::LostFile { peers },
            Err(e) => RequestError::Fatal(e),
        }
    }
}
