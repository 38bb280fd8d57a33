//! Revoked content hashes.
//!
//! The blacklist is a plain text file with one content hash per line. It is
//! maintained outside the node; [`Blacklist::reload`] picks up changes.

use crate::config::read_list_file;
use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Set of revoked content hashes.
#[derive(Debug)]
pub struct Blacklist {
    path: Option<PathBuf>,
    hashes: RwLock<HashSet<String>>,
}

impl Blacklist {
    /// Load the blacklist from `path`. A missing file is an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn load(path: &Path) -> Result<Self> {
        let hashes = read_list_file::<HashSet<String>>(path).await?;
        info!("Loaded blacklist with {} entries from {:?}", hashes.len(), path);
        Ok(Self {
            path: Some(path.to_path_buf()),
            hashes: RwLock::new(hashes),
        })
    }

    /// In-memory blacklist with no backing file.
    pub fn from_hashes<I, S>(hashes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: None,
            hashes: RwLock::new(hashes.into_iter().map(Into::into).collect()),
        }
    }

    /// Re-read the backing file, replacing the current set.
    ///
    /// Does nothing for an in-memory blacklist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn reload(&self) -> Result<usize> {
        let Some(path) = &self.path else {
            return Ok(self.len());
        };
        let hashes = read_list_file::<HashSet<String>>(path).await?;
        let count = hashes.len();
        *self.hashes.write() = hashes;
        debug!("Reloaded blacklist ({} entries)", count);
        Ok(count)
    }

    /// Whether `hash` is blacklisted.
    #[must_use]
    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.read().contains(hash)
    }

    /// Number of blacklisted hashes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hashes.read().len()
    }

    /// Whether the blacklist is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hashes.read().is_empty()
    }
}
