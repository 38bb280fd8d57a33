//! Content-addressed disk storage with sharded directories.
//!
//! Blobs live under a two-level directory structure to avoid large directory
//! listings:
//!
//! ```text
//! {root}/{xx}/{yy}/{hash}
//! ```
//!
//! Where `xx` and `yy` are the first four hex characters of the hash.

use super::{BlobStream, ContentError};
use crate::crypto::DecryptCodec;
use crate::protocol::is_valid_hash;
use futures::{StreamExt, TryStreamExt};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, trace};

/// Statistics about storage operations.
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    /// Number of blobs newly written.
    pub blobs_stored: u64,
    /// Number of writes that replaced an existing blob.
    pub blobs_replaced: u64,
    /// Number of blob streams opened.
    pub blobs_retrieved: u64,
    /// Total bytes written.
    pub bytes_stored: u64,
    /// Total bytes of the blobs opened for reading.
    pub bytes_retrieved: u64,
    /// Number of blobs deleted.
    pub blobs_deleted: u64,
}

/// Content-addressed disk storage.
pub struct ContentStore {
    root_dir: PathBuf,
    stats: parking_lot::RwLock<StorageStats>,
}

impl ContentStore {
    /// Create a store rooted at `root_dir`.
    ///
    /// Directories are created on the first write.
    #[must_use]
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        debug!("Content store at {}", root_dir.display());
        Self {
            root_dir,
            stats: parking_lot::RwLock::new(StorageStats::default()),
        }
    }

    /// Store a blob under `hash`.
    ///
    /// The bytes go to a uniquely named temp file in the shard directory,
    /// are flushed, and are then renamed over the final path. The caller is
    /// responsible for checking that `hash` matches `content`.
    ///
    /// Returns `true` if no blob existed under this hash before.
    ///
    /// # Errors
    ///
    /// Returns an error if the hash is invalid or the write fails.
    pub async fn put(&self, hash: &str, content: &[u8]) -> Result<bool, ContentError> {
        let blob_path = self.blob_path(hash)?;
        let existed = fs::try_exists(&blob_path).await?;

        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = blob_path.with_file_name(format!(
            "{hash}.{:016x}.tmp",
            rand::random::<u64>()
        ));
        if let Err(e) = write_and_rename(&temp_path, &blob_path, content).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        {
            let mut stats = self.stats.write();
            if existed {
                stats.blobs_replaced += 1;
            } else {
                stats.blobs_stored += 1;
            }
            stats.bytes_stored += content.len() as u64;
        }

        debug!("Stored blob {hash} ({} bytes)", content.len());
        Ok(!existed)
    }

    /// Open a lazy stream over the blob stored under `hash`.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::NotFound`] if no blob is stored.
    pub async fn get(&self, hash: &str) -> Result<BlobStream, ContentError> {
        let blob_path = self.blob_path(hash)?;
        let file = match fs::File::open(&blob_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!("Blob {hash} not found");
                return Err(ContentError::NotFound(hash.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();

        {
            let mut stats = self.stats.write();
            stats.blobs_retrieved += 1;
            stats.bytes_retrieved += size;
        }

        debug!("Opened blob {hash} ({size} bytes)");
        Ok(Box::pin(ReaderStream::new(file)))
    }

    /// Open a decrypting stream over the blob stored under `hash`.
    ///
    /// The first chunk is decoded eagerly so a key that does not open the
    /// blob is reported here, before anything is streamed. That chunk is put
    /// back in front of the returned stream.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::NotFound`] if no blob is stored and
    /// [`ContentError::InvalidKey`] if the key is malformed or wrong.
    pub async fn decrypted_get(
        &self,
        hash: &str,
        key: &[u8],
        codec: &dyn DecryptCodec,
    ) -> Result<BlobStream, ContentError> {
        let blob_path = self.blob_path(hash)?;
        let mut stream = codec
            .open_decrypt_stream(&blob_path, key)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ContentError::NotFound(hash.to_string()),
                io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                    ContentError::InvalidKey
                }
                _ => ContentError::Io(e),
            })?;

        let first = stream.try_next().await.map_err(|e| {
            if e.kind() == io::ErrorKind::InvalidData {
                ContentError::InvalidKey
            } else {
                ContentError::Io(e)
            }
        })?;

        self.stats.write().blobs_retrieved += 1;
        debug!("Opened decrypting stream for blob {hash}");

        let head = futures::stream::iter(first.map(Ok));
        Ok(Box::pin(head.chain(stream)))
    }

    /// Check if a blob exists. An invalid hash never exists.
    pub async fn exists(&self, hash: &str) -> bool {
        let Ok(path) = self.blob_path(hash) else {
            return false;
        };
        fs::metadata(&path)
            .await
            .is_ok_and(|metadata| metadata.is_file())
    }

    /// Delete a blob.
    ///
    /// Returns `false` if nothing was stored under `hash`.
    ///
    /// # Errors
    ///
    /// Returns an error if the hash is invalid or deletion fails.
    pub async fn delete(&self, hash: &str) -> Result<bool, ContentError> {
        let blob_path = self.blob_path(hash)?;
        match fs::remove_file(&blob_path).await {
            Ok(()) => {
                self.stats.write().blobs_deleted += 1;
                debug!("Deleted blob {hash}");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// On-disk path of the blob for `hash`.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::InvalidAddress`] unless `hash` is 64 lowercase
    /// hex characters.
    pub fn blob_path(&self, hash: &str) -> Result<PathBuf, ContentError> {
        if !is_valid_hash(hash) {
            return Err(ContentError::InvalidAddress(hash.to_string()));
        }
        Ok(self
            .root_dir
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join(hash))
    }

    /// Get storage statistics.
    #[must_use]
    pub fn stats(&self) -> StorageStats {
        self.stats.read().clone()
    }

    /// Get the root directory.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

async fn write_and_rename(temp_path: &Path, blob_path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(temp_path).await?;
    file.write_all(content).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(temp_path, blob_path).await
}
