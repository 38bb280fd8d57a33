//! Uploads, downloads, and listings.
//!
//! # Upload
//!
//! ```text
//! already stored? ──yes──▶ receipt with existing role, nothing written
//!       │ no
//! Signature, HashFormat, Blacklist
//!       │
//! read payload (capped at max_file_size + 1)
//!       │
//! HUGE_FILE ▶ FULL_DISK ▶ LIMIT_REACHED ▶ MISMATCHED_HASH
//!       │
//! count incoming bytes ▶ write blob ▶ insert record
//!                     ◀── released if either write fails
//! ```
//!
//! # Download
//!
//! Anonymous callers only see public files whose role is publicly served.
//! Authenticated callers see public files and their own private files.
//! Outgoing bytes are counted before the stream is handed out.

use crate::blacklist::Blacklist;
use crate::checker::{Check, CheckContext, CheckFailure};
use crate::crypto::DecryptCodec;
use crate::error::{Error, RequestError, Result};
use crate::node_state::{Direction, NodeState};
use crate::peers::PeerList;
use crate::protocol::{
    compute_hash, DownloadRequest, ErrorCode, UploadReceipt, UploadRequest, DEFAULT_MAX_FILE_SIZE,
};
use crate::records::{FileRecord, RecordError, RecordStore};
use crate::storage::{BlobStream, ContentError, ContentStore};
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

/// A download ready to be streamed to the caller.
pub struct Download {
    /// Content hash.
    pub hash: String,
    /// Stored blob size, as counted against the outgoing limit.
    pub size: u64,
    /// Blob bytes, decrypted if a key was supplied.
    pub stream: BlobStream,
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download")
            .field("hash", &self.hash)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Moves blobs in and out of the node under quota and access control.
pub struct TransferEngine {
    checks: CheckContext,
    records: Arc<dyn RecordStore>,
    content: Arc<ContentStore>,
    state: Arc<NodeState>,
    peers: Arc<PeerList>,
    blacklist: Arc<Blacklist>,
    codec: Arc<dyn DecryptCodec>,
    max_file_size: u64,
}

impl TransferEngine {
    /// Create a transfer engine with the default maximum file size.
    #[must_use]
    pub fn new(
        checks: CheckContext,
        records: Arc<dyn RecordStore>,
        content: Arc<ContentStore>,
        state: Arc<NodeState>,
        peers: Arc<PeerList>,
        blacklist: Arc<Blacklist>,
        codec: Arc<dyn DecryptCodec>,
    ) -> Self {
        Self {
            checks,
            records,
            content,
            state,
            peers,
            blacklist,
            codec,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Set the maximum accepted upload size.
    #[must_use]
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Store the blob read from `payload` under the declared hash.
    ///
    /// Content that is already stored is acknowledged with its existing role
    /// and `stored == false`; the payload is not read.
    ///
    /// # Errors
    ///
    /// Returns a rejection for a bad signature or hash, a blacklisted hash,
    /// an oversized payload, a full disk, an exhausted incoming limit, or a
    /// payload that does not match the declared hash. Nothing is written or
    /// counted when the upload is rejected.
    pub async fn upload<R>(
        &self,
        request: &UploadRequest,
        payload: R,
    ) -> std::result::Result<UploadReceipt, RequestError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let hash = request.data_hash.as_str();
        let mut checker = self.checks.checker(
            hash,
            request.sender_address.as_deref(),
            request.signature.as_deref(),
        );

        match checker.run(&[Check::DoubleUpload]).await? {
            Some(CheckFailure::AlreadyPresent(role)) => {
                debug!("Upload of {hash} skipped, already stored");
                return Ok(already_present(hash, role));
            }
            Some(failure) => return Err(failure.into()),
            None => {}
        }
        checker
            .require(&[Check::Signature, Check::HashFormat, Check::Blacklist])
            .await?;

        let data = read_capped(payload, self.max_file_size)
            .await
            .map_err(Error::from)?;
        let size = data.len() as u64;

        if size > self.max_file_size {
            return Err(ErrorCode::HugeFile.into());
        }
        if size > self.state.capacity() {
            return Err(ErrorCode::FullDisk.into());
        }
        if self.state.would_exceed(Direction::Incoming, size) {
            return Err(ErrorCode::LimitReached.into());
        }
        if compute_hash(&data) != hash {
            warn!("Upload payload does not hash to declared {hash}");
            return Err(ErrorCode::MismatchedHash.into());
        }
        if !self
            .state
            .try_record_transfer(Direction::Incoming, size)
            .await?
        {
            return Err(ErrorCode::LimitReached.into());
        }

        match self.commit(request, &data).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                if let Err(release) = self.state.release_transfer(Direction::Incoming, size).await
                {
                    warn!("Failed to release {size} incoming bytes for {hash}: {release}");
                }
                Err(e)
            }
        }
    }

    /// Write the blob, then its record.
    ///
    /// A record insert that fails for any reason other than a concurrent
    /// duplicate removes a blob this call created.
    async fn commit(
        &self,
        request: &UploadRequest,
        data: &[u8],
    ) -> std::result::Result<UploadReceipt, RequestError> {
        let hash = request.data_hash.as_str();
        let created = self.content.put(hash, data).await.map_err(Error::from)?;

        let record = FileRecord {
            hash: hash.to_string(),
            role: request.file_role,
            size: data.len() as u64,
            owner: request.sender_address.clone().unwrap_or_default(),
        };
        match self.records.insert(record).await {
            Ok(()) => {}
            Err(RecordError::Duplicate(_)) => {
                let existing = self.records.select_by_hash(hash).await?;
                let role = existing.map_or(request.file_role, |file| file.role);
                debug!("Concurrent upload of {hash} won by another request");
                return Ok(already_present(hash, role));
            }
            Err(e) => {
                if created {
                    if let Err(cleanup) = self.content.delete(hash).await {
                        warn!("Failed to remove unrecorded blob {hash}: {cleanup}");
                    }
                }
                return Err(e.into());
            }
        }

        info!(
            "Stored {hash} ({} bytes, role {})",
            data.len(),
            request.file_role
        );
        Ok(UploadReceipt {
            data_hash: hash.to_string(),
            file_role: request.file_role,
            stored: true,
        })
    }

    /// Open the blob for `request.data_hash`, decrypting it if a key is given.
    ///
    /// # Errors
    ///
    /// Returns a rejection for a bad hash or signature, a missing or
    /// invisible file, an exhausted outgoing limit, or a bad decryption key.
    /// Returns [`RequestError::LostFile`] if the record exists without its
    /// blob. Outgoing bytes are only counted on success.
    pub async fn download(
        &self,
        request: &DownloadRequest,
    ) -> std::result::Result<Download, RequestError> {
        let hash = request.data_hash.as_str();
        let authenticated = request.is_authenticated();
        let mut checker = self.checks.checker(
            hash,
            request.sender_address.as_deref(),
            request.signature.as_deref(),
        );

        if authenticated {
            checker
                .require(&[
                    Check::HashFormat,
                    Check::Blacklist,
                    Check::FileLookup,
                    Check::Signature,
                ])
                .await?;
        } else {
            checker
                .require(&[Check::HashFormat, Check::Blacklist, Check::FileLookup])
                .await?;
        }
        let Some(file) = checker.into_file() else {
            return Err(ErrorCode::NotFound.into());
        };
        if !authenticated && !file.role.is_publicly_served() {
            debug!("Anonymous download of {hash} refused for role {}", file.role);
            return Err(ErrorCode::NotFound.into());
        }

        if self.state.would_exceed(Direction::Outgoing, file.size) {
            return Err(ErrorCode::LimitReached.into());
        }
        if !self.content.exists(hash).await {
            return Err(self.peers.lost_file(hash).await);
        }

        let opened = match &request.decryption_key {
            Some(key_hex) => {
                if !file.role.is_encrypted() {
                    return Err(ErrorCode::NotFound.into());
                }
                let key =
                    hex::decode(key_hex).map_err(|_| ErrorCode::InvalidDecryptionKey)?;
                self.content
                    .decrypted_get(hash, &key, self.codec.as_ref())
                    .await
            }
            None => self.content.get(hash).await,
        };
        let stream = match opened {
            Ok(stream) => stream,
            Err(ContentError::InvalidKey) => return Err(ErrorCode::InvalidDecryptionKey.into()),
            Err(ContentError::NotFound(_)) => return Err(self.peers.lost_file(hash).await),
            Err(e) => return Err(RequestError::Fatal(e.into())),
        };

        if !self
            .state
            .try_record_transfer(Direction::Outgoing, file.size)
            .await?
        {
            return Err(ErrorCode::LimitReached.into());
        }

        debug!("Serving {hash} ({} bytes)", file.size);
        Ok(Download {
            hash: file.hash,
            size: file.size,
            stream,
        })
    }

    /// Hashes of all stored files, except blacklisted ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the record store fails.
    pub async fn list(&self) -> Result<Vec<String>> {
        let records = self.records.select_all().await?;
        Ok(records
            .into_iter()
            .map(|file| file.hash)
            .filter(|hash| !self.blacklist.contains(hash))
            .collect())
    }
}

fn already_present(hash: &str, role: crate::protocol::Role) -> UploadReceipt {
    UploadReceipt {
        data_hash: hash.to_string(),
        file_role: role,
        stored: false,
    }
}

/// Read at most `max + 1` bytes, enough to tell an oversized payload apart.
async fn read_capped<R>(payload: R, max: u64) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut data = Vec::new();
    payload
        .take(max.saturating_add(1))
        .read_to_end(&mut data)
        .await?;
    Ok(data)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::crypto::{ConvergentCodec, Ed25519Verifier, Signer};
    use crate::protocol::Role;
    use crate::records::MemoryRecordStore;
    use bytes::Bytes;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    struct Fixture {
        engine: TransferEngine,
        state: Arc<NodeState>,
        records: Arc<dyn RecordStore>,
        content: Arc<ContentStore>,
        signer: Signer,
        _dir: TempDir,
    }

    fn fixture_with(capacity: u64, max_file_size: u64, blacklisted: &[&str]) -> Fixture {
        let dir = TempDir::new().expect("temp dir");
        let records: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
        let blacklist = Arc::new(Blacklist::from_hashes(blacklisted.iter().copied()));
        let content = Arc::new(ContentStore::new(dir.path().join("storage")));
        let state = Arc::new(NodeState::in_memory("node", capacity));
        let checks = CheckContext::new(
            blacklist.clone(),
            records.clone(),
            Arc::new(Ed25519Verifier),
        );
        let engine = TransferEngine::new(
            checks,
            records.clone(),
            content.clone(),
            state.clone(),
            Arc::new(PeerList::new(dir.path().join("peers.txt"))),
            blacklist,
            Arc::new(ConvergentCodec),
        )
        .with_max_file_size(max_file_size);
        Fixture {
            engine,
            state,
            records,
            content,
            signer: Signer::generate(),
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(1 << 20, 1 << 16, &[])
    }

    fn upload_request(signer: &Signer, hash: &str, role: Role) -> UploadRequest {
        UploadRequest {
            data_hash: hash.to_string(),
            file_role: role,
            sender_address: Some(signer.address()),
            signature: Some(signer.sign(hash)),
        }
    }

    fn download_request(signer: &Signer, hash: &str) -> DownloadRequest {
        DownloadRequest {
            data_hash: hash.to_string(),
            sender_address: Some(signer.address()),
            signature: Some(signer.sign(hash)),
            decryption_key: None,
        }
    }

    async fn upload(fx: &Fixture, data: &[u8], role: Role) -> String {
        let hash = compute_hash(data);
        let receipt = fx
            .engine
            .upload(&upload_request(&fx.signer, &hash, role), data)
            .await
            .expect("upload");
        assert!(receipt.stored);
        hash
    }

    async fn collect(download: Download) -> Vec<u8> {
        let chunks: Vec<Bytes> = download.stream.try_collect().await.expect("stream");
        chunks.concat()
    }

    #[tokio::test]
    async fn test_upload_stores_blob_and_record() {
        let fx = fixture();
        let data = b"existing file data";
        let hash = upload(&fx, data, Role::public()).await;

        let record = fx.records.select_by_hash(&hash).await.unwrap().unwrap();
        assert_eq!(record.size, data.len() as u64);
        assert_eq!(record.owner, fx.signer.address());
        assert!(fx.content.exists(&hash).await);
        assert_eq!(fx.state.current_usage(Direction::Incoming), data.len() as u64);
    }

    #[tokio::test]
    async fn test_repeated_upload_returns_existing_role() {
        let fx = fixture();
        let data = b"twice";
        let hash = upload(&fx, data, Role::new(false, false, true)).await;
        let before = fx.state.current_usage(Direction::Incoming);

        // Unsigned and with a different role: the existing record wins.
        let request = UploadRequest {
            data_hash: hash.clone(),
            file_role: Role::public(),
            sender_address: None,
            signature: None,
        };
        let receipt = fx.engine.upload(&request, &b"ignored"[..]).await.unwrap();
        assert!(!receipt.stored);
        assert_eq!(receipt.file_role, Role::new(false, false, true));
        assert_eq!(fx.state.current_usage(Direction::Incoming), before);
    }

    #[tokio::test]
    async fn test_mismatched_hash() {
        let fx = fixture();
        let hash = compute_hash(b"declared");
        let err = fx
            .engine
            .upload(&upload_request(&fx.signer, &hash, Role::public()), &b"actual"[..])
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::MismatchedHash));
        assert!(fx.records.select_by_hash(&hash).await.unwrap().is_none());
        assert!(!fx.content.exists(&hash).await);
        assert_eq!(fx.state.current_usage(Direction::Incoming), 0);
    }

    #[tokio::test]
    async fn test_huge_file() {
        let fx = fixture_with(1 << 20, 8, &[]);
        let data = b"nine bytes";
        let hash = compute_hash(data);
        let err = fx
            .engine
            .upload(&upload_request(&fx.signer, &hash, Role::public()), &data[..])
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::HugeFile));
    }

    #[tokio::test]
    async fn test_full_disk() {
        let fx = fixture_with(10, 1 << 16, &[]);
        upload(&fx, b"seven b", Role::public()).await;
        // Capacity bounds each file, not the sum of stored files.
        upload(&fx, b"four", Role::public()).await;

        let data = b"eleven byte";
        let hash = compute_hash(data);
        let err = fx
            .engine
            .upload(&upload_request(&fx.signer, &hash, Role::public()), &data[..])
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::FullDisk));
        assert_eq!(fx.state.current_usage(Direction::Incoming), 11);
    }

    #[tokio::test]
    async fn test_failed_write_releases_incoming_bytes() {
        let fx = fixture();
        fx.state.set_limits(Some(18), None).await.unwrap();
        tokio::fs::write(fx.content.root_dir(), b"not a directory")
            .await
            .unwrap();

        let data = b"existing file data";
        let hash = compute_hash(data);
        let request = upload_request(&fx.signer, &hash, Role::public());
        let err = fx.engine.upload(&request, &data[..]).await.unwrap_err();
        assert!(matches!(err, RequestError::Fatal(_)));
        assert!(fx.records.select_by_hash(&hash).await.unwrap().is_none());
        assert_eq!(fx.state.current_usage(Direction::Incoming), 0);
        assert_eq!(fx.state.total_usage(Direction::Incoming), 0);

        tokio::fs::remove_file(fx.content.root_dir()).await.unwrap();
        let receipt = fx.engine.upload(&request, &data[..]).await.unwrap();
        assert!(receipt.stored);
        assert_eq!(fx.state.current_usage(Direction::Incoming), 18);
    }

    #[tokio::test]
    async fn test_incoming_limit() {
        let fx = fixture();
        fx.state.set_limits(Some(3), None).await.unwrap();
        let data = b"too much";
        let hash = compute_hash(data);
        let err = fx
            .engine
            .upload(&upload_request(&fx.signer, &hash, Role::public()), &data[..])
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::LimitReached));
    }

    #[tokio::test]
    async fn test_upload_validation_order() {
        let hash = compute_hash(b"listed");
        let fx = fixture_with(1 << 20, 1 << 16, &[hash.as_str()]);

        let mut request = upload_request(&fx.signer, &hash, Role::public());
        request.signature = Some(fx.signer.sign("other"));
        let err = fx.engine.upload(&request, &b"listed"[..]).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidSignature));

        let request = upload_request(&fx.signer, "ZZ", Role::public());
        let err = fx.engine.upload(&request, &b"x"[..]).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidHash));

        let request = upload_request(&fx.signer, &hash, Role::public());
        let err = fx.engine.upload(&request, &b"listed"[..]).await.unwrap_err();
        assert!(matches!(err, RequestError::Blacklisted));
    }

    #[tokio::test]
    async fn test_download_authenticated() {
        let fx = fixture();
        let data = b"download me";
        let hash = upload(&fx, data, Role::public()).await;

        let download = fx
            .engine
            .download(&download_request(&fx.signer, &hash))
            .await
            .expect("download");
        assert_eq!(download.size, data.len() as u64);
        assert_eq!(collect(download).await, data);
        assert_eq!(fx.state.current_usage(Direction::Outgoing), data.len() as u64);
    }

    #[tokio::test]
    async fn test_anonymous_download_needs_publicly_served_role() {
        let fx = fixture();
        let plain = upload(&fx, b"plain public", Role::public()).await;
        let served = upload(&fx, b"served public", Role::new(false, false, true)).await;

        let err = fx
            .engine
            .download(&DownloadRequest::anonymous(&plain))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NotFound));

        let download = fx
            .engine
            .download(&DownloadRequest::anonymous(&served))
            .await
            .expect("anonymous download");
        assert_eq!(collect(download).await, b"served public");
    }

    #[tokio::test]
    async fn test_private_download_non_owner() {
        let fx = fixture();
        let hash = upload(&fx, b"mine only", Role::new(false, true, false)).await;

        let stranger = Signer::generate();
        let err = fx
            .engine
            .download(&download_request(&stranger, &hash))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NotFound));

        fx.engine
            .download(&download_request(&fx.signer, &hash))
            .await
            .expect("owner download");
    }

    #[tokio::test]
    async fn test_outgoing_limit_leaves_counter_untouched() {
        let fx = fixture();
        let hash = upload(&fx, b"existing file data!", Role::public()).await;
        fx.state.set_limits(None, Some(1)).await.unwrap();

        let err = fx
            .engine
            .download(&download_request(&fx.signer, &hash))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::LimitReached));
        assert_eq!(fx.state.current_usage(Direction::Outgoing), 0);
    }

    #[tokio::test]
    async fn test_lost_file() {
        let fx = fixture();
        let hash = upload(&fx, b"soon lost", Role::public()).await;
        fx.content.delete(&hash).await.unwrap();

        let err = fx
            .engine
            .download(&download_request(&fx.signer, &hash))
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::LostFile { .. }));
        assert_eq!(fx.state.current_usage(Direction::Outgoing), 0);
    }

    #[tokio::test]
    async fn test_encrypted_download() {
        let fx = fixture();
        let plaintext = b"convergent secret";
        let (key, blob) = ConvergentCodec::encrypt(plaintext).unwrap();
        let hash = upload(&fx, &blob, Role::new(false, false, true)).await;

        let mut request = download_request(&fx.signer, &hash);
        request.decryption_key = Some(hex::encode(key));
        let download = fx.engine.download(&request).await.expect("decrypt");
        assert_eq!(collect(download).await, plaintext);

        request.decryption_key = Some(hex::encode([9u8; 32]));
        let err = fx.engine.download(&request).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidDecryptionKey));

        request.decryption_key = Some("not hex".to_string());
        let err = fx.engine.download(&request).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::InvalidDecryptionKey));
    }

    #[tokio::test]
    async fn test_key_on_plaintext_role() {
        let fx = fixture();
        let hash = upload(&fx, b"plaintext", Role::public()).await;
        let mut request = download_request(&fx.signer, &hash);
        request.decryption_key = Some(hex::encode([1u8; 32]));
        let err = fx.engine.download(&request).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::NotFound));
    }

    #[tokio::test]
    async fn test_list_hides_blacklisted() {
        let hidden = compute_hash(b"hidden");
        let fx = fixture_with(1 << 20, 1 << 16, &[hidden.as_str()]);
        let visible = upload(&fx, b"visible", Role::public()).await;
        fx.records
            .insert(FileRecord {
                hash: hidden.clone(),
                role: Role::public(),
                size: 6,
                owner: String::new(),
            })
            .await
            .unwrap();

        assert_eq!(fx.engine.list().await.unwrap(), vec![visible]);
    }
}
