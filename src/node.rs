//! The storage node: wiring and public operations.
//!
//! [`NodeBuilder`] opens every component once from a [`NodeConfig`] and
//! hands them to the engines as shared `Arc`s. [`Node`] is the only entry
//! point a transport layer needs.
//!
//! ```text
//!                    ┌──────────────┐
//!  upload/download ─▶│TransferEngine│──┐
//!                    └──────────────┘  │   Checker ─▶ Blacklist
//!                    ┌──────────────┐  ├─▶ NodeState   RecordStore
//!  audit ───────────▶│ AuditEngine  │──┘   ContentStore SignatureVerifier
//!                    └──────────────┘      PeerList    DecryptCodec
//! ```

use crate::audit::AuditEngine;
use crate::blacklist::Blacklist;
use crate::checker::CheckContext;
use crate::config::{NodeConfig, RecordBackend};
use crate::crypto::{ConvergentCodec, DecryptCodec, Ed25519Verifier, SignatureVerifier};
use crate::error::{Error, RequestError, Result};
use crate::node_state::{NodeState, NodeStatus};
use crate::peers::PeerList;
use crate::protocol::{
    is_valid_hash, AuditProof, AuditRequest, DownloadRequest, UploadReceipt, UploadRequest,
};
use crate::records::{FileRecord, MemoryRecordStore, RecordStore, SqliteRecordStore};
use crate::storage::ContentStore;
use crate::transfer::{Download, TransferEngine};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

/// Builder for constructing a node.
pub struct NodeBuilder {
    config: NodeConfig,
    records: Option<Arc<dyn RecordStore>>,
    verifier: Option<Arc<dyn SignatureVerifier>>,
    codec: Option<Arc<dyn DecryptCodec>>,
}

impl NodeBuilder {
    /// Create a new node builder with the given configuration.
    #[must_use]
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            records: None,
            verifier: None,
            codec: None,
        }
    }

    /// Use `records` instead of opening the configured backend.
    #[must_use]
    pub fn with_record_store(mut self, records: Arc<dyn RecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    /// Use `verifier` instead of Ed25519.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Use `codec` instead of the convergent codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn DecryptCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Open all components and wire the engines.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory, blacklist, record store, or
    /// state file cannot be opened, or if the state file is corrupt.
    pub async fn build(self) -> Result<Node> {
        let config = self.config;
        info!("Building cas-node at {}", config.root_dir.display());

        tokio::fs::create_dir_all(&config.root_dir).await?;

        let blacklist = Arc::new(Blacklist::load(&config.blacklist_file()).await?);
        let records = match self.records {
            Some(records) => records,
            None => Self::open_records(&config).await?,
        };
        let state = Arc::new(
            NodeState::load_or_init(config.state_file(), config.public_key.clone(), config.capacity)
                .await?,
        );
        let content = Arc::new(ContentStore::new(config.storage_dir()));
        let peers = Arc::new(PeerList::new(config.peers_file()));
        let verifier: Arc<dyn SignatureVerifier> = match self.verifier {
            Some(verifier) => verifier,
            None => Arc::new(Ed25519Verifier),
        };
        let codec: Arc<dyn DecryptCodec> = match self.codec {
            Some(codec) => codec,
            None => Arc::new(ConvergentCodec),
        };

        let checks = CheckContext::new(Arc::clone(&blacklist), Arc::clone(&records), verifier);
        let audit = AuditEngine::new(
            checks.clone(),
            Arc::clone(&records),
            Arc::clone(&content),
            Arc::clone(&peers),
            config.audit,
        );
        let transfer = TransferEngine::new(
            checks,
            Arc::clone(&records),
            Arc::clone(&content),
            Arc::clone(&state),
            peers,
            Arc::clone(&blacklist),
            codec,
        )
        .with_max_file_size(config.max_file_size);

        debug!("Node components wired");

        Ok(Node {
            config,
            blacklist,
            records,
            state,
            content,
            audit,
            transfer,
        })
    }

    async fn open_records(config: &NodeConfig) -> Result<Arc<dyn RecordStore>> {
        match config.records.backend {
            RecordBackend::Sqlite => {
                let store = SqliteRecordStore::open(&config.records_file()).await?;
                Ok(Arc::new(store))
            }
            RecordBackend::Memory => {
                warn!("Using in-memory record store; file records are lost on restart");
                Ok(Arc::new(MemoryRecordStore::new()))
            }
        }
    }
}

/// A running storage node.
pub struct Node {
    config: NodeConfig,
    blacklist: Arc<Blacklist>,
    records: Arc<dyn RecordStore>,
    state: Arc<NodeState>,
    content: Arc<ContentStore>,
    audit: AuditEngine,
    transfer: TransferEngine,
}

impl Node {
    /// Store a blob. See [`TransferEngine::upload`].
    ///
    /// # Errors
    ///
    /// Returns the rejection or failure of the upload.
    pub async fn upload<R>(
        &self,
        request: &UploadRequest,
        payload: R,
    ) -> std::result::Result<UploadReceipt, RequestError>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.transfer.upload(request, payload).await
    }

    /// Retrieve a blob. See [`TransferEngine::download`].
    ///
    /// # Errors
    ///
    /// Returns the rejection or failure of the download.
    pub async fn download(
        &self,
        request: &DownloadRequest,
    ) -> std::result::Result<Download, RequestError> {
        self.transfer.download(request).await
    }

    /// Answer an audit challenge. See [`AuditEngine::audit`].
    ///
    /// # Errors
    ///
    /// Returns the rejection or failure of the audit.
    pub async fn audit(&self, request: &AuditRequest) -> std::result::Result<AuditProof, RequestError> {
        self.audit.audit(request).await
    }

    /// Hashes of all stored files, except blacklisted ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the record store fails.
    pub async fn list_files(&self) -> Result<Vec<String>> {
        self.transfer.list().await
    }

    /// Bandwidth and storage status with live usage figures.
    ///
    /// # Errors
    ///
    /// Returns an error if the record store fails.
    pub async fn status(&self) -> Result<NodeStatus> {
        let usage = self.records.storage_usage().await?;
        Ok(self.state.status(usage))
    }

    /// Replace both bandwidth limits. `None` removes a limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub async fn set_limits(&self, incoming: Option<u64>, outgoing: Option<u64>) -> Result<()> {
        self.state.set_limits(incoming, outgoing).await
    }

    /// Replace the storage capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub async fn set_capacity(&self, capacity: u64) -> Result<()> {
        self.state.set_capacity(capacity).await
    }

    /// Start a new bandwidth accounting period.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub async fn reset_bandwidth(&self) -> Result<()> {
        self.state.reset_current().await
    }

    /// Re-read the blacklist file. Returns the number of entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn reload_blacklist(&self) -> Result<usize> {
        self.blacklist.reload().await
    }

    /// Records whose blob is missing from the content store.
    ///
    /// # Errors
    ///
    /// Returns an error if the record store fails.
    pub async fn find_lost_files(&self) -> Result<Vec<FileRecord>> {
        let mut lost = Vec::new();
        for file in self.records.select_all().await? {
            if !self.content.exists(&file.hash).await {
                lost.push(file);
            }
        }
        if !lost.is_empty() {
            warn!("{} file records have no blob", lost.len());
        }
        Ok(lost)
    }

    /// Delete a file: its record first, then its blob.
    ///
    /// Returns `false` if neither existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the hash is invalid or either deletion fails.
    pub async fn remove_file(&self, hash: &str) -> Result<bool> {
        if !is_valid_hash(hash) {
            return Err(Error::Storage(format!("invalid content hash {hash:?}")));
        }
        let had_record = self.records.delete(hash).await?;
        let had_blob = self.content.delete(hash).await?;
        info!("Removed {hash} (record: {had_record}, blob: {had_blob})");
        Ok(had_record || had_blob)
    }

    /// Configuration the node was built from.
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Shared bandwidth/capacity state.
    #[must_use]
    pub fn state(&self) -> &Arc<NodeState> {
        &self.state
    }

    /// Blob store.
    #[must_use]
    pub fn content_store(&self) -> &Arc<ContentStore> {
        &self.content
    }
}
