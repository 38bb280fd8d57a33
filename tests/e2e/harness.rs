//! Test harness: a node in a temp directory plus signing helpers.

use bytes::Bytes;
use cas_node::crypto::Signer;
use cas_node::protocol::{AuditRequest, DownloadRequest, Role, UploadRequest};
use cas_node::{compute_hash, Download, Node, NodeBuilder, NodeConfig, UploadReceipt};
use futures::TryStreamExt;
use std::path::Path;
use tempfile::TempDir;

/// Default capacity of a test node (1 MiB).
pub const TEST_CAPACITY: u64 = 1024 * 1024;

/// A node running in its own temporary root directory.
pub struct TestNode {
    pub node: Node,
    pub owner: Signer,
    config: NodeConfig,
    dir: TempDir,
}

impl TestNode {
    /// Start a node with default test settings.
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    /// Start a node after adjusting its configuration.
    pub async fn start_with(configure: impl FnOnce(&mut NodeConfig)) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let mut config = NodeConfig::with_root(dir.path());
        config.public_key = "test-node".to_string();
        config.capacity = TEST_CAPACITY;
        configure(&mut config);

        let node = NodeBuilder::new(config.clone())
            .build()
            .await
            .expect("build node");
        Self {
            node,
            owner: Signer::generate(),
            config,
            dir,
        }
    }

    /// Stop the node and build a new one over the same directory.
    pub async fn restart(self) -> Self {
        let Self {
            node,
            owner,
            config,
            dir,
        } = self;
        drop(node);

        let node = NodeBuilder::new(config.clone())
            .build()
            .await
            .expect("rebuild node");
        Self {
            node,
            owner,
            config,
            dir,
        }
    }

    /// Root directory of the node.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Upload `data` as the default owner and return its hash.
    pub async fn store(&self, data: &[u8], role: Role) -> String {
        let receipt = self.upload_as(&self.owner, data, role).await.expect("upload");
        assert!(receipt.stored, "expected a fresh write");
        receipt.data_hash
    }

    /// Upload `data` signed by `signer`.
    pub async fn upload_as(
        &self,
        signer: &Signer,
        data: &[u8],
        role: Role,
    ) -> Result<UploadReceipt, cas_node::RequestError> {
        let request = upload_request(signer, &compute_hash(data), role);
        self.node.upload(&request, data).await
    }
}

/// Signed upload request.
pub fn upload_request(signer: &Signer, hash: &str, role: Role) -> UploadRequest {
    UploadRequest {
        data_hash: hash.to_string(),
        file_role: role,
        sender_address: Some(signer.address()),
        signature: Some(signer.sign(hash)),
    }
}

/// Signed download request without a decryption key.
pub fn download_request(signer: &Signer, hash: &str) -> DownloadRequest {
    DownloadRequest {
        data_hash: hash.to_string(),
        sender_address: Some(signer.address()),
        signature: Some(signer.sign(hash)),
        decryption_key: None,
    }
}

/// Signed audit request.
pub fn audit_request(signer: &Signer, hash: &str, seed: &str) -> AuditRequest {
    AuditRequest {
        data_hash: hash.to_string(),
        challenge_seed: seed.to_string(),
        sender_address: Some(signer.address()),
        signature: Some(signer.sign(hash)),
    }
}

/// Drain a download into memory.
pub async fn read_all(download: Download) -> Vec<u8> {
    let chunks: Vec<Bytes> = download.stream.try_collect().await.expect("read stream");
    chunks.concat()
}

/// Public plaintext role.
pub fn public() -> Role {
    Role::public()
}

/// Owner-only plaintext role.
pub fn private() -> Role {
    Role::new(false, true, false)
}

/// Public convergent-encrypted role.
pub fn encrypted() -> Role {
    Role::new(false, false, true)
}
