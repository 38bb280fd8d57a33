//! # cas-node
//!
//! A storage node for a peer-operated content-addressable storage network.
//!
//! Clients upload opaque blobs identified by the SHA-256 of their bytes,
//! download them by hash, and audit the node with keyed hash challenges to
//! prove it still holds what it claims to hold. The node enforces bandwidth
//! and capacity quotas, a revocation blacklist, and signature-based access
//! control on private files.
//!
//! ## Architecture
//!
//! - [`checker`]: ordered validation checks shared by every request
//! - [`storage`]: sharded on-disk blob store with lazy read streams
//! - [`node_state`]: persisted bandwidth and capacity counters
//! - [`audit`]: rate-limited proof-of-storage challenges
//! - [`transfer`]: uploads, downloads, and listings
//! - [`node`]: builds everything from a [`NodeConfig`] and exposes [`Node`]
//!
//! The record store, signature scheme, and decryption codec sit behind
//! traits ([`RecordStore`], [`SignatureVerifier`], [`DecryptCodec`]) and can
//! be swapped through [`NodeBuilder`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use cas_node::{NodeBuilder, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = NodeBuilder::new(NodeConfig::default()).build().await?;
//!     for hash in node.list_files().await? {
//!         println!("{hash}");
//!     }
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod blacklist;
pub mod checker;
pub mod config;
pub mod crypto;
pub mod error;
pub mod node;
pub mod node_state;
pub mod peers;
pub mod protocol;
pub mod records;
pub mod storage;
pub mod transfer;

pub use audit::{AuditEngine, AuditLimits};
pub use blacklist::Blacklist;
pub use checker::{Check, CheckContext, CheckFailure, Checker};
pub use config::{NodeConfig, RecordBackend, RecordsConfig};
pub use crypto::{ConvergentCodec, DecryptCodec, Ed25519Verifier, SignatureVerifier, Signer};
pub use error::{Error, RequestError, Result};
pub use node::{Node, NodeBuilder};
pub use node_state::{Direction, NodeState, NodeStatus};
pub use peers::PeerList;
pub use protocol::{
    compute_hash, AuditProof, AuditRequest, DownloadRequest, ErrorCode, Role, UploadReceipt,
    UploadRequest,
};
pub use records::{FileRecord, MemoryRecordStore, RecordStore, SqliteRecordStore};
pub use storage::{BlobStream, ContentError, ContentStore};
pub use transfer::{Download, TransferEngine};
