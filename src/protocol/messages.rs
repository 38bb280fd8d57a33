//! Request and response bodies for upload, download, and audit.

use super::{ErrorCode, Role};
use serde::{Deserialize, Serialize};

// =============================================================================
// Upload
// =============================================================================

/// Request to store a blob. The payload is supplied separately as a reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Declared content hash of the payload.
    pub data_hash: String,
    /// Role to record for the new file.
    pub file_role: Role,
    /// Address of the uploader.
    pub sender_address: Option<String>,
    /// Signature of `data_hash` by `sender_address`.
    pub signature: Option<String>,
}

/// Successful upload response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Content hash of the stored blob.
    pub data_hash: String,
    /// Role of the stored file. For a repeated upload this is the role
    /// recorded by the first upload.
    pub file_role: Role,
    /// `false` when the content was already present and nothing was written.
    #[serde(skip)]
    pub stored: bool,
}

// =============================================================================
// Download
// =============================================================================

/// Request to retrieve a blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Content hash to retrieve.
    pub data_hash: String,
    /// Address of the caller; omit for anonymous access.
    pub sender_address: Option<String>,
    /// Signature of `data_hash` by `sender_address`.
    pub signature: Option<String>,
    /// Hex-encoded convergent key; when present the blob is decrypted.
    pub decryption_key: Option<String>,
}

impl DownloadRequest {
    /// Anonymous request for `data_hash`.
    #[must_use]
    pub fn anonymous(data_hash: impl Into<String>) -> Self {
        Self {
            data_hash: data_hash.into(),
            ..Self::default()
        }
    }

    /// Whether both a sender address and a signature were supplied.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.sender_address.is_some() && self.signature.is_some()
    }
}

// =============================================================================
// Audit
// =============================================================================

/// Proof-of-storage challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRequest {
    /// Content hash of the audited blob.
    pub data_hash: String,
    /// 64 hex character challenge seed.
    pub challenge_seed: String,
    /// Address of the auditor.
    pub sender_address: Option<String>,
    /// Signature of `data_hash` by `sender_address`.
    pub signature: Option<String>,
}

/// Answer to an audit challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditProof {
    /// Echo of the audited content hash.
    pub data_hash: String,
    /// Echo of the challenge seed.
    pub challenge_seed: String,
    /// `hex(SHA256(blob ++ utf8(seed)))`.
    pub challenge_response: String,
}

// =============================================================================
// Error bodies
// =============================================================================

/// Body of a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// The rejection code.
    pub error_code: ErrorCode,
}

/// Body of a lost-file response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LostFileBody {
    /// Peers that may still hold the content.
    pub peers: Vec<String>,
}
