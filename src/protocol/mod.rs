//! Request/response types and wire-level conventions for cas-node.
//!
//! # Content Addressing
//!
//! Every blob is identified by the lowercase hex SHA-256 digest of its bytes.
//! The same string is the storage key on disk and the primary key of the
//! file record.
//!
//! # Error Codes
//!
//! Rejected requests carry a numeric [`ErrorCode`]. The numbering is stable
//! and each code is unique across upload, download, and audit:
//!
//! ```text
//! 1xx  malformed or unverifiable input
//! 2xx  node policy (disk, bandwidth, rate limits)
//! 3xx  lookup
//! ```

mod messages;
mod role;

pub use messages::{
    AuditProof, AuditRequest, DownloadRequest, ErrorBody, LostFileBody, UploadReceipt,
    UploadRequest,
};
pub use role::{Role, RoleParseError};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Default maximum size of a single uploaded blob (128 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 128 * 1024 * 1024;

/// Length of a hex-encoded SHA-256 digest.
pub const HASH_HEX_LEN: usize = 64;

/// Compute the content hash (lowercase hex SHA-256) of the given data.
#[must_use]
pub fn compute_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Check that `value` is a 64-character lowercase hex string.
///
/// Used for both content hashes and audit challenge seeds.
#[must_use]
pub fn is_valid_hash(value: &str) -> bool {
    value.len() == HASH_HEX_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Numeric error codes returned to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Content hash is not 64 lowercase hex characters.
    InvalidHash,
    /// Uploaded bytes do not hash to the declared content hash.
    MismatchedHash,
    /// Upload exceeds the maximum file size.
    HugeFile,
    /// Content is already stored on this node.
    RepeatedUpload,
    /// Audit challenge seed is malformed.
    InvalidSeed,
    /// Signature does not verify for the sender address.
    InvalidSignature,
    /// Decryption key is malformed or does not decrypt the blob.
    InvalidDecryptionKey,
    /// Not enough disk capacity left.
    FullDisk,
    /// Bandwidth or audit rate limit reached.
    LimitReached,
    /// No visible file for this hash.
    NotFound,
}

impl ErrorCode {
    /// All codes, in numeric order.
    pub const ALL: [Self; 10] = [
        Self::InvalidHash,
        Self::MismatchedHash,
        Self::HugeFile,
        Self::RepeatedUpload,
        Self::InvalidSeed,
        Self::InvalidSignature,
        Self::InvalidDecryptionKey,
        Self::FullDisk,
        Self::LimitReached,
        Self::NotFound,
    ];

    /// Numeric value sent on the wire.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::InvalidHash => 101,
            Self::MismatchedHash => 102,
            Self::HugeFile => 103,
            Self::RepeatedUpload => 104,
            Self::InvalidSeed => 105,
            Self::InvalidSignature => 106,
            Self::InvalidDecryptionKey => 107,
            Self::FullDisk => 201,
            Self::LimitReached => 202,
            Self::NotFound => 301,
        }
    }

    /// Look up a code by its numeric value.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Symbolic name, as used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::InvalidHash => "INVALID_HASH",
            Self::MismatchedHash => "MISMATCHED_HASH",
            Self::HugeFile => "HUGE_FILE",
            Self::RepeatedUpload => "REPEATED_UPLOAD",
            Self::InvalidSeed => "INVALID_SEED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::InvalidDecryptionKey => "INVALID_DECRYPTION_KEY",
            Self::FullDisk => "FULL_DISK",
            Self::LimitReached => "LIMIT_REACHED",
            Self::NotFound => "NOT_FOUND",
        }
    }

    /// HTTP status for a response carrying this code.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::NotFound => 404,
            _ => 400,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.code())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u16::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown error code {code}")))
    }
}
