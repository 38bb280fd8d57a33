//! File metadata and audit history.
//!
//! The node keeps two tables next to the blob store:
//!
//! ```text
//! files  (hash PK, role, size, owner)      one row per stored blob
//! audit  (file_hash, is_owner, made_at)    append-only challenge log
//! ```
//!
//! [`RecordStore`] is the interface the engines consume. Two backends ship:
//! [`MemoryRecordStore`] for tests and throwaway nodes, and
//! [`SqliteRecordStore`] for persistent nodes.
//!
//! Inserting a file whose hash already exists fails with
//! [`RecordError::Duplicate`]; the upload path relies on that unique
//! constraint to settle concurrent uploads of the same content.

mod memory;
mod sqlite;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use crate::protocol::Role;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a record store.
#[derive(Debug, Error)]
pub enum RecordError {
    /// A file record with this hash already exists.
    #[error("file record already exists: {0}")]
    Duplicate(String),

    /// The underlying storage engine failed.
    #[error("record store failure: {0}")]
    Backend(String),
}

impl From<RecordError> for crate::error::Error {
    fn from(err: RecordError) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result type for record store operations.
pub type RecordResult<T> = std::result::Result<T, RecordError>;

/// Metadata of one stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Content hash; unique.
    pub hash: String,
    /// Visibility and encoding flags.
    pub role: Role,
    /// Blob length in bytes.
    pub size: u64,
    /// Address that signed the upload.
    pub owner: String,
}

/// Mutable fields of a file record. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRecordUpdate {
    /// New role.
    pub role: Option<Role>,
    /// New owner address.
    pub owner: Option<String>,
}

/// One audit challenge, kept for rate limiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditAttempt {
    /// Audited content hash.
    pub file_hash: String,
    /// Whether the auditor was the file owner.
    pub is_owner: bool,
    /// When the challenge was accepted.
    pub made_at: DateTime<Utc>,
}

impl AuditAttempt {
    /// Attempt made now.
    #[must_use]
    pub fn now(file_hash: impl Into<String>, is_owner: bool) -> Self {
        Self {
            file_hash: file_hash.into(),
            is_owner,
            made_at: Utc::now(),
        }
    }
}

/// Aggregate size figures over all file records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUsage {
    /// Size of the largest stored file (0 with no files).
    pub max_file_size: u64,
    /// Sum of all stored file sizes.
    pub used: u64,
}

impl StorageUsage {
    /// Aggregate over a set of records.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a FileRecord>) -> Self {
        records
            .into_iter()
            .fold(Self::default(), |acc, record| Self {
                max_file_size: acc.max_file_size.max(record.size),
                used: acc.used.saturating_add(record.size),
            })
    }
}

/// Transactional table store for file records and audit attempts.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new file record.
    ///
    /// Fails with [`RecordError::Duplicate`] if the hash already exists.
    async fn insert(&self, record: FileRecord) -> RecordResult<()>;

    /// Look up a file record by hash.
    async fn select_by_hash(&self, hash: &str) -> RecordResult<Option<FileRecord>>;

    /// All file records, ordered by hash.
    async fn select_all(&self) -> RecordResult<Vec<FileRecord>>;

    /// Apply `update` to the record for `hash`. Returns whether it existed.
    async fn update(&self, hash: &str, update: FileRecordUpdate) -> RecordResult<bool>;

    /// Delete the record for `hash` and its audit history.
    /// Returns whether it existed.
    async fn delete(&self, hash: &str) -> RecordResult<bool>;

    /// Append an audit attempt.
    async fn insert_audit_attempt(&self, attempt: AuditAttempt) -> RecordResult<()>;

    /// Count audit attempts for `hash` by the given requester class made at
    /// or after `since`.
    async fn count_audit_attempts(
        &self,
        hash: &str,
        is_owner: bool,
        since: DateTime<Utc>,
    ) -> RecordResult<u64>;

    /// Remove every audit attempt.
    async fn clear_audit_attempts(&self) -> RecordResult<()>;

    /// Largest and total file size over all records.
    async fn storage_usage(&self) -> RecordResult<StorageUsage> {
        let records = self.select_all().await?;
        Ok(StorageUsage::from_records(&records))
    }
}
