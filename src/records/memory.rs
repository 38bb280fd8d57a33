//! In-memory record store.

use super::{
    AuditAttempt, FileRecord, FileRecordUpdate, RecordError, RecordResult, RecordStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Record store kept entirely in memory.
///
/// Lost on restart; intended for tests and ephemeral nodes.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    files: RwLock<BTreeMap<String, FileRecord>>,
    audits: RwLock<Vec<AuditAttempt>>,
}

impl MemoryRecordStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: FileRecord) -> RecordResult<()> {
        let mut files = self.files.write();
        if files.contains_key(&record.hash) {
            return Err(RecordError::Duplicate(record.hash));
        }
        files.insert(record.hash.clone(), record);
        Ok(())
    }

    async fn select_by_hash(&self, hash: &str) -> RecordResult<Option<FileRecord>> {
        Ok(self.files.read().get(hash).cloned())
    }

    async fn select_all(&self) -> RecordResult<Vec<FileRecord>> {
        Ok(self.files.read().values().cloned().collect())
    }

    async fn update(&self, hash: &str, update: FileRecordUpdate) -> RecordResult<bool> {
        let mut files = self.files.write();
        let Some(record) = files.get_mut(hash) else {
            return Ok(false);
        };
        if let Some(role) = update.role {
            record.role = role;
        }
        if let Some(owner) = update.owner {
            record.owner = owner;
        }
        Ok(true)
    }

    async fn delete(&self, hash: &str) -> RecordResult<bool> {
        let existed = self.files.write().remove(hash).is_some();
        if existed {
            self.audits.write().retain(|a| a.file_hash != hash);
        }
        Ok(existed)
    }

    async fn insert_audit_attempt(&self, attempt: AuditAttempt) -> RecordResult<()> {
        self.audits.write().push(attempt);
        Ok(())
    }

    async fn count_audit_attempts(
        &self,
        hash: &str,
        is_owner: bool,
        since: DateTime<Utc>,
    ) -> RecordResult<u64> {
        let count = self
            .audits
            .read()
            .iter()
            .filter(|a| a.file_hash == hash && a.is_owner == is_owner && a.made_at >= since)
            .count();
        Ok(count as u64)
    }

    async fn clear_audit_attempts(&self) -> RecordResult<()> {
        self.audits.write().clear();
        Ok(())
    }
}
