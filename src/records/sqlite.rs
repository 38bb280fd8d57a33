//! SQLite-backed record store.

use super::{
    AuditAttempt, FileRecord, FileRecordUpdate, RecordError, RecordResult, RecordStore,
    StorageUsage,
};
use crate::protocol::Role;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Record store persisted in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open (creating if needed) the database at `path` and create tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(path: &Path) -> RecordResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(backend)?;

        let store = Self { pool };
        store.run_migrations().await?;
        debug!("Opened record store at {:?}", path);
        Ok(store)
    }

    /// Fresh in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub async fn in_memory() -> RecordResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(backend)?
            .foreign_keys(true);

        // Every connection to `:memory:` is its own database, so pin the pool
        // to a single connection that is never recycled.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(backend)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> RecordResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS files (
                hash TEXT PRIMARY KEY NOT NULL,
                role TEXT NOT NULL,
                size INTEGER NOT NULL,
                owner TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS audit (
                file_hash TEXT NOT NULL REFERENCES files(hash) ON DELETE CASCADE,
                is_owner INTEGER NOT NULL,
                made_at INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_audit_window ON audit (file_hash, is_owner, made_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}

fn backend(err: impl std::fmt::Display) -> RecordError {
    RecordError::Backend(err.to_string())
}

fn to_db_size(size: u64) -> RecordResult<i64> {
    i64::try_from(size).map_err(|_| RecordError::Backend(format!("size {size} out of range")))
}

fn from_db_size(size: i64) -> RecordResult<u64> {
    u64::try_from(size).map_err(|_| RecordError::Backend(format!("negative size {size}")))
}

fn row_to_record(row: &SqliteRow) -> RecordResult<FileRecord> {
    let role: String = row.try_get("role").map_err(backend)?;
    let size: i64 = row.try_get("size").map_err(backend)?;
    Ok(FileRecord {
        hash: row.try_get("hash").map_err(backend)?,
        role: Role::from_str(&role).map_err(backend)?,
        size: from_db_size(size)?,
        owner: row.try_get("owner").map_err(backend)?,
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: FileRecord) -> RecordResult<()> {
        let result = sqlx::query("INSERT INTO files (hash, role, size, owner) VALUES (?, ?, ?, ?)")
            .bind(&record.hash)
            .bind(record.role.to_string())
            .bind(to_db_size(record.size)?)
            .bind(&record.owner)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(RecordError::Duplicate(record.hash))
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn select_by_hash(&self, hash: &str) -> RecordResult<Option<FileRecord>> {
        let row = sqlx::query("SELECT hash, role, size, owner FROM files WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn select_all(&self) -> RecordResult<Vec<FileRecord>> {
        let rows = sqlx::query("SELECT hash, role, size, owner FROM files ORDER BY hash")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(row_to_record).collect()
    }

    async fn update(&self, hash: &str, update: FileRecordUpdate) -> RecordResult<bool> {
        let result = sqlx::query(
            "UPDATE files SET role = COALESCE(?, role), owner = COALESCE(?, owner) WHERE hash = ?",
        )
        .bind(update.role.map(|r| r.to_string()))
        .bind(update.owner)
        .bind(hash)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, hash: &str) -> RecordResult<bool> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query("DELETE FROM audit WHERE file_hash = ?")
            .bind(hash)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        let result = sqlx::query("DELETE FROM files WHERE hash = ?")
            .bind(hash)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        tx.commit().await.map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_audit_attempt(&self, attempt: AuditAttempt) -> RecordResult<()> {
        sqlx::query("INSERT INTO audit (file_hash, is_owner, made_at) VALUES (?, ?, ?)")
            .bind(&attempt.file_hash)
            .bind(attempt.is_owner)
            .bind(attempt.made_at.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn count_audit_attempts(
        &self,
        hash: &str,
        is_owner: bool,
        since: DateTime<Utc>,
    ) -> RecordResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM audit WHERE file_hash = ? AND is_owner = ? AND made_at >= ?",
        )
        .bind(hash)
        .bind(is_owner)
        .bind(since.timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        from_db_size(count)
    }

    async fn clear_audit_attempts(&self) -> RecordResult<()> {
        sqlx::query("DELETE FROM audit")
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn storage_usage(&self) -> RecordResult<StorageUsage> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(size), 0) AS max_size, COALESCE(SUM(size), 0) AS used FROM files",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        let max_size: i64 = row.try_get("max_size").map_err(backend)?;
        let used: i64 = row.try_get("used").map_err(backend)?;
        Ok(StorageUsage {
            max_file_size: from_db_size(max_size)?,
            used: from_db_size(used)?,
        })
    }
}
