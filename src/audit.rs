//! Proof-of-storage audits.
//!
//! An auditor sends a content hash and a random 64-hex-character seed. The
//! node answers with `hex(SHA256(blob ++ seed))`, which it can only compute
//! while it still holds the blob.
//!
//! Audits are rate limited per file over a rolling one-hour window, with
//! separate budgets for the file owner and everyone else. An attempt is
//! logged before the blob is read, so failed reads still count.

use crate::checker::{Check, CheckContext};
use crate::error::RequestError;
use crate::peers::PeerList;
use crate::protocol::{is_valid_hash, AuditProof, AuditRequest, ErrorCode};
use crate::records::{AuditAttempt, RecordStore};
use crate::storage::{ContentError, ContentStore};
use chrono::{Duration, Utc};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

/// Length of the rate-limit window, in seconds.
pub const AUDIT_WINDOW_SECS: i64 = 3600;

/// Maximum audits per file within the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLimits {
    /// Budget for the file owner.
    #[serde(default = "default_owner_limit")]
    pub owner: u64,
    /// Budget for any other auditor.
    #[serde(default = "default_other_limit")]
    pub other: u64,
}

fn default_owner_limit() -> u64 {
    100
}

fn default_other_limit() -> u64 {
    50
}

impl Default for AuditLimits {
    fn default() -> Self {
        Self {
            owner: default_owner_limit(),
            other: default_other_limit(),
        }
    }
}

impl AuditLimits {
    /// Budget for the given requester class.
    #[must_use]
    pub fn for_requester(&self, is_owner: bool) -> u64 {
        if is_owner {
            self.owner
        } else {
            self.other
        }
    }
}

/// Answers audit challenges.
pub struct AuditEngine {
    checks: CheckContext,
    records: Arc<dyn RecordStore>,
    content: Arc<ContentStore>,
    peers: Arc<PeerList>,
    limits: AuditLimits,
    window_lock: tokio::sync::Mutex<()>,
}

impl AuditEngine {
    /// Create an audit engine.
    #[must_use]
    pub fn new(
        checks: CheckContext,
        records: Arc<dyn RecordStore>,
        content: Arc<ContentStore>,
        peers: Arc<PeerList>,
        limits: AuditLimits,
    ) -> Self {
        Self {
            checks,
            records,
            content,
            peers,
            limits,
            window_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Answer one audit challenge.
    ///
    /// # Errors
    ///
    /// Returns a rejection for a bad signature, hash, or seed, an unknown or
    /// invisible file, or an exhausted audit budget. Returns
    /// [`RequestError::LostFile`] if the record exists without its blob.
    pub async fn audit(&self, request: &AuditRequest) -> Result<AuditProof, RequestError> {
        let hash = request.data_hash.as_str();
        let sender = request.sender_address.as_deref();
        let mut checker = self
            .checks
            .checker(hash, sender, request.signature.as_deref());

        checker
            .require(&[Check::Signature, Check::HashFormat, Check::Blacklist])
            .await?;
        if !is_valid_hash(&request.challenge_seed) {
            return Err(ErrorCode::InvalidSeed.into());
        }
        checker.require(&[Check::FileLookup]).await?;
        let Some(file) = checker.into_file() else {
            return Err(ErrorCode::NotFound.into());
        };

        let is_owner = sender == Some(file.owner.as_str());
        self.admit(hash, is_owner).await?;

        let challenge_response = match self.respond(hash, &request.challenge_seed).await {
            Ok(response) => response,
            Err(ContentError::NotFound(_)) => return Err(self.peers.lost_file(hash).await),
            Err(e) => return Err(RequestError::Fatal(e.into())),
        };

        info!("Answered audit for {hash} (owner: {is_owner})");
        Ok(AuditProof {
            data_hash: file.hash,
            challenge_seed: request.challenge_seed.clone(),
            challenge_response,
        })
    }

    /// Count the attempt against the window, or refuse it.
    async fn admit(&self, hash: &str, is_owner: bool) -> Result<(), RequestError> {
        let _guard = self.window_lock.lock().await;

        let since = Utc::now() - Duration::seconds(AUDIT_WINDOW_SECS);
        let count = self
            .records
            .count_audit_attempts(hash, is_owner, since)
            .await?;
        let limit = self.limits.for_requester(is_owner);
        if count >= limit {
            debug!("Audit limit reached for {hash}: {count}/{limit} (owner: {is_owner})");
            return Err(ErrorCode::LimitReached.into());
        }

        self.records
            .insert_audit_attempt(AuditAttempt::now(hash, is_owner))
            .await?;
        Ok(())
    }

    async fn respond(&self, hash: &str, seed: &str) -> Result<String, ContentError> {
        let mut stream = self.content.get(hash).await?;
        let mut hasher = Sha256::new();
        while let Some(chunk) = stream.try_next().await? {
            hasher.update(&chunk);
        }
        hasher.update(seed.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}
