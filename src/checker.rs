//! Request validation pipeline.
//!
//! Every inbound request names a content hash and, optionally, a sender
//! address and a signature of the hash. The engines validate that triple by
//! running an ordered list of [`Check`]s through a [`Checker`]; the first
//! failing check decides the outcome.
//!
//! ```text
//!   HashFormat ─▶ Blacklist ─▶ Signature ─▶ FileLookup ─▶ ...
//!        │            │            │             │
//!   INVALID_HASH  not found  INVALID_SIGNATURE  NOT_FOUND
//! ```
//!
//! `FileLookup` and `DoubleUpload` load the file record; the checker keeps it
//! so later steps of the request can use it without another query.

use crate::blacklist::Blacklist;
use crate::crypto::SignatureVerifier;
use crate::error::{RequestError, Result};
use crate::protocol::{is_valid_hash, ErrorCode, Role};
use crate::records::{FileRecord, RecordStore};
use std::sync::Arc;
use tracing::debug;

/// A single named validation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// The hash is 64 lowercase hex characters.
    HashFormat,
    /// The hash is not revoked.
    Blacklist,
    /// The sender signed the hash.
    Signature,
    /// A record exists and is visible to the sender.
    FileLookup,
    /// No record exists yet.
    DoubleUpload,
}

/// Why a check failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckFailure {
    /// Rejected with an error code.
    Rejected(ErrorCode),
    /// The hash is blacklisted.
    Blacklisted,
    /// The content is already stored, with this role.
    AlreadyPresent(Role),
}

impl From<CheckFailure> for RequestError {
    fn from(failure: CheckFailure) -> Self {
        match failure {
            CheckFailure::Rejected(code) => Self::Rejected(code),
            CheckFailure::Blacklisted => Self::Blacklisted,
            CheckFailure::AlreadyPresent(_) => Self::Rejected(ErrorCode::RepeatedUpload),
        }
    }
}

/// Shared collaborators of the checks. Cheap to clone.
#[derive(Clone)]
pub struct CheckContext {
    blacklist: Arc<Blacklist>,
    records: Arc<dyn RecordStore>,
    verifier: Arc<dyn SignatureVerifier>,
}

impl CheckContext {
    /// Bundle the collaborators the checks consult.
    #[must_use]
    pub fn new(
        blacklist: Arc<Blacklist>,
        records: Arc<dyn RecordStore>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            blacklist,
            records,
            verifier,
        }
    }

    /// Checker for one request.
    #[must_use]
    pub fn checker<'a>(
        &'a self,
        hash: &'a str,
        sender: Option<&'a str>,
        signature: Option<&'a str>,
    ) -> Checker<'a> {
        Checker {
            ctx: self,
            hash,
            sender,
            signature,
            file: None,
        }
    }
}

/// Runs checks for one `(hash, sender, signature)` triple.
pub struct Checker<'a> {
    ctx: &'a CheckContext,
    hash: &'a str,
    sender: Option<&'a str>,
    signature: Option<&'a str>,
    file: Option<FileRecord>,
}

impl Checker<'_> {
    /// Run `checks` in order and return the first failure.
    ///
    /// # Errors
    ///
    /// Returns an error only if the record store fails.
    pub async fn run(&mut self, checks: &[Check]) -> Result<Option<CheckFailure>> {
        for &check in checks {
            if let Some(failure) = self.run_one(check).await? {
                debug!("Check {check:?} failed for {}: {failure:?}", self.hash);
                return Ok(Some(failure));
            }
        }
        Ok(None)
    }

    /// Run `checks` and turn any failure into a [`RequestError`].
    ///
    /// # Errors
    ///
    /// Returns the first failure, or a fatal error from the record store.
    pub async fn require(&mut self, checks: &[Check]) -> std::result::Result<(), RequestError> {
        match self.run(checks).await? {
            Some(failure) => Err(failure.into()),
            None => Ok(()),
        }
    }

    /// Record loaded by `FileLookup` or `DoubleUpload`, if any.
    #[must_use]
    pub fn file(&self) -> Option<&FileRecord> {
        self.file.as_ref()
    }

    /// Take the loaded record.
    #[must_use]
    pub fn into_file(self) -> Option<FileRecord> {
        self.file
    }

    async fn run_one(&mut self, check: Check) -> Result<Option<CheckFailure>> {
        let sender = self.sender;
        let failure = match check {
            Check::HashFormat => {
                (!is_valid_hash(self.hash)).then_some(CheckFailure::Rejected(ErrorCode::InvalidHash))
            }
            Check::Blacklist => self
                .ctx
                .blacklist
                .contains(self.hash)
                .then_some(CheckFailure::Blacklisted),
            Check::Signature => {
                let verified = match (sender, self.signature) {
                    (Some(sender), Some(signature)) => {
                        self.ctx.verifier.verify(sender, signature, self.hash)
                    }
                    _ => false,
                };
                (!verified).then_some(CheckFailure::Rejected(ErrorCode::InvalidSignature))
            }
            Check::FileLookup => match self.lookup().await? {
                Some(file) if file.role.is_private() && sender != Some(file.owner.as_str()) => {
                    Some(CheckFailure::Rejected(ErrorCode::NotFound))
                }
                Some(_) => None,
                None => Some(CheckFailure::Rejected(ErrorCode::NotFound)),
            },
            Check::DoubleUpload => self
                .lookup()
                .await?
                .map(|file| CheckFailure::AlreadyPresent(file.role)),
        };
        Ok(failure)
    }

    async fn lookup(&mut self) -> Result<Option<&FileRecord>> {
        if self.file.is_none() {
            self.file = self.ctx.records.select_by_hash(self.hash).await?;
        }
        Ok(self.file.as_ref())
    }
}
