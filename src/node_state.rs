//! Bandwidth and capacity accounting.
//!
//! The node keeps one small state document, mirrored to disk as JSON after
//! every change:
//!
//! ```json
//! {
//!   "public_key": "...",
//!   "bandwidth": {
//!     "limits":  { "incoming": null, "outgoing": 1048576 },
//!     "current": { "incoming": 0, "outgoing": 0 },
//!     "total":   { "incoming": 0, "outgoing": 0 }
//!   },
//!   "storage": { "capacity": 0, "max_file_size": 0, "used": 0 }
//! }
//! ```
//!
//! `current` counts the running accounting period and is what limits apply
//! to; `total` only ever grows. `storage.max_file_size` and `storage.used`
//! are written out for operators but never read back as truth: they are
//! recomputed from the record store on every [`NodeState::status`] call.
//!
//! Counters live behind a `parking_lot::Mutex` held only for the
//! check-then-act section. Persistence runs after the lock is released and
//! is serialized by an async mutex; each writer snapshots the state after
//! acquiring it, so the newest state is always the last one written.

use crate::error::{Error, Result};
use crate::records::StorageUsage;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Transfer direction, from the node's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Uploads into the node.
    Incoming,
    /// Downloads out of the node.
    Outgoing,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incoming => f.write_str("incoming"),
            Self::Outgoing => f.write_str("outgoing"),
        }
    }
}

/// A pair of byte counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bandwidth {
    /// Bytes received.
    pub incoming: u64,
    /// Bytes sent.
    pub outgoing: u64,
}

impl Bandwidth {
    /// Counter for one direction.
    #[must_use]
    pub fn get(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Incoming => self.incoming,
            Direction::Outgoing => self.outgoing,
        }
    }

    fn add(&mut self, direction: Direction, bytes: u64) {
        let counter = match direction {
            Direction::Incoming => &mut self.incoming,
            Direction::Outgoing => &mut self.outgoing,
        };
        *counter = counter.saturating_add(bytes);
    }

    fn sub(&mut self, direction: Direction, bytes: u64) {
        let counter = match direction {
            Direction::Incoming => &mut self.incoming,
            Direction::Outgoing => &mut self.outgoing,
        };
        *counter = counter.saturating_sub(bytes);
    }
}

/// Optional ceilings on the current period's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Ceiling on incoming bytes; `None` is unlimited.
    pub incoming: Option<u64>,
    /// Ceiling on outgoing bytes; `None` is unlimited.
    pub outgoing: Option<u64>,
}

impl Limits {
    /// Ceiling for one direction.
    #[must_use]
    pub fn get(&self, direction: Direction) -> Option<u64> {
        match direction {
            Direction::Incoming => self.incoming,
            Direction::Outgoing => self.outgoing,
        }
    }
}

/// Bandwidth section of the node status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandwidthStatus {
    /// Configured ceilings.
    pub limits: Limits,
    /// Counters for the current accounting period.
    pub current: Bandwidth,
    /// Lifetime counters.
    pub total: Bandwidth,
}

/// Storage section of the node status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStatus {
    /// Bytes the node is willing to store.
    pub capacity: u64,
    /// Size of the largest stored file.
    pub max_file_size: u64,
    /// Sum of all stored file sizes.
    pub used: u64,
}

/// Status report of the node; also the persisted state document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Node identity.
    pub public_key: String,
    /// Bandwidth counters and limits.
    pub bandwidth: BandwidthStatus,
    /// Capacity and usage.
    pub storage: StorageStatus,
}

/// Shared bandwidth/capacity state of the node.
#[derive(Debug)]
pub struct NodeState {
    inner: Mutex<NodeStatus>,
    path: Option<PathBuf>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl NodeState {
    /// State that is never written to disk.
    #[must_use]
    pub fn in_memory(public_key: impl Into<String>, capacity: u64) -> Self {
        Self {
            inner: Mutex::new(fresh_status(public_key.into(), capacity)),
            path: None,
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Load the state file at `path`, or create it from the given initial
    /// values if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the file exists but is not a valid
    /// state document, or an I/O error if it cannot be read or written.
    pub async fn load_or_init(
        path: impl Into<PathBuf>,
        public_key: impl Into<String>,
        capacity: u64,
    ) -> Result<Self> {
        let path = path.into();

        let (status, fresh) = match fs::read(&path).await {
            Ok(bytes) => {
                let status: NodeStatus = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::Serialization(format!(
                        "corrupt node state file {}: {e}",
                        path.display()
                    ))
                })?;
                info!(
                    "Loaded node state from {} (current in={} out={})",
                    path.display(),
                    status.bandwidth.current.incoming,
                    status.bandwidth.current.outgoing
                );
                (status, false)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Initializing node state at {}", path.display());
                (fresh_status(public_key.into(), capacity), true)
            }
            Err(e) => return Err(e.into()),
        };

        let state = Self {
            inner: Mutex::new(status),
            path: Some(path),
            persist_lock: tokio::sync::Mutex::new(()),
        };
        if fresh {
            state.persist().await?;
        }
        Ok(state)
    }

    /// Bytes transferred in `direction` during the current period.
    #[must_use]
    pub fn current_usage(&self, direction: Direction) -> u64 {
        self.inner.lock().bandwidth.current.get(direction)
    }

    /// Lifetime bytes transferred in `direction`.
    #[must_use]
    pub fn total_usage(&self, direction: Direction) -> u64 {
        self.inner.lock().bandwidth.total.get(direction)
    }

    /// Ceiling for `direction`, if any.
    #[must_use]
    pub fn limit(&self, direction: Direction) -> Option<u64> {
        self.inner.lock().bandwidth.limits.get(direction)
    }

    /// Configured storage capacity.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.inner.lock().storage.capacity
    }

    /// Whether transferring `bytes` more would pass the limit.
    #[must_use]
    pub fn would_exceed(&self, direction: Direction, bytes: u64) -> bool {
        let status = self.inner.lock();
        exceeds(&status.bandwidth, direction, bytes)
    }

    /// Count `bytes` against both the current and total counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub async fn record_transfer(&self, direction: Direction, bytes: u64) -> Result<()> {
        {
            let mut status = self.inner.lock();
            status.bandwidth.current.add(direction, bytes);
            status.bandwidth.total.add(direction, bytes);
        }
        debug!("Recorded {bytes} {direction} bytes");
        self.persist().await
    }

    /// Count `bytes` only if that stays within the limit.
    ///
    /// The check and the increment happen under one lock, so concurrent
    /// transfers can never overshoot a limit together. Returns `false`
    /// (and changes nothing) if the limit would be passed.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub async fn try_record_transfer(&self, direction: Direction, bytes: u64) -> Result<bool> {
        {
            let mut status = self.inner.lock();
            if exceeds(&status.bandwidth, direction, bytes) {
                return Ok(false);
            }
            status.bandwidth.current.add(direction, bytes);
            status.bandwidth.total.add(direction, bytes);
        }
        debug!("Recorded {bytes} {direction} bytes");
        self.persist().await?;
        Ok(true)
    }

    /// Take back `bytes` counted by [`Self::try_record_transfer`] for a
    /// transfer that did not complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub async fn release_transfer(&self, direction: Direction, bytes: u64) -> Result<()> {
        {
            let mut status = self.inner.lock();
            status.bandwidth.current.sub(direction, bytes);
            status.bandwidth.total.sub(direction, bytes);
        }
        debug!("Released {bytes} {direction} bytes");
        self.persist().await
    }

    /// Replace both limits. `None` removes a limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub async fn set_limits(&self, incoming: Option<u64>, outgoing: Option<u64>) -> Result<()> {
        self.inner.lock().bandwidth.limits = Limits { incoming, outgoing };
        info!("Bandwidth limits set: incoming={incoming:?} outgoing={outgoing:?}");
        self.persist().await
    }

    /// Replace the storage capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub async fn set_capacity(&self, capacity: u64) -> Result<()> {
        self.inner.lock().storage.capacity = capacity;
        info!("Storage capacity set to {capacity} bytes");
        self.persist().await
    }

    /// Start a new accounting period. Lifetime totals are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be persisted.
    pub async fn reset_current(&self) -> Result<()> {
        self.inner.lock().bandwidth.current = Bandwidth::default();
        info!("Bandwidth counters reset");
        self.persist().await
    }

    /// Status report with storage figures taken from `usage`.
    ///
    /// The figures are also kept for the next write of the state file.
    #[must_use]
    pub fn status(&self, usage: StorageUsage) -> NodeStatus {
        let mut status = self.inner.lock();
        status.storage.max_file_size = usage.max_file_size;
        status.storage.used = usage.used;
        status.clone()
    }

    /// Path of the state file, if persistent.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock().await;
        let snapshot = self.inner.lock().clone();
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &bytes)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write node state: {e}")))?;
        fs::rename(&temp_path, path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to replace node state: {e}")))?;
        Ok(())
    }
}

fn fresh_status(public_key: String, capacity: u64) -> NodeStatus {
    NodeStatus {
        public_key,
        bandwidth: BandwidthStatus::default(),
        storage: StorageStatus {
            capacity,
            ..StorageStatus::default()
        },
    }
}

fn exceeds(bandwidth: &BandwidthStatus, direction: Direction, bytes: u64) -> bool {
    bandwidth.limits.get(direction).is_some_and(|limit| {
        bandwidth.current.get(direction).saturating_add(bytes) > limit
    })
}
