//! Command-line interface definition.

use cas_node::config::{NodeConfig, RecordBackend};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Content-addressable storage node.
#[derive(Parser, Debug)]
#[command(name = "cas-node")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Root directory for node data.
    #[arg(long, env = "CAS_ROOT_DIR")]
    pub root_dir: Option<PathBuf>,

    /// Record store backend.
    #[arg(long, value_enum, env = "CAS_RECORDS")]
    pub records: Option<CliRecordBackend>,

    /// Largest accepted upload, in bytes.
    #[arg(long, env = "CAS_MAX_FILE_SIZE")]
    pub max_file_size: Option<u64>,

    /// Log level (overridden by `RUST_LOG`).
    #[arg(long, env = "CAS_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Path to configuration file.
    #[arg(long, short, env = "CAS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Command to run.
    #[command(subcommand)]
    pub command: NodeCommand,
}

/// Node commands.
#[derive(Subcommand, Debug)]
pub enum NodeCommand {
    /// Print bandwidth and storage status as JSON.
    Status,
    /// List stored content hashes.
    List,
    /// Replace the bandwidth limits. An omitted limit is removed.
    SetLimits {
        /// Incoming byte limit for the current period.
        #[arg(long)]
        incoming: Option<u64>,
        /// Outgoing byte limit for the current period.
        #[arg(long)]
        outgoing: Option<u64>,
    },
    /// Replace the storage capacity.
    SetCapacity {
        /// Capacity in bytes.
        bytes: u64,
    },
    /// Start a new bandwidth accounting period.
    ResetBandwidth,
    /// Store a file. Reads from --file or stdin.
    Upload {
        /// Input file (defaults to stdin if omitted).
        #[arg(long)]
        file: Option<PathBuf>,
        /// Three-digit file role.
        #[arg(long, default_value = "000")]
        role: String,
        /// Convergent-encrypt the data first and print the key.
        #[arg(long)]
        encrypt: bool,
        /// Hex-encoded Ed25519 secret key of the uploader.
        #[arg(long, env = "CAS_SECRET_KEY", hide_env_values = true)]
        secret_key: String,
    },
    /// Retrieve a file. Writes to --out or stdout.
    Download {
        /// Content hash (64 hex chars).
        hash: String,
        /// Output file (defaults to stdout if omitted).
        #[arg(long)]
        out: Option<PathBuf>,
        /// Hex-encoded convergent key, to decrypt the blob.
        #[arg(long)]
        key: Option<String>,
        /// Hex-encoded Ed25519 secret key; anonymous if omitted.
        #[arg(long, env = "CAS_SECRET_KEY", hide_env_values = true)]
        secret_key: Option<String>,
    },
    /// Run an audit challenge against a stored file.
    Audit {
        /// Content hash (64 hex chars).
        hash: String,
        /// Challenge seed (64 hex chars); random if omitted.
        #[arg(long)]
        seed: Option<String>,
        /// Hex-encoded Ed25519 secret key of the auditor.
        #[arg(long, env = "CAS_SECRET_KEY", hide_env_values = true)]
        secret_key: String,
    },
    /// List file records whose blob is missing.
    Lost,
    /// Delete a file record and its blob.
    Remove {
        /// Content hash (64 hex chars).
        hash: String,
    },
}

/// Record backend CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliRecordBackend {
    /// SQLite database under the root directory.
    Sqlite,
    /// In-memory tables.
    Memory,
}

impl From<CliRecordBackend> for RecordBackend {
    fn from(backend: CliRecordBackend) -> Self {
        match backend {
            CliRecordBackend::Sqlite => Self::Sqlite,
            CliRecordBackend::Memory => Self::Memory,
        }
    }
}

impl Cli {
    /// Build the node configuration from the config file and overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn node_config(&self) -> color_eyre::Result<NodeConfig> {
        let mut config = if let Some(ref path) = self.config {
            NodeConfig::from_file(path)?
        } else {
            NodeConfig::default()
        };

        if let Some(ref root_dir) = self.root_dir {
            config.root_dir.clone_from(root_dir);
        }
        if let Some(records) = self.records {
            config.records.backend = records.into();
        }
        if let Some(max_file_size) = self.max_file_size {
            config.max_file_size = max_file_size;
        }
        if let Some(ref log_level) = self.log_level {
            config.log_level.clone_from(log_level);
        }

        Ok(config)
    }
}
