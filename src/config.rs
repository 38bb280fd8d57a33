//! Configuration for cas-node.

use crate::audit::AuditLimits;
use crate::protocol::DEFAULT_MAX_FILE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Record store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordBackend {
    /// SQLite database under the root directory.
    #[default]
    Sqlite,
    /// In-memory tables, lost on restart.
    Memory,
}

/// Record store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordsConfig {
    /// Which backend to open.
    #[serde(default)]
    pub backend: RecordBackend,

    /// Database file. Defaults to `{root_dir}/records.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Root directory for node data.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Node identity written into a fresh state file.
    #[serde(default)]
    pub public_key: String,

    /// Storage capacity in bytes written into a fresh state file.
    /// Later changes go through `set-capacity`.
    #[serde(default)]
    pub capacity: u64,

    /// Largest accepted upload, in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Blob directory. Defaults to `{root_dir}/storage`.
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,

    /// Node state file. Defaults to `{root_dir}/node.json`.
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// Blacklist file. Defaults to `{root_dir}/blacklist.txt`.
    #[serde(default)]
    pub blacklist_file: Option<PathBuf>,

    /// Peers file. Defaults to `{root_dir}/peers.txt`.
    #[serde(default)]
    pub peers_file: Option<PathBuf>,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Hourly audit budgets per file.
    #[serde(default)]
    pub audit: AuditLimits,

    /// Record store configuration.
    #[serde(default)]
    pub records: RecordsConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            public_key: String::new(),
            capacity: 0,
            max_file_size: default_max_file_size(),
            audit: AuditLimits::default(),
            records: RecordsConfig::default(),
            storage_dir: None,
            state_file: None,
            blacklist_file: None,
            peers_file: None,
            log_level: default_log_level(),
        }
    }
}

impl NodeConfig {
    /// Configuration rooted at `root_dir` with all other values defaulted.
    #[must_use]
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Blob directory.
    #[must_use]
    pub fn storage_dir(&self) -> PathBuf {
        self.resolve(self.storage_dir.as_deref(), "storage")
    }

    /// Node state file.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.resolve(self.state_file.as_deref(), "node.json")
    }

    /// Blacklist file.
    #[must_use]
    pub fn blacklist_file(&self) -> PathBuf {
        self.resolve(self.blacklist_file.as_deref(), "blacklist.txt")
    }

    /// Peers file.
    #[must_use]
    pub fn peers_file(&self) -> PathBuf {
        self.resolve(self.peers_file.as_deref(), "peers.txt")
    }

    /// Record database file.
    #[must_use]
    pub fn records_file(&self) -> PathBuf {
        self.resolve(self.records.path.as_deref(), "records.db")
    }

    fn resolve(&self, explicit: Option<&Path>, default_name: &str) -> PathBuf {
        explicit.map_or_else(|| self.root_dir.join(default_name), Path::to_path_buf)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Read a list file: one trimmed entry per line, blank lines skipped.
///
/// A missing file yields an empty collection.
pub(crate) async fn read_list_file<C>(path: &Path) -> crate::Result<C>
where
    C: FromIterator<String> + Default,
{
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(C::default()),
        Err(e) => Err(e.into()),
    }
}

fn default_root_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "cas-node").map_or_else(
        || PathBuf::from(".cas-node"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

const fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}
