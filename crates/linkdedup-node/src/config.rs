//! TOML-based configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use linkdedup_core::{SequenceKey, TableName};
use linkdedup_store::FileLinkStateStore;

use crate::error::NodeError;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    #[serde(default)]
    pub dedup: DedupSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl NodeConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read config file: {e}")))?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        let config: NodeConfig = toml::from_str(s)
            .map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        self.dedup.validate()
    }
}

/// The `[dedup]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DedupSection {
    /// Width of each sequence window.
    #[serde(default = "default_epoch_size")]
    pub epoch_size: u64,
    /// Prefix of the two partition names each link rotates between.
    #[serde(default = "default_partition_prefix")]
    pub partition_prefix: String,
    /// How many compare-and-set conflicts to absorb before giving up.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
}

fn default_epoch_size() -> u64 {
    1000
}

fn default_partition_prefix() -> String {
    "dedup".to_string()
}

fn default_max_conflict_retries() -> u32 {
    16
}

impl Default for DedupSection {
    fn default() -> Self {
        Self {
            epoch_size: default_epoch_size(),
            partition_prefix: default_partition_prefix(),
            max_conflict_retries: default_max_conflict_retries(),
        }
    }
}

impl DedupSection {
    fn validate(&self) -> Result<(), NodeError> {
        if self.epoch_size == 0 {
            return Err(NodeError::Config("dedup.epoch_size must be positive".into()));
        }
        if self.partition_prefix.is_empty() {
            return Err(NodeError::Config(
                "dedup.partition_prefix must not be empty".into(),
            ));
        }
        if self.max_conflict_retries == 0 {
            return Err(NodeError::Config(
                "dedup.max_conflict_retries must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The `(head, tail)` partition names used when `key` is initialized.
    ///
    /// The key is hex-encoded so distinct keys never share a partition.
    pub fn partition_names(&self, key: &SequenceKey) -> (TableName, TableName) {
        let base = format!("{}_{}", self.partition_prefix, hex::encode(key.as_str()));
        (
            TableName::new(format!("{base}_a")),
            TableName::new(format!("{base}_b")),
        )
    }
}

/// The `[storage]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    /// Directory for persisted link state. Absent means in-memory only.
    pub path: Option<PathBuf>,
}

impl StorageSection {
    /// Directory holding persisted link state: `explicit` if given, else the
    /// configured `path`, else `~/.linkdedup/state`.
    pub fn state_dir(&self, explicit: Option<PathBuf>) -> Result<PathBuf, NodeError> {
        match explicit.or_else(|| self.path.clone()) {
            Some(dir) => Ok(dir),
            None => Ok(FileLinkStateStore::default_dir()?),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
