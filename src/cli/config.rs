//! blockshred configuration file handling
//!
//! Configuration files are TOML. The same file is deployed on the client
//! host (for `delete`) and on every storage node (for `worker`); each node
//! only needs its own `[worker] node_identity` set.
//!
//! Durations are human-readable strings (`"90s"`, `"30m"`, `"7d"`).

use blockshred::agents::{WorkerSettings, DEFAULT_BATCH_SIZE, DEFAULT_STAGING_DIR};
use blockshred::coordination::is_supported_endpoint;
use blockshred::hdfs::{NodeDirectory, NodeEntry};
use blockshred::ledger::{NodeIdentity, RetryPolicy, DEFAULT_RETRY_CEILING, DEFAULT_ROOT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// blockshred configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShredConfig {
    /// Ledger store connection
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub hdfs: HdfsConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub shred: ShredOptions,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub activity: ActivityConfig,

    /// Storage node directory (`[[nodes]]`)
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Store URL, e.g. `sqlite:///var/lib/blockshred/ledger.db`
    pub endpoint: String,

    #[serde(default = "default_root")]
    pub root: String,

    /// Ephemeral leases expire this long after their session stops
    /// heartbeating
    #[serde(default = "default_session_timeout")]
    pub session_timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HdfsConfig {
    #[serde(default = "default_hdfs_binary")]
    pub binary: PathBuf,

    /// Prefixes of `hdfs version` output known to work
    #[serde(default = "default_compatible_versions")]
    pub compatible_versions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Stable identity of this storage node (required to run `worker`)
    pub node_identity: Option<String>,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_staging_dir_name")]
    pub staging_dir_name: String,

    #[serde(default = "default_liveness_threshold")]
    pub liveness_threshold: String,
}

/// Which secure eraser to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EraserKind {
    /// coreutils `shred`
    Shred,
    /// In-process overwrite
    Overwrite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShredOptions {
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,

    #[serde(default = "default_erase_passes")]
    pub erase_passes: u32,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: String,

    /// How long terminal entries are kept before `gc` removes them
    #[serde(default = "default_retention")]
    pub retention: String,

    #[serde(default = "default_eraser")]
    pub eraser: EraserKind,

    #[serde(default = "default_shred_binary")]
    pub shred_binary: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActivityConfig {
    /// Activity log (JSON lines). Defaults to the user data directory.
    pub path: Option<PathBuf>,
}

fn default_root() -> String {
    DEFAULT_ROOT.to_string()
}

fn default_session_timeout() -> String {
    "60s".to_string()
}

fn default_hdfs_binary() -> PathBuf {
    PathBuf::from("hdfs")
}

fn default_compatible_versions() -> Vec<String> {
    vec![
        "Hadoop 2.7".to_string(),
        "Hadoop 2.8".to_string(),
        "Hadoop 3.".to_string(),
    ]
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_staging_dir_name() -> String {
    DEFAULT_STAGING_DIR.to_string()
}

fn default_liveness_threshold() -> String {
    "30m".to_string()
}

fn default_retry_ceiling() -> u32 {
    DEFAULT_RETRY_CEILING
}

fn default_erase_passes() -> u32 {
    3
}

fn default_retry_backoff() -> String {
    "1m".to_string()
}

fn default_retention() -> String {
    "30d".to_string()
}

fn default_eraser() -> EraserKind {
    EraserKind::Shred
}

fn default_shred_binary() -> PathBuf {
    PathBuf::from("shred")
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for HdfsConfig {
    fn default() -> Self {
        Self {
            binary: default_hdfs_binary(),
            compatible_versions: default_compatible_versions(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            node_identity: None,
            batch_size: default_batch_size(),
            staging_dir_name: default_staging_dir_name(),
            liveness_threshold: default_liveness_threshold(),
        }
    }
}

impl Default for ShredOptions {
    fn default() -> Self {
        Self {
            retry_ceiling: default_retry_ceiling(),
            erase_passes: default_erase_passes(),
            retry_backoff: default_retry_backoff(),
            retention: default_retention(),
            eraser: default_eraser(),
            shred_binary: default_shred_binary(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

/// Parse a human-readable duration, naming the setting on failure.
pub fn parse_duration(setting: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value)
        .map_err(|e| ConfigError::Invalid(format!("{} = \"{}\": {}", setting, value, e)))
}

impl ShredConfig {
    /// Create a configuration with defaults for the given ledger endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            ledger: LedgerConfig {
                endpoint: endpoint.into(),
                root: default_root(),
                session_timeout: default_session_timeout(),
            },
            hdfs: HdfsConfig::default(),
            worker: WorkerConfig::default(),
            shred: ShredOptions::default(),
            logging: LoggingConfig::default(),
            activity: ActivityConfig::default(),
            nodes: Vec::new(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        write_file(path, &contents)
    }

    /// Check everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("[ledger] endpoint is empty".into()));
        }
        if !is_supported_endpoint(&self.ledger.endpoint) {
            return Err(ConfigError::Invalid(format!(
                "[ledger] endpoint '{}' has an unsupported scheme",
                self.ledger.endpoint
            )));
        }
        if !self.ledger.root.starts_with('/') || self.ledger.root.len() < 2 {
            return Err(ConfigError::Invalid(format!(
                "[ledger] root '{}' must be an absolute path below /",
                self.ledger.root
            )));
        }
        if self.shred.retry_ceiling < 1 {
            return Err(ConfigError::Invalid("[shred] retry_ceiling must be at least 1".into()));
        }
        if self.shred.erase_passes < 1 {
            return Err(ConfigError::Invalid("[shred] erase_passes must be at least 1".into()));
        }
        if self.worker.batch_size < 1 {
            return Err(ConfigError::Invalid("[worker] batch_size must be at least 1".into()));
        }
        let staging = &self.worker.staging_dir_name;
        if staging.is_empty() || staging.contains('/') || staging == "." || staging == ".." {
            return Err(ConfigError::Invalid(format!(
                "[worker] staging_dir_name '{}' must be a plain directory name",
                staging
            )));
        }
        if let Some(identity) = &self.worker.node_identity {
            NodeIdentity::new(identity.as_str())
                .map_err(|e| ConfigError::Invalid(format!("[worker] {}", e)))?;
        }

        self.session_timeout()?;
        self.liveness_threshold()?;
        self.retention()?;
        self.retry_policy()?;
        self.node_directory()?;
        Ok(())
    }

    pub fn session_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration("session_timeout", &self.ledger.session_timeout)
    }

    pub fn liveness_threshold(&self) -> Result<Duration, ConfigError> {
        parse_duration("liveness_threshold", &self.worker.liveness_threshold)
    }

    pub fn retention(&self) -> Result<Duration, ConfigError> {
        parse_duration("retention", &self.shred.retention)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        Ok(RetryPolicy::new(
            self.shred.retry_ceiling,
            parse_duration("retry_backoff", &self.shred.retry_backoff)?,
        ))
    }

    pub fn node_directory(&self) -> Result<NodeDirectory, ConfigError> {
        NodeDirectory::new(self.nodes.iter().cloned())
            .map_err(|e| ConfigError::Invalid(format!("[[nodes]] {}", e)))
    }

    /// Worker settings, with `node` overriding `[worker] node_identity`.
    pub fn worker_settings(&self, node: Option<&str>) -> Result<WorkerSettings, ConfigError> {
        let identity = node
            .or(self.worker.node_identity.as_deref())
            .ok_or_else(|| {
                ConfigError::Invalid(
                    "no node identity: set [worker] node_identity or pass --node".into(),
                )
            })?;
        let identity = NodeIdentity::new(identity)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let directory = self.node_directory()?;
        let mut settings = WorkerSettings::new(identity);
        settings.data_dir = directory
            .by_identity(&settings.node)
            .map(|n| n.data_dir.clone());
        settings.staging_dir_name = self.worker.staging_dir_name.clone();
        settings.batch_size = self.worker.batch_size;
        settings.liveness_threshold = self.liveness_threshold()?;
        settings.erase_passes = self.shred.erase_passes;
        settings.retry = self.retry_policy()?;
        Ok(settings)
    }

    /// Activity log path, falling back to the user data directory.
    pub fn activity_path(&self) -> PathBuf {
        self.activity
            .path
            .clone()
            .unwrap_or_else(default_activity_path)
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(ledger_path: &Path) -> String {
        format!(
            r#"# blockshred configuration
#
# Deploy the same file on the client host and on every storage node.
# Each storage node sets its own [worker] node_identity.

[ledger]
# Shared ledger store. Every host must reach the same database.
endpoint = "sqlite://{ledger_path}"
root = "/shred"
# Leases of a crashed worker disappear after this long
session_timeout = "60s"

[hdfs]
binary = "hdfs"
# `hdfs version` must start with one of these
compatible_versions = ["Hadoop 2.7", "Hadoop 2.8", "Hadoop 3."]

[worker]
# Stable identity of this storage node, e.g. "dn-01"
# node_identity = "dn-01"
batch_size = 64
staging_dir_name = ".shred-staging"
# A STAGED entry with no live lease is reclaimed after this long
liveness_threshold = "30m"

[shred]
# Attempts per entry before it is marked FAILED
retry_ceiling = 5
erase_passes = 3
# Backoff after the first failed attempt; doubles per attempt, capped at 1h
retry_backoff = "1m"
# Terminal entries older than this are removed by `blockshred gc`
retention = "30d"
# "shred" (coreutils) or "overwrite" (in-process)
eraser = "shred"
shred_binary = "shred"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/blockshred/blockshred.log"

[activity]
# One JSON line per state transition
# path = "/var/log/blockshred/activity.jsonl"

# One entry per storage node. `address` is the address fsck reports.
# [[nodes]]
# address = "10.0.0.1"
# identity = "dn-01"
# data_dir = "/hadoop/dfs/data"
"#,
            ledger_path = ledger_path.display()
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(config_path: &Path, ledger_path: &Path) -> Result<(), ConfigError> {
        write_file(config_path, &Self::generate_default_toml(ledger_path))
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    // Create parent directory if needed
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
    }
    fs::write(path, contents).map_err(write_err)
}

/// Default config file location: `<config dir>/blockshred/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("blockshred")
        .join("config.toml")
}

/// Default ledger database location
pub fn default_ledger_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("blockshred")
        .join("ledger.db")
}

/// Default activity log location
pub fn default_activity_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("blockshred")
        .join("activity.jsonl")
}
