//! Wiring shared by the commands: config loading, ledger, eraser and HDFS
//! clients.

use super::config::{default_config_path, ConfigError, EraserKind, ShredConfig};
use blockshred::coordination;
use blockshred::eraser::{OverwriteEraser, SecureEraser, ShredCommand};
use blockshred::error::ShredError;
use blockshred::hdfs::HdfsCli;
use blockshred::ledger::{JsonLinesSink, ShredLedger};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Resolve `--config` against the default location.
pub fn config_path(config: Option<&Path>) -> PathBuf {
    config
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path)
}

/// Load and validate the config. Any problem is a configuration error.
pub fn load_config(config: Option<&Path>) -> Result<ShredConfig, ShredError> {
    let path = config_path(config);
    if !path.exists() {
        return Err(ShredError::Configuration(format!(
            "config file {} not found (run `blockshred init-config`)",
            path.display()
        )));
    }
    let config = ShredConfig::load(&path).map_err(config_error)?;
    config.validate().map_err(config_error)?;
    debug!(path = %path.display(), "config loaded");
    Ok(config)
}

pub fn config_error(e: ConfigError) -> ShredError {
    ShredError::Configuration(e.to_string())
}

/// Open a ledger session on the configured store.
pub async fn open_ledger(config: &ShredConfig) -> Result<Arc<ShredLedger>, ShredError> {
    let timeout = config.session_timeout().map_err(config_error)?;
    let store = coordination::connect(&config.ledger.endpoint, timeout)
        .await
        .map_err(|e| {
            if e.is_transient() {
                ShredError::TransientIo(format!("ledger unreachable: {}", e))
            } else {
                ShredError::Configuration(format!("ledger: {}", e))
            }
        })?;
    let activity = Arc::new(JsonLinesSink::new(config.activity_path()));
    let ledger = ShredLedger::new(store, activity).with_root(config.ledger.root.clone());
    Ok(Arc::new(ledger))
}

pub fn build_eraser(config: &ShredConfig) -> Arc<dyn SecureEraser> {
    match config.shred.eraser {
        EraserKind::Shred => Arc::new(ShredCommand::new(config.shred.shred_binary.clone())),
        EraserKind::Overwrite => Arc::new(OverwriteEraser::new()),
    }
}

pub fn build_hdfs(config: &ShredConfig) -> Result<Arc<HdfsCli>, ShredError> {
    let directory = config.node_directory().map_err(config_error)?;
    Ok(Arc::new(HdfsCli::new(
        config.hdfs.binary.clone(),
        Arc::new(directory),
    )))
}
