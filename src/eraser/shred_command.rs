//! Erasure through coreutils `shred`.

use super::traits::{EraseError, SecureEraser};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

pub struct ShredCommand {
    binary: PathBuf,
}

impl ShredCommand {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Whether the binary can be run at all (`shred --version`).
    pub async fn available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl SecureEraser for ShredCommand {
    async fn erase(&self, path: &Path, passes: u32) -> Result<(), EraseError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(EraseError::PathNotFound(path.to_path_buf()));
        }

        debug!(path = %path.display(), passes, "running shred");
        let output = Command::new(&self.binary)
            .arg("--force")
            .arg(format!("--iterations={}", passes))
            .arg("--zero")
            .arg("--remove")
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| EraseError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(EraseError::Failed {
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn name(&self) -> &'static str {
        "shred"
    }
}
