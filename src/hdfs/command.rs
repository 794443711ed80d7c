//! Filesystem access through the `hdfs` command line client.

use super::directory::NodeDirectory;
use super::fsck::parse_fsck;
use super::traits::{BlockLocation, BlockLocator, DeleteError, FileSystem, LocateError, PathKind};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

/// Runs `hdfs` subcommands.
pub struct HdfsCli {
    binary: PathBuf,
    directory: Arc<NodeDirectory>,
}

impl HdfsCli {
    pub fn new(binary: impl Into<PathBuf>, directory: Arc<NodeDirectory>) -> Self {
        Self {
            binary: binary.into(),
            directory,
        }
    }

    async fn run(&self, args: &[&str]) -> std::io::Result<Output> {
        debug!(binary = %self.binary.display(), ?args, "running hdfs command");
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
    }

    fn unavailable(&self, e: std::io::Error) -> LocateError {
        LocateError::LocatorUnavailable(format!(
            "failed to run {}: {}",
            self.binary.display(),
            e
        ))
    }

    /// First line of `hdfs version`, e.g. `Hadoop 2.7.3`.
    pub async fn version(&self) -> Result<String, LocateError> {
        let output = self.run(&["version"]).await.map_err(|e| self.unavailable(e))?;
        if !output.status.success() {
            return Err(LocateError::LocatorUnavailable(format!(
                "hdfs version exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    /// `hdfs dfs -test -<flag> <path>`: `Some(true)` on exit 0, `Some(false)`
    /// on exit 1, `None` for anything else.
    async fn test(&self, flag: &str, path: &str) -> Result<Option<bool>, LocateError> {
        let output = self
            .run(&["dfs", "-test", flag, path])
            .await
            .map_err(|e| self.unavailable(e))?;
        Ok(match output.status.code() {
            Some(0) => Some(true),
            Some(1) => Some(false),
            _ => None,
        })
    }
}

/// Whether a `hdfs version` line names a tested release.
pub fn is_compatible(version_line: &str, compatible: &[String]) -> bool {
    compatible.iter().any(|v| version_line.contains(v.as_str()))
}

#[async_trait]
impl BlockLocator for HdfsCli {
    async fn locate(&self, file_path: &str) -> Result<Vec<BlockLocation>, LocateError> {
        let output = self
            .run(&["fsck", file_path, "-files", "-blocks", "-locations"])
            .await
            .map_err(|e| self.unavailable(e))?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let blocks = parse_fsck(file_path, &text, &self.directory)?;
        // fsck also fails for unhealthy files; their block list is not trusted
        if !output.status.success() {
            return Err(LocateError::LocatorUnavailable(format!(
                "hdfs fsck {} exited with {}",
                file_path, output.status
            )));
        }
        Ok(blocks)
    }
}

#[async_trait]
impl FileSystem for HdfsCli {
    async fn stat(&self, path: &str) -> Result<Option<PathKind>, LocateError> {
        match self.test("-d", path).await? {
            Some(true) => return Ok(Some(PathKind::Directory)),
            Some(false) => {}
            None => {
                return Err(LocateError::LocatorUnavailable(format!(
                    "hdfs dfs -test failed for {}",
                    path
                )))
            }
        }
        match self.test("-e", path).await? {
            Some(true) => Ok(Some(PathKind::File)),
            Some(false) => Ok(None),
            None => Err(LocateError::LocatorUnavailable(format!(
                "hdfs dfs -test failed for {}",
                path
            ))),
        }
    }

    async fn delete(&self, path: &str, skip_trash: bool) -> Result<(), DeleteError> {
        let mut args = vec!["dfs", "-rm"];
        if skip_trash {
            args.push("-skipTrash");
        }
        args.push(path);

        let output = self
            .run(&args)
            .await
            .map_err(|e| DeleteError::DeleteFailed(format!("failed to run hdfs: {}", e)))?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("No such file or directory") {
            Err(DeleteError::FileNotFound(path.to_string()))
        } else {
            Err(DeleteError::DeleteFailed(stderr.trim().to_string()))
        }
    }
}
