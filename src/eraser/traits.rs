//! Secure eraser seam.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EraseError {
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("erase I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("eraser failed on {path}: {message}")]
    Failed { path: PathBuf, message: String },
}

/// Multi-pass overwrite followed by removal.
///
/// On success the file no longer exists and its former contents are not
/// recoverable from the device. An interrupted erase may leave the file in
/// place, partially overwritten.
#[async_trait]
pub trait SecureEraser: Send + Sync {
    async fn erase(&self, path: &Path, passes: u32) -> Result<(), EraseError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
