//! Trait abstractions for the distributed filesystem.
//!
//! The agents only ever see these two seams: where a file's block replicas
//! live, and how to stat and delete the file. Both are mockable.

use crate::ledger::{BlockId, NodeIdentity};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// One replica of a block on one storage node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplicaLocation {
    pub node: NodeIdentity,
    pub local_path: PathBuf,
}

/// A block and every node holding a replica of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLocation {
    pub block_id: BlockId,
    pub replicas: Vec<ReplicaLocation>,
}

/// What a filesystem path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
}

/// Block location and stat errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("block locator unavailable: {0}")]
    LocatorUnavailable(String),
}

impl LocateError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LocateError::LocatorUnavailable(_))
    }
}

/// Logical delete errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeleteError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("delete failed: {0}")]
    DeleteFailed(String),
}

/// Resolves a file to its block replicas.
#[async_trait]
pub trait BlockLocator: Send + Sync {
    /// Blocks of `file_path` in file order, each with its replica locations.
    async fn locate(&self, file_path: &str) -> Result<Vec<BlockLocation>, LocateError>;
}

/// Namespace operations the initiator needs.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// `None` if nothing exists at `path`.
    async fn stat(&self, path: &str) -> Result<Option<PathKind>, LocateError>;

    /// Remove `path`. With `skip_trash` the file bypasses any recycle area.
    async fn delete(&self, path: &str, skip_trash: bool) -> Result<(), DeleteError>;
}
