//! Trait abstraction for the coordination service backing the ledger.
//!
//! The ledger only needs a small slice of what a ZooKeeper-style service
//! offers: hierarchical named nodes carrying bytes, a per-node version for
//! compare-and-swap writes, and ephemeral nodes that vanish when the session
//! that created them ends. Everything else (entry schema, transition rules)
//! lives above this seam in `crate::ledger`.

use async_trait::async_trait;
use thiserror::Error;

/// Monotonic per-node write sequence. A freshly created node has version 0.
pub type Version = u64;

/// Lifetime of a created node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Survives the session that created it.
    Persistent,
    /// Removed when the creating session closes or expires.
    Ephemeral,
}

/// Node payload together with its current version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeData {
    pub data: Vec<u8>,
    pub version: Version,
    pub ephemeral: bool,
}

/// Result type for coordination operations.
pub type CoordResult<T> = Result<T, CoordError>;

/// Coordination service errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    #[error("node already exists: {0}")]
    NodeExists(String),

    #[error("node does not exist: {0}")]
    NoNode(String),

    #[error("version mismatch on {path}: expected {expected}, found {actual}")]
    BadVersion {
        path: String,
        expected: Version,
        actual: Version,
    },

    #[error("node has children: {0}")]
    NotEmpty(String),

    #[error("invalid node path: {0}")]
    InvalidPath(String),

    #[error("coordination service unavailable: {0}")]
    Unavailable(String),

    #[error("invalid ledger endpoint: {0}")]
    InvalidEndpoint(String),
}

impl CoordError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Hierarchical, versioned key/value store with ephemeral nodes.
///
/// Paths are absolute, `/`-separated, without a trailing slash
/// (`/shred/dn-01/blk_1073741825`).
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Create a node. Missing parents are created as persistent empty nodes.
    ///
    /// Fails with [`CoordError::NodeExists`] if the path is already taken.
    async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> CoordResult<()>;

    /// Read a node, `None` if absent.
    async fn get(&self, path: &str) -> CoordResult<Option<NodeData>>;

    /// Overwrite a node's data iff its version equals `expected`.
    ///
    /// Returns the new version.
    async fn set(&self, path: &str, data: &[u8], expected: Version) -> CoordResult<Version>;

    /// Delete a node, optionally guarded by version. Nodes with children
    /// cannot be deleted.
    async fn delete(&self, path: &str, expected: Option<Version>) -> CoordResult<()>;

    /// Names (not full paths) of the direct children of `path`, sorted.
    /// An absent parent has no children.
    async fn children(&self, path: &str) -> CoordResult<Vec<String>>;

    /// End this session, dropping every ephemeral node it created.
    async fn close(&self) -> CoordResult<()>;

    /// Whether a node exists.
    async fn exists(&self, path: &str) -> CoordResult<bool> {
        Ok(self.get(path).await?.is_some())
    }
}

/// Validate an absolute node path.
pub fn validate_path(path: &str) -> CoordResult<()> {
    if !path.starts_with('/') || path.len() < 2 || path.ends_with('/') || path.contains("//") {
        return Err(CoordError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Parent of a node path, `None` for top-level nodes.
pub fn parent_path(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) | None => None,
        Some(idx) => Some(&path[..idx]),
    }
}

/// Every proper ancestor of `path`, outermost first.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = parent_path(path);
    while let Some(p) = current {
        out.push(p);
        current = parent_path(p);
    }
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(validate_path("/shred").is_ok());
        assert!(validate_path("/shred/dn-01/blk_1").is_ok());
        assert!(validate_path("shred").is_err());
        assert!(validate_path("/").is_err());
        assert!(validate_path("/shred/").is_err());
        assert!(validate_path("/shred//x").is_err());
    }

    #[test]
    fn test_parent_and_ancestors() {
        assert_eq!(parent_path("/shred"), None);
        assert_eq!(parent_path("/shred/dn-01"), Some("/shred"));
        assert_eq!(
            ancestors("/shred/dn-01/blk_1"),
            vec!["/shred", "/shred/dn-01"]
        );
        assert!(ancestors("/shred").is_empty());
    }

    #[test]
    fn test_transient_classification() {
        assert!(CoordError::Unavailable("timeout".into()).is_transient());
        assert!(!CoordError::InvalidEndpoint("zk://x".into()).is_transient());
        assert!(!CoordError::NoNode("/x".into()).is_transient());
        assert!(!CoordError::BadVersion {
            path: "/x".into(),
            expected: 1,
            actual: 2
        }
        .is_transient());
    }
}
