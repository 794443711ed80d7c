//! Coordination service access.
//!
//! The ledger is stored in a strongly consistent, hierarchical key/value
//! service. This module provides:
//! - The [`CoordinationStore`] trait (create/get/compare-and-swap/delete,
//!   children listing, ephemeral nodes)
//! - [`InMemoryStore`] for tests and single-process use
//! - [`SqliteStore`] as the durable shared backend

pub mod memory;
pub mod sqlite;
pub mod traits;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CoordError, CoordResult, CoordinationStore, CreateMode, NodeData, Version};

use std::sync::Arc;
use std::time::Duration;

/// Endpoint schemes accepted by [`connect`].
pub const SUPPORTED_SCHEMES: [&str; 1] = ["sqlite:"];

/// Whether `endpoint` names a backend this build can open.
pub fn is_supported_endpoint(endpoint: &str) -> bool {
    SUPPORTED_SCHEMES.iter().any(|s| endpoint.starts_with(s))
}

/// Open a session on the coordination service at `endpoint`.
pub async fn connect(
    endpoint: &str,
    session_timeout: Duration,
) -> CoordResult<Arc<dyn CoordinationStore>> {
    if endpoint.starts_with("sqlite:") {
        let store = SqliteStore::connect(endpoint, session_timeout).await?;
        return Ok(Arc::new(store));
    }
    Err(CoordError::InvalidEndpoint(format!(
        "unsupported scheme in '{}'",
        endpoint
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_endpoint() {
        assert!(is_supported_endpoint("sqlite:///var/lib/blockshred/ledger.db"));
        assert!(is_supported_endpoint("sqlite::memory:"));
        assert!(!is_supported_endpoint("zk://10.0.0.1:2181"));
        assert!(!is_supported_endpoint(""));
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        let result = connect("zk://localhost:2181", Duration::from_secs(5)).await;
        let err = result.err().unwrap();
        assert!(matches!(err, CoordError::InvalidEndpoint(_)));
        assert!(!err.is_transient());
    }
}
