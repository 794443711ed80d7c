//! Explicit node directory.
//!
//! The locator reports replicas by network address. Ledger entries are keyed
//! by stable node identity instead, so a node keeps its entries across IP
//! reassignment. This table is the only place addresses are mapped.

use crate::ledger::NodeIdentity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// One storage node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Address as reported by the block locator (IP, no port).
    pub address: String,
    pub identity: NodeIdentity,
    /// Storage node data directory holding `current/<block pool>/…`.
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("duplicate node address '{0}'")]
    DuplicateAddress(String),

    #[error("duplicate node identity '{0}'")]
    DuplicateIdentity(NodeIdentity),
}

/// Address and identity lookup over the configured nodes.
#[derive(Debug, Clone, Default)]
pub struct NodeDirectory {
    by_address: HashMap<String, NodeEntry>,
    by_identity: HashMap<NodeIdentity, String>,
}

impl NodeDirectory {
    pub fn new(entries: impl IntoIterator<Item = NodeEntry>) -> Result<Self, DirectoryError> {
        let mut dir = Self::default();
        for entry in entries {
            if dir.by_address.contains_key(&entry.address) {
                return Err(DirectoryError::DuplicateAddress(entry.address));
            }
            if dir.by_identity.contains_key(&entry.identity) {
                return Err(DirectoryError::DuplicateIdentity(entry.identity));
            }
            dir.by_identity
                .insert(entry.identity.clone(), entry.address.clone());
            dir.by_address.insert(entry.address.clone(), entry);
        }
        Ok(dir)
    }

    pub fn by_address(&self, address: &str) -> Option<&NodeEntry> {
        self.by_address.get(address)
    }

    pub fn by_identity(&self, identity: &NodeIdentity) -> Option<&NodeEntry> {
        self.by_identity
            .get(identity)
            .and_then(|address| self.by_address.get(address))
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(address: &str, identity: &str) -> NodeEntry {
        NodeEntry {
            address: address.into(),
            identity: NodeIdentity::new(identity).unwrap(),
            data_dir: PathBuf::from("/hadoop/dfs/data"),
        }
    }

    #[test]
    fn test_lookup_both_ways() {
        let dir = NodeDirectory::new([entry("10.0.0.1", "dn-01"), entry("10.0.0.2", "dn-02")]).unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.by_address("10.0.0.2").unwrap().identity.as_str(), "dn-02");
        assert_eq!(
            dir.by_identity(&NodeIdentity::new("dn-01").unwrap())
                .unwrap()
                .address,
            "10.0.0.1"
        );
        assert!(dir.by_address("10.0.0.9").is_none());
    }

    #[test]
    fn test_duplicates_rejected() {
        assert_eq!(
            NodeDirectory::new([entry("10.0.0.1", "dn-01"), entry("10.0.0.1", "dn-02")]).unwrap_err(),
            DirectoryError::DuplicateAddress("10.0.0.1".into())
        );
        assert!(matches!(
            NodeDirectory::new([entry("10.0.0.1", "dn-01"), entry("10.0.0.2", "dn-01")]),
            Err(DirectoryError::DuplicateIdentity(_))
        ));
    }
}
