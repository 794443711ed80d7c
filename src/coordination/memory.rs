//! In-memory coordination store.
//!
//! Backs unit and integration tests, and any single-process use. Several
//! handles created with [`InMemoryStore::session`] share one node tree but own
//! their ephemeral nodes separately, which is how tests model two worker runs
//! (or a run that crashed and a fresh one).

use super::traits::*;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct StoredNode {
    data: Vec<u8>,
    version: Version,
    owner: Option<u64>,
}

#[derive(Default)]
struct Tree {
    nodes: BTreeMap<String, StoredNode>,
    unavailable: bool,
    writes: u64,
}

/// In-memory coordination store handle (one session).
#[derive(Clone)]
pub struct InMemoryStore {
    tree: Arc<Mutex<Tree>>,
    next_session: Arc<AtomicU64>,
    session: u64,
}

impl InMemoryStore {
    /// Create a new, empty store with a single session.
    pub fn new() -> Self {
        Self {
            tree: Arc::new(Mutex::new(Tree::default())),
            next_session: Arc::new(AtomicU64::new(1)),
            session: 0,
        }
    }

    /// Open another session on the same tree.
    pub fn session(&self) -> Self {
        Self {
            tree: self.tree.clone(),
            next_session: self.next_session.clone(),
            session: self.next_session.fetch_add(1, Ordering::SeqCst),
        }
    }

    /// Simulate the service becoming unreachable (or reachable again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Number of successful mutations (create, set, delete) since creation.
    pub fn write_count(&self) -> u64 {
        self.lock().writes
    }

    /// Every node path currently in the tree, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.lock().nodes.keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tree> {
        // A poisoned lock only means a test thread panicked mid-operation.
        self.tree.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(tree: &Tree) -> CoordResult<()> {
        if tree.unavailable {
            return Err(CoordError::Unavailable("in-memory store offline".into()));
        }
        Ok(())
    }

    fn drop_session_nodes(&self) {
        let mut tree = self.lock();
        let session = self.session;
        tree.nodes.retain(|_, node| node.owner != Some(session));
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_child_of(path: &str, parent: &str) -> Option<String> {
    let rest = path.strip_prefix(parent)?.strip_prefix('/')?;
    if rest.is_empty() || rest.contains('/') {
        None
    } else {
        Some(rest.to_string())
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> CoordResult<()> {
        validate_path(path)?;
        let mut tree = self.lock();
        Self::check_available(&tree)?;

        if tree.nodes.contains_key(path) {
            return Err(CoordError::NodeExists(path.to_string()));
        }
        for ancestor in ancestors(path) {
            tree.nodes
                .entry(ancestor.to_string())
                .or_insert_with(|| StoredNode {
                    data: Vec::new(),
                    version: 0,
                    owner: None,
                });
        }

        let owner = match mode {
            CreateMode::Persistent => None,
            CreateMode::Ephemeral => Some(self.session),
        };
        tree.nodes.insert(
            path.to_string(),
            StoredNode {
                data: data.to_vec(),
                version: 0,
                owner,
            },
        );
        tree.writes += 1;
        Ok(())
    }

    async fn get(&self, path: &str) -> CoordResult<Option<NodeData>> {
        validate_path(path)?;
        let tree = self.lock();
        Self::check_available(&tree)?;
        Ok(tree.nodes.get(path).map(|n| NodeData {
            data: n.data.clone(),
            version: n.version,
            ephemeral: n.owner.is_some(),
        }))
    }

    async fn set(&self, path: &str, data: &[u8], expected: Version) -> CoordResult<Version> {
        validate_path(path)?;
        let mut tree = self.lock();
        Self::check_available(&tree)?;

        let node = tree
            .nodes
            .get_mut(path)
            .ok_or_else(|| CoordError::NoNode(path.to_string()))?;
        if node.version != expected {
            return Err(CoordError::BadVersion {
                path: path.to_string(),
                expected,
                actual: node.version,
            });
        }
        node.data = data.to_vec();
        node.version += 1;
        let version = node.version;
        tree.writes += 1;
        Ok(version)
    }

    async fn delete(&self, path: &str, expected: Option<Version>) -> CoordResult<()> {
        validate_path(path)?;
        let mut tree = self.lock();
        Self::check_available(&tree)?;

        let node = tree
            .nodes
            .get(path)
            .ok_or_else(|| CoordError::NoNode(path.to_string()))?;
        if let Some(expected) = expected {
            if node.version != expected {
                return Err(CoordError::BadVersion {
                    path: path.to_string(),
                    expected,
                    actual: node.version,
                });
            }
        }
        if tree.nodes.keys().any(|k| is_child_of(k, path).is_some()) {
            return Err(CoordError::NotEmpty(path.to_string()));
        }
        tree.nodes.remove(path);
        tree.writes += 1;
        Ok(())
    }

    async fn children(&self, path: &str) -> CoordResult<Vec<String>> {
        validate_path(path)?;
        let tree = self.lock();
        Self::check_available(&tree)?;
        // BTreeMap iteration keeps the result sorted.
        Ok(tree
            .nodes
            .keys()
            .filter_map(|k| is_child_of(k, path))
            .collect())
    }

    async fn close(&self) -> CoordResult<()> {
        self.drop_session_nodes();
        Ok(())
    }
}
