//! Block replica entry schema.
//!
//! One entry exists per (block, node) pair. The entry id is the pair itself,
//! so re-registering the same replica lands on the same ledger path and the
//! registration is naturally idempotent.

use super::state::ShredState;
use crate::error::ErrorClass;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Current entry schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Malformed identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("node identity must be non-empty and contain no '/' or whitespace: '{0}'")]
    InvalidNodeIdentity(String),

    #[error("invalid block id '{0}' (expected blk_<number>)")]
    InvalidBlockId(String),

    #[error("invalid entry id '{0}' (expected <node>/blk_<number>)")]
    InvalidEntryId(String),
}

/// Stable, operator-assigned storage node identity (e.g. `dn-07`).
///
/// Deliberately not a network address: a node keeps its identity across IP
/// reassignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeIdentity(String);

impl NodeIdentity {
    pub fn new(identity: impl Into<String>) -> Result<Self, IdentifierError> {
        let identity = identity.into();
        let valid = !identity.is_empty()
            && identity != "lease"
            && !identity.contains('/')
            && !identity.chars().any(char::is_whitespace);
        if valid {
            Ok(Self(identity))
        } else {
            Err(IdentifierError::InvalidNodeIdentity(identity))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NodeIdentity {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeIdentity> for String {
    fn from(value: NodeIdentity) -> Self {
        value.0
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Filesystem block identifier, rendered `blk_<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(i64);

impl BlockId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blk_{}", self.0)
    }
}

impl FromStr for BlockId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("blk_")
            .and_then(|n| n.parse::<i64>().ok())
            .map(BlockId)
            .ok_or_else(|| IdentifierError::InvalidBlockId(s.to_string()))
    }
}

/// Entry identity: the (node, block) pair. Rendered `<node>/blk_<id>`,
/// which is also the entry's path below the ledger root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId {
    pub node: NodeIdentity,
    pub block: BlockId,
}

impl EntryId {
    pub fn new(node: NodeIdentity, block: BlockId) -> Self {
        Self { node, block }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.block)
    }
}

impl FromStr for EntryId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (node, block) = s
            .split_once('/')
            .ok_or_else(|| IdentifierError::InvalidEntryId(s.to_string()))?;
        Ok(Self {
            node: NodeIdentity::new(node)?,
            block: block.parse()?,
        })
    }
}

/// Where and how far a worker got with the protected local copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingRecord {
    /// Location of the staged copy (same mount as the replica).
    pub staged_path: PathBuf,
    /// Hex SHA-256 of the staged copy; `None` until the copy completed.
    pub digest: Option<String>,
    /// When the entry was (last) acquired into `STAGED`.
    pub staged_at: u64,
    /// Set once the original replica has been erased.
    pub original_erased: bool,
}

/// Last failure recorded against an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastError {
    pub class: ErrorClass,
    pub message: String,
    pub at: u64,
}

/// The unit of coordination: one replica of one block on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockReplicaEntry {
    pub schema_version: u32,
    pub file_path: String,
    pub block_id: BlockId,
    pub node_identity: NodeIdentity,
    pub local_path: PathBuf,
    pub state: ShredState,
    pub created_at: u64,
    pub last_transition_at: u64,
    /// Total attempts over the entry's life; never reset.
    pub attempt_count: u32,
    /// `attempt_count` at the most recent operator re-arm.
    #[serde(default)]
    pub attempt_floor: u32,
    #[serde(default)]
    pub rearm_count: u32,
    /// Earliest time a worker may retry after a failed attempt.
    #[serde(default)]
    pub next_attempt_at: Option<u64>,
    #[serde(default)]
    pub last_error: Option<LastError>,
    #[serde(default)]
    pub staging: Option<StagingRecord>,
}

impl BlockReplicaEntry {
    /// A fresh `REGISTERED` entry.
    pub fn new(
        file_path: impl Into<String>,
        block_id: BlockId,
        node_identity: NodeIdentity,
        local_path: impl Into<PathBuf>,
        now: u64,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            file_path: file_path.into(),
            block_id,
            node_identity,
            local_path: local_path.into(),
            state: ShredState::Registered,
            created_at: now,
            last_transition_at: now,
            attempt_count: 0,
            attempt_floor: 0,
            rearm_count: 0,
            next_attempt_at: None,
            last_error: None,
            staging: None,
        }
    }

    pub fn id(&self) -> EntryId {
        EntryId::new(self.node_identity.clone(), self.block_id)
    }

    /// Whether `other` describes the same replica assignment (file, block,
    /// node, local path), ignoring lifecycle fields.
    pub fn same_assignment(&self, other: &BlockReplicaEntry) -> bool {
        self.file_path == other.file_path
            && self.block_id == other.block_id
            && self.node_identity == other.node_identity
            && self.local_path == other.local_path
    }

    /// Attempts spent since the last re-arm (or since creation).
    pub fn attempts_this_arm(&self) -> u32 {
        self.attempt_count.saturating_sub(self.attempt_floor)
    }

    /// Whether a retry backoff is still running at `now`.
    pub fn in_backoff(&self, now: u64) -> bool {
        self.next_attempt_at.is_some_and(|at| at > now)
    }

    /// Seconds since the last state transition.
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_transition_at)
    }
}
