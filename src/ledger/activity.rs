//! Activity log: one record per state transition.
//!
//! The log is append-only and written for operators; agents never read it
//! back. Each line of the on-disk form is one JSON object:
//!
//! ```text
//! {"entryId":"dn-01/blk_1073741825","filePath":"/data/x.csv","from":"PENDING_SHRED","to":"STAGED","actor":"worker","timestamp":1700000000,"error":null}
//! ```

use super::entry::EntryId;
use super::state::{Actor, ShredState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// A single state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub entry_id: String,
    pub file_path: String,
    /// `None` when the entry was created.
    pub from: Option<ShredState>,
    pub to: ShredState,
    pub actor: Actor,
    pub timestamp: u64,
    pub error: Option<String>,
}

impl ActivityRecord {
    pub fn new(
        id: &EntryId,
        file_path: &str,
        from: Option<ShredState>,
        to: ShredState,
        actor: Actor,
        timestamp: u64,
    ) -> Self {
        Self {
            entry_id: id.to_string(),
            file_path: file_path.to_string(),
            from,
            to,
            actor,
            timestamp,
            error: None,
        }
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }

    /// Node identity part of the entry id.
    pub fn node(&self) -> &str {
        self.entry_id
            .split_once('/')
            .map(|(node, _)| node)
            .unwrap_or(&self.entry_id)
    }
}

/// Activity sink errors.
#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("activity log I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize activity record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Destination for activity records.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn record(&self, record: &ActivityRecord) -> Result<(), ActivityError>;
}

/// Appends JSON lines to a file.
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ActivitySink for JsonLinesSink {
    async fn record(&self, record: &ActivityRecord) -> Result<(), ActivityError> {
        let io_err = |source: std::io::Error| ActivityError::Io {
            path: self.path.clone(),
            source,
        };

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;
        // One write per record keeps lines whole under O_APPEND.
        file.write_all(&line).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<ActivityRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, oldest first.
    pub fn records(&self) -> Vec<ActivityRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ActivitySink for MemorySink {
    async fn record(&self, record: &ActivityRecord) -> Result<(), ActivityError> {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
        Ok(())
    }
}

/// Read a JSON lines activity log. Malformed lines are skipped with a warning.
pub async fn read_activity_log(path: &Path) -> Result<Vec<ActivityRecord>, ActivityError> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ActivityError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut records = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ActivityRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                path = %path.display(),
                line = lineno + 1,
                error = %e,
                "skipping malformed activity record"
            ),
        }
    }
    Ok(records)
}

/// Query options for the activity log.
#[derive(Debug, Clone)]
pub struct ActivityQuery {
    /// Only records for this entry id (`<node>/blk_<id>`).
    pub entry_id: Option<String>,
    /// Only records for entries on this node.
    pub node: Option<String>,
    /// Only transitions into this state.
    pub to_state: Option<ShredState>,
    /// Limit number of results (most recent first).
    pub limit: Option<usize>,
}

impl Default for ActivityQuery {
    fn default() -> Self {
        Self {
            entry_id: None,
            node: None,
            to_state: None,
            limit: Some(50),
        }
    }
}

/// Filter records, most recent first.
pub fn query_activity(records: &[ActivityRecord], query: &ActivityQuery) -> Vec<ActivityRecord> {
    let mut filtered: Vec<ActivityRecord> = records
        .iter()
        .filter(|r| query.entry_id.as_ref().map_or(true, |id| &r.entry_id == id))
        .filter(|r| query.node.as_ref().map_or(true, |n| r.node() == n))
        .filter(|r| query.to_state.map_or(true, |s| r.to == s))
        .cloned()
        .collect();

    // Stable sort keeps file order for records within the same second.
    filtered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    if let Some(limit) = query.limit {
        filtered.truncate(limit);
    }
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::entry::{BlockId, NodeIdentity};
    use tempfile::TempDir;

    fn record(node: &str, block: i64, to: ShredState, ts: u64) -> ActivityRecord {
        let id = EntryId::new(NodeIdentity::new(node).unwrap(), BlockId::new(block));
        ActivityRecord::new(&id, "/data/f", None, to, Actor::Worker, ts)
    }

    #[tokio::test]
    async fn test_json_lines_append_and_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("activity.jsonl");
        let sink = JsonLinesSink::new(&path);

        sink.record(&record("dn-01", 1, ShredState::Registered, 10))
            .await
            .unwrap();
        sink.record(
            &record("dn-01", 1, ShredState::Failed, 20)
                .with_error(Some("DataInconsistency: gone".into())),
        )
        .await
        .unwrap();

        let records = read_activity_log(&path).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].to, ShredState::Failed);
        assert_eq!(records[1].error.as_deref(), Some("DataInconsistency: gone"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.contains("\"entryId\":\"dn-01/blk_1\""));
    }

    #[tokio::test]
    async fn test_read_missing_log_is_empty() {
        let dir = TempDir::new().unwrap();
        let records = read_activity_log(&dir.path().join("none.jsonl"))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_read_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("activity.jsonl");
        let good = serde_json::to_string(&record("dn-01", 1, ShredState::Staged, 5)).unwrap();
        std::fs::write(&path, format!("{{broken\n{}\n\n", good)).unwrap();

        let records = read_activity_log(&path).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_query_filters_and_orders() {
        let records = vec![
            record("dn-01", 1, ShredState::PendingShred, 10),
            record("dn-02", 2, ShredState::PendingShred, 11),
            record("dn-01", 1, ShredState::Staged, 12),
            record("dn-01", 1, ShredState::Shredded, 13),
        ];

        let all = query_activity(&records, &ActivityQuery::default());
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].timestamp, 13);

        let node = query_activity(
            &records,
            &ActivityQuery {
                node: Some("dn-02".into()),
                ..Default::default()
            },
        );
        assert_eq!(node.len(), 1);

        let shredded = query_activity(
            &records,
            &ActivityQuery {
                to_state: Some(ShredState::Shredded),
                ..Default::default()
            },
        );
        assert_eq!(shredded.len(), 1);

        let limited = query_activity(
            &records,
            &ActivityQuery {
                entry_id: Some("dn-01/blk_1".into()),
                limit: Some(2),
                ..Default::default()
            },
        );
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].to, ShredState::Shredded);
    }

    #[tokio::test]
    async fn test_memory_sink() {
        let sink = MemorySink::new();
        sink.record(&record("dn-01", 1, ShredState::Registered, 1))
            .await
            .unwrap();
        assert_eq!(sink.records().len(), 1);
    }
}
