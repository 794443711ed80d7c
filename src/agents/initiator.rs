//! Initiator agent: turns one delete request into ledger entries.
//!
//! Flow for a file path:
//! 1. Stat the path (directories are refused)
//! 2. Resolve blocks and replicas through the block locator
//! 3. Register one `REGISTERED` entry per (block, node) pair
//! 4. Delete the file, bypassing trash
//! 5. Move every `REGISTERED` entry for the file to `PENDING_SHRED`
//!
//! ## Design
//!
//! - **Idempotent**: every step can be re-run. Re-registration of an
//!   identical entry writes nothing, a delete of an already-deleted file
//!   counts as success, and only `REGISTERED` entries are advanced.
//! - **Safe ordering**: entries exist before the file is deleted, so a crash
//!   after the delete never loses track of blocks. Workers ignore
//!   `REGISTERED` entries, so a crash before the delete leaves the data
//!   untouched.
//! - **Resume**: when the file is already gone, the request resumes from the
//!   entries registered by the earlier run. A missing path with no entries
//!   has nothing left to shred and completes without writing.

use crate::error::ShredError;
use crate::hdfs::{BlockLocator, DeleteError, FileSystem, PathKind};
use crate::ledger::{
    unix_now, Actor, BlockReplicaEntry, CreateOutcome, EntryId, LedgerError, ShredLedger,
    ShredState,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one delete request did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileShredRequest {
    pub file_path: String,
    /// Every entry belonging to the file.
    pub entries: Vec<EntryId>,
    /// Entries written by this run.
    pub registered: usize,
    /// Entries moved to `PENDING_SHRED` by this run.
    pub marked_pending: usize,
    /// Whether the file was still present when the request started.
    pub file_was_present: bool,
}

pub struct Initiator {
    ledger: Arc<ShredLedger>,
    locator: Arc<dyn BlockLocator>,
    fs: Arc<dyn FileSystem>,
}

impl Initiator {
    pub fn new(
        ledger: Arc<ShredLedger>,
        locator: Arc<dyn BlockLocator>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            ledger,
            locator,
            fs,
        }
    }

    /// Securely delete `file_path`.
    pub async fn delete(&self, file_path: &str) -> Result<FileShredRequest, ShredError> {
        let mut request = FileShredRequest {
            file_path: file_path.to_string(),
            ..Default::default()
        };

        match self.fs.stat(file_path).await? {
            Some(PathKind::Directory) => return Err(ShredError::NotAFile(file_path.to_string())),
            Some(PathKind::File) => {
                request.file_was_present = true;
                self.register(file_path, &mut request).await?;
                self.logical_delete(file_path).await?;
            }
            None => {
                let existing = self.ledger.list_by_file(file_path).await?;
                if existing.is_empty() {
                    // Never existed, or had no blocks: nothing to shred either way
                    warn!(file = %file_path, "path does not exist and has no ledger entries");
                    return Ok(request);
                }
                request.entries = existing.iter().map(BlockReplicaEntry::id).collect();

                if !existing.iter().any(|e| e.state == ShredState::Registered) {
                    info!(file = %file_path, entries = existing.len(), "file already deleted and handed to workers");
                    return Ok(request);
                }
                info!(file = %file_path, "resuming interrupted delete");
                self.logical_delete(file_path).await?;
            }
        }

        for id in &request.entries {
            if self.mark_pending(id).await? {
                request.marked_pending += 1;
            }
        }

        info!(
            file = %file_path,
            entries = request.entries.len(),
            registered = request.registered,
            marked_pending = request.marked_pending,
            "delete request complete"
        );
        Ok(request)
    }

    async fn register(
        &self,
        file_path: &str,
        request: &mut FileShredRequest,
    ) -> Result<(), ShredError> {
        let blocks = self.locator.locate(file_path).await?;
        let now = unix_now();

        for block in &blocks {
            if block.replicas.is_empty() {
                warn!(file = %file_path, block = %block.block_id, "block has no live replicas");
            }
            for replica in &block.replicas {
                let entry = BlockReplicaEntry::new(
                    file_path,
                    block.block_id,
                    replica.node.clone(),
                    replica.local_path.clone(),
                    now,
                );
                match self.ledger.create_entry(&entry).await {
                    Ok(CreateOutcome::Created(_)) => request.registered += 1,
                    Ok(CreateOutcome::Unchanged(_)) => {
                        debug!(entry = %entry.id(), "entry already registered");
                    }
                    Err(e @ LedgerError::AlreadyExists { .. }) => {
                        return Err(ShredError::DataInconsistency(e.to_string()));
                    }
                    Err(e) => return Err(e.into()),
                }
                request.entries.push(entry.id());
            }
        }
        Ok(())
    }

    async fn logical_delete(&self, file_path: &str) -> Result<(), ShredError> {
        match self.fs.delete(file_path, true).await {
            Ok(()) => {
                info!(file = %file_path, "file deleted");
                Ok(())
            }
            Err(DeleteError::FileNotFound(_)) => {
                debug!(file = %file_path, "file already deleted");
                Ok(())
            }
            Err(DeleteError::DeleteFailed(msg)) => Err(ShredError::TransientIo(format!(
                "delete of {} failed: {}",
                file_path, msg
            ))),
        }
    }

    /// `REGISTERED -> PENDING_SHRED`. Returns `false` if the entry had
    /// already moved on.
    async fn mark_pending(&self, id: &EntryId) -> Result<bool, ShredError> {
        let Some(current) = self.ledger.load(id).await? else {
            return Ok(false);
        };
        if current.value.state != ShredState::Registered {
            return Ok(false);
        }
        match self
            .ledger
            .transition(
                id,
                ShredState::Registered,
                ShredState::PendingShred,
                Actor::Initiator,
                |_| {},
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_conflict() => {
                debug!(entry = %id, "entry advanced by another runner");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
