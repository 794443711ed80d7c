//! Worker agent: destroys the replicas addressed to one storage node.
//!
//! Each invocation is one bounded batch. It reads its queue from the ledger,
//! processes entries one at a time and exits; nothing is carried between
//! invocations.
//!
//! Per entry:
//! 1. Take the liveness lease (an ephemeral ledger node)
//! 2. `PENDING_SHRED -> STAGED` (or `STAGED -> STAGED` when reclaiming)
//! 3. Copy the replica into the staging area and record its digest
//! 4. Erase the original replica and record that it is gone
//! 5. Erase the staged copy
//! 6. `STAGED -> SHREDDED`, release the lease
//!
//! ## Resume rules
//!
//! A `STAGED` entry found without a lease belongs to a run that crashed.
//! Once its staging timestamp is older than the liveness threshold (or it
//! recorded a failure after staging) it is reclaimed:
//!
//! - Staged copy matches the recorded digest: the copy is not redone
//! - Staged copy missing or corrupt, original intact: copy again
//! - Original already erased: only the staged copy is left to erase
//! - Neither original nor verified copy: `FAILED` (`DataInconsistency`)
//!
//! ## Failures
//!
//! Failures are isolated per entry. Transient failures count an attempt and
//! set a backoff; the attempt that reaches the retry ceiling fails the entry.
//! Data inconsistencies fail the entry immediately. Conflicts mean another
//! runner owns the entry and are skipped.

use super::staging::{
    exists, file_digest, stage_copy, staged_path, staging_dir, staging_tmp_path,
};
use crate::eraser::{EraseError, SecureEraser};
use crate::error::{ErrorClass, ShredError};
use crate::ledger::{
    unix_now, Actor, AttemptOutcome, BlockReplicaEntry, EntryId, NodeIdentity, RetryPolicy,
    ShredLedger, ShredState, StagingRecord,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default number of entries handled per invocation.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Default staging directory name.
pub const DEFAULT_STAGING_DIR: &str = ".shred-staging";

/// Worker settings for one node.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub node: NodeIdentity,
    /// Node data directory; staging goes to its top level when known.
    pub data_dir: Option<PathBuf>,
    pub staging_dir_name: String,
    pub batch_size: usize,
    /// How long a lease-less `STAGED` entry must sit before it is reclaimed.
    pub liveness_threshold: Duration,
    pub erase_passes: u32,
    pub retry: RetryPolicy,
}

impl WorkerSettings {
    pub fn new(node: NodeIdentity) -> Self {
        Self {
            node,
            data_dir: None,
            staging_dir_name: DEFAULT_STAGING_DIR.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            liveness_threshold: Duration::from_secs(30 * 60),
            erase_passes: 3,
            retry: RetryPolicy::default(),
        }
    }
}

/// Counts for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub shredded: usize,
    /// Attempt failed; the entry will be retried by a later invocation.
    pub retrying: usize,
    pub failed: usize,
    /// Owned by another runner.
    pub skipped: usize,
    /// Backoff not yet elapsed.
    pub deferred: usize,
    /// Failure could not be recorded in the ledger.
    pub unrecorded: usize,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.shredded + self.retrying + self.failed + self.skipped + self.unrecorded
    }
}

enum Outcome {
    Shredded,
    Skipped,
}

pub struct Worker {
    ledger: Arc<ShredLedger>,
    eraser: Arc<dyn SecureEraser>,
    settings: WorkerSettings,
    run_id: String,
}

impl Worker {
    pub fn new(
        ledger: Arc<ShredLedger>,
        eraser: Arc<dyn SecureEraser>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            ledger,
            eraser,
            settings,
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Identifier written into every lease this worker takes.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Process one batch of entries for this node.
    pub async fn run_batch(&self) -> Result<BatchReport, ShredError> {
        let node = &self.settings.node;
        let now = unix_now();
        let mut report = BatchReport::default();

        let mut reclaim = Vec::new();
        let mut pending = Vec::new();
        for entry in self.ledger.list_node(node).await? {
            let entry = entry.value;
            match entry.state {
                ShredState::Staged | ShredState::PendingShred if entry.in_backoff(now) => {
                    report.deferred += 1;
                }
                ShredState::Staged => reclaim.push(entry),
                ShredState::PendingShred => pending.push(entry),
                _ => {}
            }
        }
        // Half-finished work first, then oldest requests.
        reclaim.sort_by_key(|e| e.staging.as_ref().map_or(e.last_transition_at, |s| s.staged_at));
        pending.sort_by_key(|e| e.created_at);

        let queue: Vec<BlockReplicaEntry> = reclaim
            .into_iter()
            .chain(pending)
            .take(self.settings.batch_size)
            .collect();
        info!(node = %node, queued = queue.len(), deferred = report.deferred, run = %self.run_id, "worker batch started");

        for entry in queue {
            // Keyed by where the entry lives, not by what it claims.
            let id = EntryId::new(node.clone(), entry.block_id);
            match self.process(&id, &entry, now).await {
                Ok(Outcome::Shredded) => report.shredded += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(err) => self.record_failure(&id, err, &mut report).await,
            }
        }

        info!(
            node = %node,
            shredded = report.shredded,
            retrying = report.retrying,
            failed = report.failed,
            skipped = report.skipped,
            deferred = report.deferred,
            "worker batch finished"
        );
        Ok(report)
    }

    async fn process(
        &self,
        id: &EntryId,
        entry: &BlockReplicaEntry,
        now: u64,
    ) -> Result<Outcome, ShredError> {
        if entry.node_identity != self.settings.node {
            return Err(ShredError::DataInconsistency(format!(
                "entry under {} is addressed to {}",
                self.settings.node, entry.node_identity
            )));
        }

        if entry.state == ShredState::Staged && !self.reclaimable(id, entry, now).await? {
            debug!(entry = %id, "staged entry still in flight elsewhere");
            return Ok(Outcome::Skipped);
        }

        if !self.ledger.acquire_lease(id, &self.run_id).await? {
            debug!(entry = %id, "lease held by another run");
            return Ok(Outcome::Skipped);
        }

        let result = self.shred(id, entry).await;
        if let Err(e) = self.ledger.release_lease(id).await {
            warn!(entry = %id, error = %e, "failed to release lease");
        }
        result
    }

    /// Whether a `STAGED` entry has been let go by the run that staged it.
    async fn reclaimable(
        &self,
        id: &EntryId,
        entry: &BlockReplicaEntry,
        now: u64,
    ) -> Result<bool, ShredError> {
        if self.ledger.lease_holder(id).await?.is_some() {
            return Ok(false);
        }
        let staged_at = entry
            .staging
            .as_ref()
            .map_or(entry.last_transition_at, |s| s.staged_at);
        let failed_since = entry
            .last_error
            .as_ref()
            .is_some_and(|err| err.at >= staged_at);
        let stale = now.saturating_sub(staged_at) >= self.settings.liveness_threshold.as_secs();
        Ok(failed_since || stale)
    }

    async fn shred(&self, id: &EntryId, entry: &BlockReplicaEntry) -> Result<Outcome, ShredError> {
        let passes = self.settings.erase_passes;
        let local = entry.local_path.clone();

        let staged = match &entry.staging {
            Some(record) => record.staged_path.clone(),
            None => {
                let dir = staging_dir(
                    &local,
                    self.settings.data_dir.as_deref(),
                    &self.settings.staging_dir_name,
                );
                staged_path(&dir, &local)
            }
        };

        if entry.state == ShredState::PendingShred {
            let has_copy = entry.staging.as_ref().is_some_and(|s| s.digest.is_some());
            if !has_copy && !exists(&local).await {
                return Err(ShredError::DataInconsistency(format!(
                    "replica {} does not exist and there is no staged copy",
                    local.display()
                )));
            }
        }

        // Acquire: the CAS makes this run the only effective mutator.
        let staged_at = unix_now();
        let staged_for_update = staged.clone();
        let current = self
            .ledger
            .transition(id, entry.state, ShredState::Staged, Actor::Worker, move |e| {
                let record = e.staging.get_or_insert(StagingRecord {
                    staged_path: staged_for_update,
                    digest: None,
                    staged_at,
                    original_erased: false,
                });
                record.staged_at = staged_at;
                e.next_attempt_at = None;
            })
            .await?;

        let original_erased = current
            .staging
            .as_ref()
            .is_some_and(|s| s.original_erased);

        if !original_erased {
            let recorded = current.staging.as_ref().and_then(|s| s.digest.clone());
            let verified = match &recorded {
                Some(digest) => file_digest(&staged).await?.as_ref() == Some(digest),
                None => false,
            };

            if verified {
                debug!(entry = %id, "staged copy verified, skipping copy");
            } else {
                // Whatever a crashed run left in staging is plaintext too.
                self.scrub_staging(id, &staged).await?;
                if !exists(&local).await {
                    return Err(ShredError::DataInconsistency(format!(
                        "replica {} is gone and staged copy {} does not verify",
                        local.display(),
                        staged.display()
                    )));
                }
                let digest = match stage_copy(&local, &staged).await {
                    Ok(digest) => digest,
                    Err(e) => {
                        self.scrub_staging(id, &staged).await?;
                        return Err(e.into());
                    }
                };
                debug!(entry = %id, staged = %staged.display(), digest = %digest, "replica staged");
                self.ledger
                    .update(id, ShredState::Staged, move |e| {
                        if let Some(s) = e.staging.as_mut() {
                            s.digest = Some(digest);
                        }
                    })
                    .await?;
            }

            // A verified staged copy with the original already gone means a
            // previous run erased it but crashed before recording it.
            match self.eraser.erase(&local, passes).await {
                Ok(()) => {}
                Err(EraseError::PathNotFound(_)) => {
                    debug!(entry = %id, "original replica already gone");
                }
                Err(e) => return Err(e.into()),
            }
            self.ledger
                .update(id, ShredState::Staged, |e| {
                    if let Some(s) = e.staging.as_mut() {
                        s.original_erased = true;
                    }
                })
                .await?;
            debug!(entry = %id, "original replica erased");
        }

        self.erase(&staged, passes).await?;

        self.ledger
            .transition(id, ShredState::Staged, ShredState::Shredded, Actor::Worker, |e| {
                e.next_attempt_at = None;
            })
            .await?;
        info!(entry = %id, file = %entry.file_path, eraser = self.eraser.name(), "replica shredded");
        Ok(Outcome::Shredded)
    }

    /// Erase the staged copy and any partial copy that did not verify.
    async fn scrub_staging(&self, id: &EntryId, staged: &Path) -> Result<(), ShredError> {
        let passes = self.settings.erase_passes;
        for path in [staged.to_path_buf(), staging_tmp_path(staged)] {
            if exists(&path).await {
                warn!(entry = %id, path = %path.display(), "erasing unverified staged data");
                self.erase(&path, passes).await?;
            }
        }
        Ok(())
    }

    /// Erase a file that may already be gone.
    async fn erase(&self, path: &Path, passes: u32) -> Result<(), ShredError> {
        match self.eraser.erase(path, passes).await {
            Ok(()) | Err(EraseError::PathNotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn record_failure(&self, id: &EntryId, err: ShredError, report: &mut BatchReport) {
        let class = err.class();
        if class == ErrorClass::ConcurrencyConflict {
            debug!(entry = %id, error = %err, "entry taken by another runner");
            report.skipped += 1;
            return;
        }

        let state = match self.ledger.load(id).await {
            Ok(Some(current)) => current.value.state,
            Ok(None) => {
                warn!(entry = %id, error = %err, "entry vanished while failing");
                report.unrecorded += 1;
                return;
            }
            Err(e) => {
                warn!(entry = %id, error = %err, ledger_error = %e, "could not record failure");
                report.unrecorded += 1;
                return;
            }
        };
        if !matches!(state, ShredState::PendingShred | ShredState::Staged) {
            report.skipped += 1;
            return;
        }

        let message = err.to_string();
        let recorded = if class == ErrorClass::DataInconsistency {
            self.ledger
                .fail(id, state, Actor::Worker, class, &message)
                .await
                .map(AttemptOutcome::Failed)
        } else {
            self.ledger
                .record_attempt_failure(id, state, Actor::Worker, class, &message, &self.settings.retry)
                .await
        };

        match recorded {
            Ok(AttemptOutcome::Failed(_)) => report.failed += 1,
            Ok(AttemptOutcome::Retrying { .. }) => report.retrying += 1,
            Err(e) if e.is_conflict() => report.skipped += 1,
            Err(e) => {
                warn!(entry = %id, error = %err, ledger_error = %e, "could not record failure");
                report.unrecorded += 1;
            }
        }
    }
}
