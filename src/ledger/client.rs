//! Typed ledger client.
//!
//! Maps entries onto the coordination namespace:
//!
//! ```text
//! /shred                                  root
//! /shred/<nodeIdentity>                   one directory per storage node
//! /shred/<nodeIdentity>/<blockId>         CBOR-encoded BlockReplicaEntry
//! /shred/<nodeIdentity>/<blockId>/lease   ephemeral, held by an in-flight worker run
//! ```
//!
//! Every state change is a compare-and-swap on the entry node's version, so
//! two conflicting transitions on the same entry can never both succeed. The
//! loser sees [`LedgerError::PreconditionFailed`].

use super::activity::{ActivityRecord, ActivitySink};
use super::codec::{decode_entry, encode_entry, CodecError};
use super::entry::{unix_now, BlockId, BlockReplicaEntry, EntryId, LastError, NodeIdentity};
use super::retry::RetryPolicy;
use super::state::{self, Actor, ShredState, TransitionError};
use crate::coordination::{CoordError, CoordinationStore, CreateMode, Version};
use crate::error::ErrorClass;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Default ledger root.
pub const DEFAULT_ROOT: &str = "/shred";

const LEASE_NODE: &str = "lease";

/// Ledger client errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("entry {id} already registered for a different replica (file {existing_file})")]
    AlreadyExists { id: EntryId, existing_file: String },

    #[error("entry {0} not found")]
    NotFound(EntryId),

    #[error("precondition failed on {id}: expected {expected}, found {actual}")]
    PreconditionFailed {
        id: EntryId,
        expected: ShredState,
        actual: ShredState,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("corrupt entry at {path}: {source}")]
    Codec {
        path: String,
        #[source]
        source: CodecError,
    },

    #[error("ledger store: {0}")]
    Store(#[from] CoordError),
}

impl LedgerError {
    /// Whether the same call may succeed on a later invocation.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Store(e) if e.is_transient())
    }

    /// Whether another runner got to the entry first.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            LedgerError::PreconditionFailed { .. }
                | LedgerError::Store(CoordError::BadVersion { .. })
        )
    }
}

/// A value with the store version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: Version,
}

/// Result of [`ShredLedger::create_entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new `REGISTERED` entry was written.
    Created(BlockReplicaEntry),
    /// An identical assignment already existed; nothing was written.
    Unchanged(BlockReplicaEntry),
}

impl CreateOutcome {
    pub fn entry(&self) -> &BlockReplicaEntry {
        match self {
            CreateOutcome::Created(e) | CreateOutcome::Unchanged(e) => e,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

/// Result of recording a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Entry stays in its state; a later invocation may retry.
    Retrying { attempts: u32, next_attempt_at: u64 },
    /// Retry budget exhausted; entry is now `FAILED`.
    Failed(BlockReplicaEntry),
}

/// Garbage collection summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    pub removed: usize,
    pub skipped: usize,
}

/// Typed access to the shred ledger.
pub struct ShredLedger {
    store: Arc<dyn CoordinationStore>,
    activity: Arc<dyn ActivitySink>,
    root: String,
}

impl ShredLedger {
    pub fn new(store: Arc<dyn CoordinationStore>, activity: Arc<dyn ActivitySink>) -> Self {
        Self {
            store,
            activity,
            root: DEFAULT_ROOT.to_string(),
        }
    }

    /// Use a different root path (default `/shred`).
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    fn node_path(&self, node: &NodeIdentity) -> String {
        format!("{}/{}", self.root, node)
    }

    /// Ledger path of an entry.
    pub fn entry_path(&self, id: &EntryId) -> String {
        format!("{}/{}/{}", self.root, id.node, id.block)
    }

    fn lease_path(&self, id: &EntryId) -> String {
        format!("{}/{}", self.entry_path(id), LEASE_NODE)
    }

    /// Read one entry.
    pub async fn load(&self, id: &EntryId) -> Result<Option<Versioned<BlockReplicaEntry>>, LedgerError> {
        self.load_path(self.entry_path(id)).await
    }

    async fn load_path(
        &self,
        path: String,
    ) -> Result<Option<Versioned<BlockReplicaEntry>>, LedgerError> {
        match self.store.get(&path).await? {
            None => Ok(None),
            Some(node) => {
                let value = decode_entry(&node.data)
                    .map_err(|source| LedgerError::Codec { path, source })?;
                Ok(Some(Versioned {
                    value,
                    version: node.version,
                }))
            }
        }
    }

    fn encode(&self, entry: &BlockReplicaEntry) -> Result<Vec<u8>, LedgerError> {
        encode_entry(entry).map_err(|source| LedgerError::Codec {
            path: self.entry_path(&entry.id()),
            source,
        })
    }

    /// Register an entry in `REGISTERED`.
    ///
    /// Idempotent: if the (node, block) pair is already registered for the
    /// same file and local path, nothing is written and
    /// [`CreateOutcome::Unchanged`] is returned. A different assignment at the
    /// same pair fails with [`LedgerError::AlreadyExists`].
    pub async fn create_entry(&self, entry: &BlockReplicaEntry) -> Result<CreateOutcome, LedgerError> {
        let mut fresh = entry.clone();
        fresh.state = ShredState::Registered;
        let id = fresh.id();
        let path = self.entry_path(&id);
        let bytes = self.encode(&fresh)?;

        match self.store.create(&path, &bytes, CreateMode::Persistent).await {
            Ok(()) => {
                debug!(entry = %id, file = %fresh.file_path, "entry registered");
                self.emit(ActivityRecord::new(
                    &id,
                    &fresh.file_path,
                    None,
                    ShredState::Registered,
                    Actor::Initiator,
                    fresh.created_at,
                ))
                .await;
                Ok(CreateOutcome::Created(fresh))
            }
            Err(CoordError::NodeExists(_)) => {
                let existing = self
                    .load(&id)
                    .await?
                    .ok_or_else(|| LedgerError::NotFound(id.clone()))?;
                if existing.value.same_assignment(&fresh) {
                    Ok(CreateOutcome::Unchanged(existing.value))
                } else {
                    Err(LedgerError::AlreadyExists {
                        id,
                        existing_file: existing.value.file_path,
                    })
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically move an entry from `from` to `to`, applying `update` to the
    /// other fields in the same write.
    ///
    /// Fails with [`LedgerError::PreconditionFailed`] if the entry is not in
    /// `from` (or changes underneath us), and with
    /// [`LedgerError::Transition`] if the table forbids the move for `actor`.
    pub async fn transition<F>(
        &self,
        id: &EntryId,
        from: ShredState,
        to: ShredState,
        actor: Actor,
        update: F,
    ) -> Result<BlockReplicaEntry, LedgerError>
    where
        F: FnOnce(&mut BlockReplicaEntry) + Send,
    {
        state::validate(from, to, actor)?;
        let current = self.load_expecting(id, from).await?;

        let mut next = current.value;
        update(&mut next);
        next.state = to;
        next.last_transition_at = unix_now();
        self.write(id, &next, from, current.version).await?;

        let error_text = next
            .last_error
            .as_ref()
            .filter(|_| to == ShredState::Failed)
            .map(|e| format!("{}: {}", e.class, e.message));

        if to == ShredState::Failed {
            error!(
                entry = %id,
                file = %next.file_path,
                local_path = %next.local_path.display(),
                from = %from,
                attempts = next.attempt_count,
                error = error_text.as_deref().unwrap_or("unknown"),
                "entry failed"
            );
        } else {
            info!(entry = %id, from = %from, to = %to, actor = %actor, "entry transitioned");
        }

        self.emit(
            ActivityRecord::new(id, &next.file_path, Some(from), to, actor, next.last_transition_at)
                .with_error(error_text),
        )
        .await;
        Ok(next)
    }

    /// Compare-and-swap update that keeps the entry in `expected`.
    /// Not a transition; nothing is written to the activity log.
    pub async fn update<F>(
        &self,
        id: &EntryId,
        expected: ShredState,
        update: F,
    ) -> Result<BlockReplicaEntry, LedgerError>
    where
        F: FnOnce(&mut BlockReplicaEntry) + Send,
    {
        let current = self.load_expecting(id, expected).await?;
        let mut next = current.value;
        update(&mut next);
        next.state = expected;
        self.write(id, &next, expected, current.version).await?;
        Ok(next)
    }

    /// Record a failed attempt on an entry in `expected`.
    ///
    /// Increments `attemptCount` and records `lastError`. If this attempt
    /// spends the last of the per-arm budget the entry moves to `FAILED`;
    /// otherwise it stays put with a backoff before the next retry.
    pub async fn record_attempt_failure(
        &self,
        id: &EntryId,
        expected: ShredState,
        actor: Actor,
        class: ErrorClass,
        message: &str,
        policy: &RetryPolicy,
    ) -> Result<AttemptOutcome, LedgerError> {
        let current = self.load_expecting(id, expected).await?;
        let attempts = current.value.attempts_this_arm() + 1;

        if policy.exhausted(attempts) {
            let failed = self.fail(id, expected, actor, class, message).await?;
            return Ok(AttemptOutcome::Failed(failed));
        }

        let now = unix_now();
        let next_attempt_at = now + policy.backoff_with_jitter(attempts).as_secs();
        let last_error = LastError {
            class,
            message: message.to_string(),
            at: now,
        };
        self.update(id, expected, move |e| {
            e.attempt_count += 1;
            e.last_error = Some(last_error);
            e.next_attempt_at = Some(next_attempt_at);
        })
        .await?;

        warn!(
            entry = %id,
            state = %expected,
            attempts,
            ceiling = policy.ceiling,
            error = %message,
            "shred attempt failed, will retry"
        );
        Ok(AttemptOutcome::Retrying {
            attempts,
            next_attempt_at,
        })
    }

    /// Move an entry to `FAILED`, counting the current attempt.
    pub async fn fail(
        &self,
        id: &EntryId,
        from: ShredState,
        actor: Actor,
        class: ErrorClass,
        message: &str,
    ) -> Result<BlockReplicaEntry, LedgerError> {
        let last_error = LastError {
            class,
            message: message.to_string(),
            at: unix_now(),
        };
        self.transition(id, from, ShredState::Failed, actor, move |e| {
            e.attempt_count += 1;
            e.last_error = Some(last_error);
            e.next_attempt_at = None;
        })
        .await
    }

    /// Operator re-arm: `FAILED -> PENDING_SHRED`.
    ///
    /// `attemptCount` is kept for the audit trail; the retry budget restarts
    /// from the current count.
    pub async fn rearm(&self, id: &EntryId) -> Result<BlockReplicaEntry, LedgerError> {
        self.transition(id, ShredState::Failed, ShredState::PendingShred, Actor::Operator, |e| {
            e.rearm_count += 1;
            e.attempt_floor = e.attempt_count;
            e.next_attempt_at = None;
        })
        .await
    }

    /// Operator decision to give up: `FAILED -> ABANDONED`.
    pub async fn abandon(&self, id: &EntryId) -> Result<BlockReplicaEntry, LedgerError> {
        self.transition(
            id,
            ShredState::Failed,
            ShredState::Abandoned,
            Actor::Operator,
            |_| {},
        )
        .await
    }

    async fn load_expecting(
        &self,
        id: &EntryId,
        expected: ShredState,
    ) -> Result<Versioned<BlockReplicaEntry>, LedgerError> {
        let current = self
            .load(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(id.clone()))?;
        if current.value.state != expected {
            return Err(LedgerError::PreconditionFailed {
                id: id.clone(),
                expected,
                actual: current.value.state,
            });
        }
        Ok(current)
    }

    async fn write(
        &self,
        id: &EntryId,
        entry: &BlockReplicaEntry,
        expected_state: ShredState,
        version: Version,
    ) -> Result<Version, LedgerError> {
        let bytes = self.encode(entry)?;
        match self.store.set(&self.entry_path(id), &bytes, version).await {
            Ok(v) => Ok(v),
            Err(CoordError::BadVersion { .. }) => {
                let actual = self
                    .load(id)
                    .await?
                    .map(|v| v.value.state)
                    .ok_or_else(|| LedgerError::NotFound(id.clone()))?;
                Err(LedgerError::PreconditionFailed {
                    id: id.clone(),
                    expected: expected_state,
                    actual,
                })
            }
            Err(CoordError::NoNode(_)) => Err(LedgerError::NotFound(id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn emit(&self, record: ActivityRecord) {
        if let Err(e) = self.activity.record(&record).await {
            warn!(entry = %record.entry_id, error = %e, "failed to append activity record");
        }
    }

    /// Storage nodes that have a ledger directory.
    pub async fn nodes(&self) -> Result<Vec<NodeIdentity>, LedgerError> {
        let names = self.store.children(&self.root).await?;
        Ok(names
            .into_iter()
            .filter_map(|n| NodeIdentity::new(n).ok())
            .collect())
    }

    /// Every entry addressed to `node`, with versions. Corrupt entries are
    /// logged and skipped so one bad node cannot stall the rest.
    pub async fn list_node(
        &self,
        node: &NodeIdentity,
    ) -> Result<Vec<Versioned<BlockReplicaEntry>>, LedgerError> {
        let node_path = self.node_path(node);
        let mut out = Vec::new();
        for name in self.store.children(&node_path).await? {
            if name.parse::<BlockId>().is_err() {
                continue;
            }
            match self.load_path(format!("{}/{}", node_path, name)).await {
                Ok(Some(entry)) => out.push(entry),
                Ok(None) => {}
                Err(LedgerError::Codec { path, source }) => {
                    warn!(path = %path, error = %source, "skipping unreadable entry");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Entries for `node` currently in `state`.
    pub async fn list_by_state(
        &self,
        node: &NodeIdentity,
        state: ShredState,
    ) -> Result<Vec<BlockReplicaEntry>, LedgerError> {
        Ok(self
            .list_node(node)
            .await?
            .into_iter()
            .map(|v| v.value)
            .filter(|e| e.state == state)
            .collect())
    }

    /// Every entry in the ledger.
    pub async fn list_all(&self) -> Result<Vec<BlockReplicaEntry>, LedgerError> {
        let mut out = Vec::new();
        for node in self.nodes().await? {
            out.extend(self.list_node(&node).await?.into_iter().map(|v| v.value));
        }
        Ok(out)
    }

    /// Entries created for `file_path`.
    pub async fn list_by_file(&self, file_path: &str) -> Result<Vec<BlockReplicaEntry>, LedgerError> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|e| e.file_path == file_path)
            .collect())
    }

    /// Entries stuck in a non-terminal state for at least `older_than`.
    pub async fn list_orphaned(
        &self,
        older_than: Duration,
        now: u64,
    ) -> Result<Vec<BlockReplicaEntry>, LedgerError> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|e| !e.state.is_terminal() && e.age(now) >= older_than.as_secs())
            .collect())
    }

    /// Take the liveness lease on an entry. Returns `false` if another live
    /// session holds it.
    pub async fn acquire_lease(&self, id: &EntryId, holder: &str) -> Result<bool, LedgerError> {
        match self
            .store
            .create(&self.lease_path(id), holder.as_bytes(), CreateMode::Ephemeral)
            .await
        {
            Ok(()) => Ok(true),
            Err(CoordError::NodeExists(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the liveness lease. Releasing an absent lease is a no-op.
    pub async fn release_lease(&self, id: &EntryId) -> Result<(), LedgerError> {
        match self.store.delete(&self.lease_path(id), None).await {
            Ok(()) | Err(CoordError::NoNode(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Current lease holder, if any session holds one.
    pub async fn lease_holder(&self, id: &EntryId) -> Result<Option<String>, LedgerError> {
        Ok(self
            .store
            .get(&self.lease_path(id))
            .await?
            .map(|n| String::from_utf8_lossy(&n.data).into_owned()))
    }

    /// Delete terminal entries whose last transition is older than
    /// `retention`. Non-terminal entries are never touched.
    pub async fn collect_garbage(&self, retention: Duration, now: u64) -> Result<GcReport, LedgerError> {
        let mut report = GcReport::default();

        for node in self.nodes().await? {
            for entry in self.list_node(&node).await? {
                let value = &entry.value;
                if !value.state.is_terminal() || value.age(now) < retention.as_secs() {
                    continue;
                }
                let id = value.id();
                match self
                    .store
                    .delete(&self.entry_path(&id), Some(entry.version))
                    .await
                {
                    Ok(()) => {
                        debug!(entry = %id, state = %value.state, "garbage collected entry");
                        report.removed += 1;
                    }
                    Err(CoordError::NoNode(_)) => {}
                    Err(e @ (CoordError::BadVersion { .. } | CoordError::NotEmpty(_))) => {
                        warn!(entry = %id, error = %e, "skipping entry during garbage collection");
                        report.skipped += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            // Drop the node directory once it is empty.
            let node_path = self.node_path(&node);
            if self.store.children(&node_path).await?.is_empty() {
                match self.store.delete(&node_path, None).await {
                    Ok(()) | Err(CoordError::NoNode(_)) | Err(CoordError::NotEmpty(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Ok(report)
    }

    /// End the ledger session, releasing every lease it holds.
    pub async fn close(&self) -> Result<(), LedgerError> {
        self.store.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryStore;
    use crate::ledger::activity::MemorySink;

    fn node(s: &str) -> NodeIdentity {
        NodeIdentity::new(s).unwrap()
    }

    fn entry(node_id: &str, block: i64) -> BlockReplicaEntry {
        BlockReplicaEntry::new(
            "/data/secret.csv",
            BlockId::new(block),
            node(node_id),
            format!("/dn/current/blk_{}", block),
            unix_now(),
        )
    }

    fn ledger() -> (ShredLedger, InMemoryStore, Arc<MemorySink>) {
        let store = InMemoryStore::new();
        let sink = Arc::new(MemorySink::new());
        let ledger = ShredLedger::new(Arc::new(store.clone()), sink.clone());
        (ledger, store, sink)
    }

    #[tokio::test]
    async fn test_create_entry_path_layout() {
        let (ledger, store, sink) = ledger();
        let e = entry("dn-01", 42);
        assert!(ledger.create_entry(&e).await.unwrap().is_created());

        assert!(store.paths().contains(&"/shred/dn-01/blk_42".to_string()));
        let loaded = ledger.load(&e.id()).await.unwrap().unwrap();
        assert_eq!(loaded.value.state, ShredState::Registered);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].from, None);
        assert_eq!(records[0].to, ShredState::Registered);
    }

    #[tokio::test]
    async fn test_create_entry_idempotent() {
        let (ledger, store, _) = ledger();
        let e = entry("dn-01", 42);
        ledger.create_entry(&e).await.unwrap();
        let writes = store.write_count();

        let again = ledger.create_entry(&e).await.unwrap();
        assert!(matches!(again, CreateOutcome::Unchanged(_)));
        assert_eq!(store.write_count(), writes, "no mutation on re-register");
    }

    #[tokio::test]
    async fn test_create_entry_conflicting_assignment() {
        let (ledger, _, _) = ledger();
        ledger.create_entry(&entry("dn-01", 42)).await.unwrap();

        let mut other = entry("dn-01", 42);
        other.file_path = "/data/other.csv".into();
        let err = ledger.create_entry(&other).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_transition_checks_precondition() {
        let (ledger, _, _) = ledger();
        let e = entry("dn-01", 1);
        ledger.create_entry(&e).await.unwrap();

        let err = ledger
            .transition(&e.id(), ShredState::PendingShred, ShredState::Staged, Actor::Worker, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::PreconditionFailed {
                expected: ShredState::PendingShred,
                actual: ShredState::Registered,
                ..
            }
        ));
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_transition_rejects_forbidden_move() {
        let (ledger, _, _) = ledger();
        let e = entry("dn-01", 1);
        ledger.create_entry(&e).await.unwrap();

        let err = ledger
            .transition(&e.id(), ShredState::Registered, ShredState::PendingShred, Actor::Worker, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Transition(_)));
    }

    #[tokio::test]
    async fn test_transition_applies_update_and_logs() {
        let (ledger, _, sink) = ledger();
        let e = entry("dn-01", 1);
        ledger.create_entry(&e).await.unwrap();

        let next = ledger
            .transition(&e.id(), ShredState::Registered, ShredState::PendingShred, Actor::Initiator, |e| {
                e.attempt_count = 0;
            })
            .await
            .unwrap();
        assert_eq!(next.state, ShredState::PendingShred);

        let records = sink.records();
        assert_eq!(records.last().unwrap().from, Some(ShredState::Registered));
        assert_eq!(records.last().unwrap().to, ShredState::PendingShred);
    }

    #[tokio::test]
    async fn test_racing_transitions_only_one_wins() {
        let (ledger, store, _) = ledger();
        let e = entry("dn-01", 1);
        ledger.create_entry(&e).await.unwrap();
        ledger
            .transition(&e.id(), ShredState::Registered, ShredState::PendingShred, Actor::Initiator, |_| {})
            .await
            .unwrap();

        let second = ShredLedger::new(Arc::new(store.session()), Arc::new(MemorySink::new()));
        let id = e.id();
        let (a, b) = tokio::join!(
            ledger.transition(&id, ShredState::PendingShred, ShredState::Staged, Actor::Worker, |_| {}),
            second.transition(&id, ShredState::PendingShred, ShredState::Staged, Actor::Worker, |_| {}),
        );
        assert_eq!(
            [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(),
            1,
            "exactly one runner stages the entry"
        );
    }

    #[tokio::test]
    async fn test_record_attempt_failure_until_ceiling() {
        let (ledger, _, _) = ledger();
        let e = entry("dn-01", 1);
        ledger.create_entry(&e).await.unwrap();
        let id = e.id();
        ledger
            .transition(&id, ShredState::Registered, ShredState::PendingShred, Actor::Initiator, |_| {})
            .await
            .unwrap();

        let policy = RetryPolicy::new(3, Duration::ZERO);
        for expected_attempts in 1..3 {
            let outcome = ledger
                .record_attempt_failure(&id, ShredState::PendingShred, Actor::Worker, ErrorClass::TransientIo, "busy", &policy)
                .await
                .unwrap();
            assert!(matches!(outcome, AttemptOutcome::Retrying { attempts, .. } if attempts == expected_attempts));
        }

        let outcome = ledger
            .record_attempt_failure(&id, ShredState::PendingShred, Actor::Worker, ErrorClass::TransientIo, "busy", &policy)
            .await
            .unwrap();
        match outcome {
            AttemptOutcome::Failed(entry) => {
                assert_eq!(entry.state, ShredState::Failed);
                assert_eq!(entry.attempt_count, 3);
                assert_eq!(entry.last_error.unwrap().class, ErrorClass::TransientIo);
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rearm_keeps_attempts_and_resets_budget() {
        let (ledger, _, _) = ledger();
        let e = entry("dn-01", 1);
        ledger.create_entry(&e).await.unwrap();
        let id = e.id();
        ledger
            .fail(&id, ShredState::Registered, Actor::Initiator, ErrorClass::DataInconsistency, "gone")
            .await
            .unwrap();

        let rearmed = ledger.rearm(&id).await.unwrap();
        assert_eq!(rearmed.state, ShredState::PendingShred);
        assert_eq!(rearmed.attempt_count, 1);
        assert_eq!(rearmed.attempt_floor, 1);
        assert_eq!(rearmed.attempts_this_arm(), 0);
        assert_eq!(rearmed.rearm_count, 1);

        // Re-arm only applies to FAILED
        assert!(ledger.rearm(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_abandon() {
        let (ledger, _, _) = ledger();
        let e = entry("dn-01", 1);
        ledger.create_entry(&e).await.unwrap();
        ledger
            .fail(&e.id(), ShredState::Registered, Actor::Initiator, ErrorClass::DataInconsistency, "x")
            .await
            .unwrap();
        let abandoned = ledger.abandon(&e.id()).await.unwrap();
        assert_eq!(abandoned.state, ShredState::Abandoned);
    }

    #[tokio::test]
    async fn test_list_by_state_and_file() {
        let (ledger, _, _) = ledger();
        for block in 1..=3 {
            ledger.create_entry(&entry("dn-01", block)).await.unwrap();
        }
        ledger.create_entry(&entry("dn-02", 1)).await.unwrap();
        ledger
            .transition(&entry("dn-01", 2).id(), ShredState::Registered, ShredState::PendingShred, Actor::Initiator, |_| {})
            .await
            .unwrap();

        let pending = ledger.list_by_state(&node("dn-01"), ShredState::PendingShred).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].block_id, BlockId::new(2));

        assert_eq!(ledger.list_by_file("/data/secret.csv").await.unwrap().len(), 4);
        assert!(ledger.list_by_file("/data/none").await.unwrap().is_empty());
        assert_eq!(ledger.nodes().await.unwrap(), vec![node("dn-01"), node("dn-02")]);
    }

    #[tokio::test]
    async fn test_list_skips_corrupt_entries() {
        let (ledger, store, _) = ledger();
        ledger.create_entry(&entry("dn-01", 1)).await.unwrap();
        store
            .create("/shred/dn-01/blk_2", b"garbage", CreateMode::Persistent)
            .await
            .unwrap();

        let entries = ledger.list_node(&node("dn-01")).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_list_orphaned() {
        let (ledger, _, _) = ledger();
        ledger.create_entry(&entry("dn-01", 1)).await.unwrap();
        let now = unix_now();

        assert!(ledger
            .list_orphaned(Duration::from_secs(3600), now)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            ledger
                .list_orphaned(Duration::from_secs(3600), now + 7200)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_lease_lifecycle() {
        let (ledger, store, _) = ledger();
        let e = entry("dn-01", 1);
        ledger.create_entry(&e).await.unwrap();
        let id = e.id();

        let other = ShredLedger::new(Arc::new(store.session()), Arc::new(MemorySink::new()));
        assert!(other.acquire_lease(&id, "run-a").await.unwrap());
        assert!(!ledger.acquire_lease(&id, "run-b").await.unwrap());
        assert_eq!(ledger.lease_holder(&id).await.unwrap().as_deref(), Some("run-a"));

        // Crash of the holder's session frees the lease
        other.close().await.unwrap();
        assert_eq!(ledger.lease_holder(&id).await.unwrap(), None);
        assert!(ledger.acquire_lease(&id, "run-b").await.unwrap());
        ledger.release_lease(&id).await.unwrap();
        ledger.release_lease(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_garbage_collection_only_terminal() {
        let (ledger, store, _) = ledger();
        let keep = entry("dn-01", 1);
        let drop = entry("dn-01", 2);
        ledger.create_entry(&keep).await.unwrap();
        ledger.create_entry(&drop).await.unwrap();
        ledger
            .fail(&drop.id(), ShredState::Registered, Actor::Initiator, ErrorClass::DataInconsistency, "x")
            .await
            .unwrap();
        ledger.abandon(&drop.id()).await.unwrap();

        let retention = Duration::from_secs(60);
        // Too recent
        let report = ledger.collect_garbage(retention, unix_now()).await.unwrap();
        assert_eq!(report.removed, 0);

        let report = ledger
            .collect_garbage(retention, unix_now() + 120)
            .await
            .unwrap();
        assert_eq!(report.removed, 1);
        assert!(ledger.load(&drop.id()).await.unwrap().is_none());
        assert!(ledger.load(&keep.id()).await.unwrap().is_some());
        assert!(store.paths().contains(&"/shred/dn-01".to_string()));
    }

    #[tokio::test]
    async fn test_transient_store_error() {
        let (ledger, store, _) = ledger();
        store.set_unavailable(true);
        let err = ledger.create_entry(&entry("dn-01", 1)).await.unwrap_err();
        assert!(err.is_transient());
    }
}
