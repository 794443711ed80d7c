//! The shred ledger.
//!
//! Durable record of every block replica that must be destroyed, and how far
//! destruction has progressed. Entries live in the coordination store; the
//! activity log records each transition for operators.

pub mod activity;
pub mod client;
pub mod codec;
pub mod entry;
pub mod retry;
pub mod state;

#[cfg(test)]
mod proptests;

pub use activity::{
    query_activity, read_activity_log, ActivityError, ActivityQuery, ActivityRecord,
    ActivitySink, JsonLinesSink, MemorySink,
};
pub use client::{
    AttemptOutcome, CreateOutcome, GcReport, LedgerError, ShredLedger, Versioned, DEFAULT_ROOT,
};
pub use codec::{decode_entry, encode_entry, CodecError};
pub use entry::{
    unix_now, BlockId, BlockReplicaEntry, EntryId, IdentifierError, LastError, NodeIdentity,
    StagingRecord, SCHEMA_VERSION,
};
pub use retry::{RetryPolicy, DEFAULT_RETRY_CEILING, MAX_BACKOFF_SECS};
pub use state::{is_allowed, Actor, ShredState, TransitionError};
