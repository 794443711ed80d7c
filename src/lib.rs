//! blockshred - secure physical deletion of HDFS blocks
//!
//! Removing a file from HDFS only unlinks its block replicas; the bytes stay
//! on the storage node disks until overwritten. blockshred tracks every
//! replica of a deleted file in a shared ledger and has a worker on each
//! storage node overwrite them in place.
//!
//! Key principles:
//! - The ledger is the only shared state; agents never talk to each other
//! - Every step is idempotent and resumable after a crash
//! - No replica is destroyed before a verified staged copy exists
//! - Shredding runs in bounded batches started by an external scheduler
//!
//! Lifecycle of one entry:
//!
//! ```text
//! REGISTERED -> PENDING_SHRED -> STAGED -> SHREDDED
//!                    \             \
//!                     +-> FAILED <-+--> (re-arm) PENDING_SHRED
//!                           \
//!                            +-> ABANDONED
//! ```

pub mod agents;
pub mod coordination;
pub mod eraser;
pub mod error;
pub mod hdfs;
pub mod ledger;
