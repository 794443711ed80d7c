//! The two agents that advance the ledger.
//!
//! The initiator runs once per delete request on the client side; a worker
//! runs periodically on every storage node. They never talk to each other:
//! the ledger is their only rendezvous point.

pub mod initiator;
pub mod staging;
pub mod worker;

pub use initiator::{FileShredRequest, Initiator};
pub use staging::StagingError;
pub use worker::{BatchReport, Worker, WorkerSettings, DEFAULT_BATCH_SIZE, DEFAULT_STAGING_DIR};
