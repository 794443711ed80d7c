//! Agent-level error taxonomy.
//!
//! Every failure an agent surfaces falls into one of four classes, and the
//! class decides what happens next:
//!
//! | Class | Handling |
//! |-------|----------|
//! | `TransientIo` | Left for the next scheduled invocation, with backoff |
//! | `ConcurrencyConflict` | Another runner owns the entry; skipped, not an error |
//! | `DataInconsistency` | Terminal for the entry; it moves to `FAILED` |
//! | `Configuration` | Fatal at startup; nothing runs |

use crate::agents::StagingError;
use crate::eraser::EraseError;
use crate::hdfs::LocateError;
use crate::ledger::{CodecError, LedgerError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Serializable error class recorded in an entry's `lastError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    TransientIo,
    ConcurrencyConflict,
    DataInconsistency,
    Configuration,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::TransientIo => "TransientIO",
            ErrorClass::ConcurrencyConflict => "ConcurrencyConflict",
            ErrorClass::DataInconsistency => "DataInconsistency",
            ErrorClass::Configuration => "ConfigurationError",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the initiator and worker agents.
#[derive(Debug, Error)]
pub enum ShredError {
    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    #[error("concurrent modification: {0}")]
    ConcurrencyConflict(String),

    #[error("data inconsistency: {0}")]
    DataInconsistency(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("not a regular file: {0}")]
    NotAFile(String),
}

impl ShredError {
    /// The taxonomy class of this error.
    ///
    /// `FileNotFound` and `NotAFile` are request errors raised before any
    /// ledger state exists; they classify as data inconsistencies.
    pub fn class(&self) -> ErrorClass {
        match self {
            ShredError::TransientIo(_) => ErrorClass::TransientIo,
            ShredError::ConcurrencyConflict(_) => ErrorClass::ConcurrencyConflict,
            ShredError::Configuration(_) => ErrorClass::Configuration,
            ShredError::DataInconsistency(_)
            | ShredError::FileNotFound(_)
            | ShredError::NotAFile(_) => ErrorClass::DataInconsistency,
        }
    }

    /// Whether a later invocation may succeed without operator action.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::TransientIo
    }
}

impl From<LedgerError> for ShredError {
    fn from(err: LedgerError) -> Self {
        if err.is_transient() {
            ShredError::TransientIo(err.to_string())
        } else if err.is_conflict() {
            ShredError::ConcurrencyConflict(err.to_string())
        } else {
            ShredError::DataInconsistency(err.to_string())
        }
    }
}

impl From<CodecError> for ShredError {
    fn from(err: CodecError) -> Self {
        ShredError::DataInconsistency(err.to_string())
    }
}

impl From<LocateError> for ShredError {
    fn from(err: LocateError) -> Self {
        match err {
            LocateError::FileNotFound(path) => ShredError::FileNotFound(path),
            LocateError::LocatorUnavailable(msg) => ShredError::TransientIo(msg),
        }
    }
}

impl From<StagingError> for ShredError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::SourceMissing(_) => ShredError::DataInconsistency(err.to_string()),
            StagingError::Io { .. } => ShredError::TransientIo(err.to_string()),
        }
    }
}

impl From<EraseError> for ShredError {
    fn from(err: EraseError) -> Self {
        match err {
            EraseError::PathNotFound(_) => ShredError::DataInconsistency(err.to_string()),
            EraseError::Io { .. } | EraseError::Failed { .. } => {
                ShredError::TransientIo(err.to_string())
            }
        }
    }
}
