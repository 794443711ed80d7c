//! Shred lifecycle state machine.
//!
//! ## States
//!
//! | State | Meaning | Acted on by |
//! |-------|---------|-------------|
//! | **REGISTERED** | Entry written, file not yet deleted | Initiator |
//! | **PENDING_SHRED** | Logical delete confirmed, replica awaits destruction | Worker |
//! | **STAGED** | Worker holds a protected local copy | Worker |
//! | **SHREDDED** | Replica and staged copy destroyed (terminal) | nobody |
//! | **FAILED** | Retry budget spent or unrecoverable error | Operator |
//! | **ABANDONED** | Operator gave up on the entry (terminal) | nobody |
//!
//! ## Transition table
//!
//! ```text
//! REGISTERED    -> PENDING_SHRED   Initiator
//! PENDING_SHRED -> STAGED          Worker
//! STAGED        -> STAGED          Worker   (re-acquire after a crashed run)
//! STAGED        -> SHREDDED        Worker
//! non-terminal  -> FAILED          any
//! FAILED        -> PENDING_SHRED   Operator (re-arm; the only regression)
//! FAILED        -> ABANDONED       Operator
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle state of a block replica entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShredState {
    Registered,
    PendingShred,
    Staged,
    Shredded,
    Failed,
    Abandoned,
}

impl ShredState {
    /// Every state, in lifecycle order.
    pub const ALL: [ShredState; 6] = [
        ShredState::Registered,
        ShredState::PendingShred,
        ShredState::Staged,
        ShredState::Shredded,
        ShredState::Failed,
        ShredState::Abandoned,
    ];

    /// Terminal states are never left and are the only ones eligible for
    /// garbage collection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ShredState::Shredded | ShredState::Abandoned)
    }

    /// Wire name, as stored in the ledger and printed to operators.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShredState::Registered => "REGISTERED",
            ShredState::PendingShred => "PENDING_SHRED",
            ShredState::Staged => "STAGED",
            ShredState::Shredded => "SHREDDED",
            ShredState::Failed => "FAILED",
            ShredState::Abandoned => "ABANDONED",
        }
    }

    /// Position along the lifecycle. Every allowed transition except the
    /// operator re-arm moves to an equal or higher rank.
    pub fn rank(&self) -> u8 {
        match self {
            ShredState::Registered => 0,
            ShredState::PendingShred => 1,
            ShredState::Staged => 2,
            ShredState::Shredded | ShredState::Failed => 3,
            ShredState::Abandoned => 4,
        }
    }
}

impl fmt::Display for ShredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShredState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        ShredState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| format!("unknown state '{}'", s))
    }
}

/// Which agent is asking for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Initiator,
    Worker,
    Operator,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Actor::Initiator => "initiator",
            Actor::Worker => "worker",
            Actor::Operator => "operator",
        };
        f.write_str(name)
    }
}

/// A transition the table does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transition {from} -> {to} not allowed for {actor}")]
pub struct TransitionError {
    pub from: ShredState,
    pub to: ShredState,
    pub actor: Actor,
}

/// Whether `actor` may move an entry from `from` to `to`.
pub fn is_allowed(from: ShredState, to: ShredState, actor: Actor) -> bool {
    use ShredState::*;
    match (from, to) {
        (Registered, PendingShred) => actor == Actor::Initiator,
        (PendingShred, Staged) | (Staged, Staged) | (Staged, Shredded) => actor == Actor::Worker,
        (Registered | PendingShred | Staged, Failed) => true,
        (Failed, PendingShred) | (Failed, Abandoned) => actor == Actor::Operator,
        _ => false,
    }
}

/// [`is_allowed`] as a `Result`.
pub fn validate(from: ShredState, to: ShredState, actor: Actor) -> Result<(), TransitionError> {
    if is_allowed(from, to, actor) {
        Ok(())
    } else {
        Err(TransitionError { from, to, actor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ShredState::*;

    #[test]
    fn test_happy_path() {
        assert!(is_allowed(Registered, PendingShred, Actor::Initiator));
        assert!(is_allowed(PendingShred, Staged, Actor::Worker));
        assert!(is_allowed(Staged, Shredded, Actor::Worker));
    }

    #[test]
    fn test_wrong_actor_rejected() {
        assert!(!is_allowed(Registered, PendingShred, Actor::Worker));
        assert!(!is_allowed(PendingShred, Staged, Actor::Initiator));
        assert!(!is_allowed(Failed, PendingShred, Actor::Worker));
        assert!(!is_allowed(Failed, Abandoned, Actor::Initiator));
    }

    #[test]
    fn test_workers_never_touch_registered() {
        assert!(!is_allowed(Registered, Staged, Actor::Worker));
        assert!(!is_allowed(Registered, Shredded, Actor::Worker));
    }

    #[test]
    fn test_skipping_staging_rejected() {
        assert!(!is_allowed(PendingShred, Shredded, Actor::Worker));
    }

    #[test]
    fn test_failure_from_every_live_state() {
        for from in [Registered, PendingShred, Staged] {
            for actor in [Actor::Initiator, Actor::Worker, Actor::Operator] {
                assert!(is_allowed(from, Failed, actor));
            }
        }
    }

    #[test]
    fn test_terminal_states_absorb() {
        for from in [Shredded, Abandoned] {
            for to in ShredState::ALL {
                for actor in [Actor::Initiator, Actor::Worker, Actor::Operator] {
                    assert!(!is_allowed(from, to, actor), "{from} -> {to} by {actor}");
                }
            }
        }
    }

    #[test]
    fn test_operator_review_of_failed() {
        assert!(is_allowed(Failed, PendingShred, Actor::Operator));
        assert!(is_allowed(Failed, Abandoned, Actor::Operator));
        assert!(!is_allowed(Failed, Failed, Actor::Operator));
        assert!(!is_allowed(Failed, Shredded, Actor::Operator));
    }

    #[test]
    fn test_validate_error_message() {
        let err = validate(Shredded, Failed, Actor::Worker).unwrap_err();
        assert_eq!(
            err.to_string(),
            "transition SHREDDED -> FAILED not allowed for worker"
        );
    }

    #[test]
    fn test_state_parse() {
        assert_eq!("pending_shred".parse::<ShredState>(), Ok(PendingShred));
        assert_eq!("pending-shred".parse::<ShredState>(), Ok(PendingShred));
        assert_eq!("SHREDDED".parse::<ShredState>(), Ok(Shredded));
        assert!("gone".parse::<ShredState>().is_err());
    }

    #[test]
    fn test_terminal_classification() {
        assert!(Shredded.is_terminal());
        assert!(Abandoned.is_terminal());
        assert!(!Failed.is_terminal());
        assert!(!Staged.is_terminal());
    }
}
