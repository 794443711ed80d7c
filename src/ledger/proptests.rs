//! Property-based tests for the ledger
//!
//! Tests for:
//! - Transition table: terminal absorption, monotone progress, actor rules
//! - Entry codec: arbitrary entries survive storage
//! - Retry policy: backoff bounds and budget

use super::codec::{decode_entry, encode_entry};
use super::entry::{BlockId, BlockReplicaEntry, NodeIdentity};
use super::retry::{RetryPolicy, MAX_BACKOFF_SECS};
use super::state::{is_allowed, Actor, ShredState};
use proptest::prelude::*;
use std::time::Duration;

fn any_state() -> impl Strategy<Value = ShredState> {
    prop::sample::select(ShredState::ALL.to_vec())
}

fn any_actor() -> impl Strategy<Value = Actor> {
    prop::sample::select(vec![Actor::Initiator, Actor::Worker, Actor::Operator])
}

// ============================================================================
// TRANSITION TABLE
// ============================================================================

proptest! {
    /// Property: Terminal states are absorbing
    #[test]
    fn terminal_states_never_left(to in any_state(), actor in any_actor()) {
        for from in [ShredState::Shredded, ShredState::Abandoned] {
            prop_assert!(!is_allowed(from, to, actor));
        }
    }

    /// Property: Progress is monotone except for the operator re-arm
    #[test]
    fn only_rearm_regresses(from in any_state(), to in any_state(), actor in any_actor()) {
        if is_allowed(from, to, actor) && to.rank() < from.rank() {
            prop_assert_eq!(from, ShredState::Failed);
            prop_assert_eq!(to, ShredState::PendingShred);
            prop_assert_eq!(actor, Actor::Operator);
        }
    }

    /// Property: Only the initiator leaves REGISTERED other than by failing
    #[test]
    fn registered_exits(to in any_state(), actor in any_actor()) {
        if is_allowed(ShredState::Registered, to, actor) && to != ShredState::Failed {
            prop_assert_eq!(to, ShredState::PendingShred);
            prop_assert_eq!(actor, Actor::Initiator);
        }
    }

    /// Property: Random walks never reach SHREDDED without passing STAGED
    #[test]
    fn shredded_requires_staging(steps in prop::collection::vec((any_state(), any_actor()), 1..30)) {
        let mut state = ShredState::Registered;
        let mut staged = false;
        for (to, actor) in steps {
            if is_allowed(state, to, actor) {
                if to == ShredState::Staged {
                    staged = true;
                }
                if to == ShredState::PendingShred {
                    staged = false;
                }
                state = to;
            }
        }
        if state == ShredState::Shredded {
            prop_assert!(staged);
        }
    }
}

// ============================================================================
// CODEC
// ============================================================================

proptest! {
    /// Property: Stored entries decode to the same entry
    #[test]
    fn codec_preserves_entries(
        block in any::<i64>(),
        node in "dn-[a-z0-9]{1,12}",
        file in "/[a-zA-Z0-9/_.-]{1,60}",
        state in any_state(),
        attempts in 0u32..100,
        created in 0u64..4_000_000_000,
    ) {
        let mut entry = BlockReplicaEntry::new(
            file,
            BlockId::new(block),
            NodeIdentity::new(node).unwrap(),
            format!("/dn/blk_{}", block),
            created,
        );
        entry.state = state;
        entry.attempt_count = attempts;

        let bytes = encode_entry(&entry).unwrap();
        prop_assert_eq!(decode_entry(&bytes).unwrap(), entry);
    }
}

// ============================================================================
// RETRY POLICY
// ============================================================================

proptest! {
    /// Property: Backoff never exceeds the cap plus jitter
    #[test]
    fn backoff_bounded(base_secs in 0u64..10_000, attempts in 0u32..1000) {
        let policy = RetryPolicy::new(5, Duration::from_secs(base_secs));
        let d = policy.backoff_with_jitter(attempts);
        prop_assert!(d.as_secs() <= MAX_BACKOFF_SECS + MAX_BACKOFF_SECS / 10);
    }

    /// Property: Backoff is non-decreasing in the attempt number
    #[test]
    fn backoff_monotone(base_secs in 0u64..600, attempts in 1u32..40) {
        let policy = RetryPolicy::new(5, Duration::from_secs(base_secs));
        prop_assert!(policy.backoff(attempts) <= policy.backoff(attempts + 1));
    }

    /// Property: The budget is exhausted exactly at the ceiling
    #[test]
    fn exhausted_at_ceiling(ceiling in 1u32..50) {
        let policy = RetryPolicy::new(ceiling, Duration::ZERO);
        prop_assert!(!policy.exhausted(ceiling - 1));
        prop_assert!(policy.exhausted(ceiling));
    }
}
