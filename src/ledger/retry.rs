//! Retry budget and backoff for failed shred attempts.
//!
//! Workers never retry in a loop within one invocation. A failed attempt is
//! recorded on the entry together with the earliest time the next scheduled
//! invocation may try again:
//! - Backoff: base * 2^n, with up to 10% jitter
//! - Cap: 1 hour
//! - Budget: `ceiling` attempts per arm; the attempt that reaches the
//!   ceiling moves the entry to `FAILED`

use rand::Rng;
use std::time::Duration;

/// Maximum backoff duration (1 hour).
pub const MAX_BACKOFF_SECS: u64 = 3600;

/// Default retry ceiling per arm.
pub const DEFAULT_RETRY_CEILING: u32 = 5;

/// Retry budget and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed per arm before the entry fails.
    pub ceiling: u32,
    /// Backoff after the first failed attempt.
    pub base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_RETRY_CEILING,
            base: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(ceiling: u32, base: Duration) -> Self {
        Self { ceiling, base }
    }

    /// Whether an entry that has spent `attempts_this_arm` attempts has
    /// exhausted its budget.
    pub fn exhausted(&self, attempts_this_arm: u32) -> bool {
        attempts_this_arm >= self.ceiling
    }

    /// Backoff before the next attempt, after `failed_attempts` failures in
    /// this arm (1 for the first failure). Deterministic, without jitter.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(31);
        let secs = self
            .base
            .as_secs()
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(MAX_BACKOFF_SECS);
        Duration::from_secs(secs)
    }

    /// Backoff with up to 10% added jitter, so nodes that failed together do
    /// not retry in lockstep.
    pub fn backoff_with_jitter(&self, failed_attempts: u32) -> Duration {
        let backoff = self.backoff(failed_attempts);
        let max_jitter = backoff.as_secs() / 10;
        if max_jitter == 0 {
            return backoff;
        }
        let jitter = rand::thread_rng().gen_range(0..=max_jitter);
        backoff + Duration::from_secs(jitter)
    }
}
