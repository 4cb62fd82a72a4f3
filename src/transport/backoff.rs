//! Reconnect backoff.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::config::ReconnectPolicy;

// ============================================================================
// Backoff
// ============================================================================

/// Attempt counter for [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    /// Creates a backoff at attempt 0.
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Returns the delay for the next attempt and advances the counter.
    ///
    /// Returns `None` once `max_attempts` reconnects have been scheduled.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        let delay = self.delay_for(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    /// Returns `base * 2^attempt`, capped at `max_delay`.
    pub(crate) fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.policy
            .base_delay
            .saturating_mul(factor)
            .min(self.policy.max_delay)
    }

    /// Resets the counter after a successful connect.
    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Returns the number of attempts scheduled since the last reset.
    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }
}

// ============================================================================
// Tests
// ============================================================================
