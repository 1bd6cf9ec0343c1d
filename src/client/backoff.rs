//! Reconnect delay schedule.

use std::time::Duration;

/// Exponential backoff: `min(base * 2^attempt, max)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Delay before the reconnect that follows `attempt` failures.
    ///
    /// Pure. Large attempt counts saturate at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Attempt counter for one reconnect sequence.
///
/// There is no attempt ceiling; retries continue until the owner stops
/// scheduling them.
#[derive(Clone, Debug, Default)]
pub struct ReconnectionState {
    policy: BackoffPolicy,
    attempt_count: u32,
}

impl ReconnectionState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt_count: 0,
        }
    }

    /// Delay for the current attempt, then count it.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay_for(self.attempt_count);
        self.attempt_count = self.attempt_count.saturating_add(1);
        delay
    }

    /// Delay the next call to `next_delay` would return.
    pub fn peek_delay(&self) -> Duration {
        self.policy.delay_for(self.attempt_count)
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Zero the counter. Called once per established connection.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}
