//! Retry policy for fetch operations.
//!
//! Non-retryable categories (validation, conflicts, not-found,
//! ownership) surface immediately; transient failures back off
//! exponentially up to a delay cap.

use std::time::Duration;

/// Exponential backoff policy applied to retryable fetch failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Cap applied to every computed delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff delay before retry number `attempt` (0-based):
    /// `min(base * 2^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // Widen before shifting so large attempts saturate at the cap
        // instead of wrapping.
        let scaled = u128::from(self.base_delay_ms) << attempt.min(64);
        Duration::from_millis(scaled.min(u128::from(self.max_delay_ms)) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delay_sequence_matches_contract() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..6)
            .map(|attempt| policy.delay_for(attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000]);
    }

    #[test]
    fn delay_is_capped_for_large_attempts() {
        let policy = RetryPolicy::default();
        for attempt in [5, 6, 10, 32, 64, u32::MAX] {
            assert_eq!(policy.delay_for(attempt), Duration::from_millis(30_000));
        }
    }

    #[test]
    fn none_policy_has_no_retries() {
        assert_eq!(RetryPolicy::none().max_retries, 0);
    }
}
