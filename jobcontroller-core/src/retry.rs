use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy for transient transport errors (queue, HTTP API, registry).
///
/// The source's own retry loops use `while attempt <= max_attempts` with
/// `max_attempts = 3`, which performs the initial attempt plus three
/// retries (four attempts total). `RetryPolicy` keeps that behaviour but
/// makes it an explicit field rather than an off-by-one accident.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of retries attempted after the first try (so total attempts
    /// made is `max_retries + 1`).
    pub max_retries: u32,
    /// Base sleep added to the attempt number between retries, in seconds:
    /// `base_delay_secs + attempt`.
    pub base_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            base_delay_secs: 3,
        }
    }
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.base_delay_secs + attempt as u64)
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_allows_four_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.total_attempts(), 4);
    }

    #[test]
    fn delay_grows_with_attempt_number() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(6));
    }
}
