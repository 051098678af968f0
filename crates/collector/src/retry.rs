//! Exponential backoff policy shared by the fetcher and broker reconnects

use crate::config::RetrySettings;
use std::time::Duration;

/// Upper bound for any single backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Bounded retry budget with exponential backoff
///
/// Attempts are 1-based. The delay after failed attempt `n` is
/// `min(max_delay, base_delay * 2^(n-1))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy; at least one attempt is always made
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: MAX_BACKOFF,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay to wait after failed attempt `attempt`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Total time slept before attempt `attempt` is made
    pub fn total_backoff_before(&self, attempt: u32) -> Duration {
        (1..attempt).map(|n| self.delay_for_attempt(n)).sum()
    }

    /// Whether another attempt may follow attempt `attempt`
    pub fn has_attempts_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(settings.max_retries, settings.delay())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_secs(2));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_secs(2));

        assert_eq!(policy.delay_for_attempt(6), MAX_BACKOFF);
        assert_eq!(policy.delay_for_attempt(40), MAX_BACKOFF);
        assert_eq!(policy.delay_for_attempt(u32::MAX), MAX_BACKOFF);
    }

    #[test]
    fn test_total_backoff_before_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2));

        assert_eq!(policy.total_backoff_before(1), Duration::ZERO);
        assert_eq!(policy.total_backoff_before(3), Duration::from_secs(6));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));

        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.has_attempts_after(1));
    }

    #[test]
    fn test_from_settings() {
        let policy = RetryPolicy::from(&RetrySettings {
            max_retries: 4,
            retry_delay_secs: 1,
        });

        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.base_delay(), Duration::from_secs(1));
        assert!(policy.has_attempts_after(3));
        assert!(!policy.has_attempts_after(4));
    }
}
