//! Delivery retry policy.

use std::time::Duration;

use crate::config::RetryConfig;

/// Bounded exponential backoff for webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Timeout applied to each request.
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    ///
    /// `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Whether a failed attempt may be followed by another.
    ///
    /// `status` is `None` for network failures and timeouts.
    #[must_use]
    pub fn should_retry(&self, status: Option<u16>, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        match status {
            None => true,
            // Client errors are permanent
            Some(code) => (500..600).contains(&code),
        }
    }
}
