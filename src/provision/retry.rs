use crate::config::Config;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;

/// How often, and how patiently, a failed attempt is restarted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries until the user succeeds
    pub max_retries: Option<u32>,
    /// Delay before the first retry; doubles on every retry after that
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: None,
            backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for RetryPolicy {
    fn from(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
            max_backoff: Duration::from_millis(config.retry_backoff_max_ms),
        }
    }
}

impl RetryPolicy {
    /// Retry forever with no delay
    pub fn immediate() -> Self {
        Self {
            max_retries: None,
            backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn allows(&self, retries_used: u32) -> bool {
        self.max_retries.map_or(true, |max| retries_used < max)
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay(&self, retry: u32) -> Duration {
        if retry == 0 || self.backoff.is_zero() {
            return Duration::ZERO;
        }
        // from_millis(2) yields 2, 4, 8...; scaled by the base and halved
        let factor = self.backoff.as_millis().min(u64::MAX as u128) as u64;
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .nth(retry as usize - 1)
            .map(|d| d / 2)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}
