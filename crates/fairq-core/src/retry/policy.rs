use std::time::Duration;

use crate::config::{BackoffMode, SchedulerConfig};

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retries are exhausted; the task fails for good.
    GiveUp,
    /// Requeue the task; it becomes eligible after the given delay.
    RetryAfter(Duration),
}

/// Fixed or exponential backoff with a cap.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delay before the first retry (0 = requeue immediately).
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
    pub backoff: BackoffMode,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &SchedulerConfig) -> Self {
        let retry = cfg.retry.clone().unwrap_or_default();
        Self {
            base_delay: Duration::from_millis(cfg.retry_delay_ms),
            max_delay: Duration::from_millis(retry.max_delay_ms),
            backoff: retry.backoff,
        }
    }

    /// Requeue immediately, no backoff.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff: BackoffMode::Fixed,
        }
    }

    /// Decide what happens after a failure that brought the task to
    /// `retries` failed attempts. The task gives up once `retries` exceeds
    /// `max_retries`.
    pub fn decide(&self, retries: u32, max_retries: u32) -> RetryDecision {
        if retries > max_retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.delay_for(retries))
    }

    /// Backoff before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        match self.backoff {
            BackoffMode::Fixed => self.base_delay,
            BackoffMode::Exponential => {
                let exp = 1u32 << retry.saturating_sub(1).min(16);
                self.base_delay.saturating_mul(exp).min(self.max_delay)
            }
        }
    }
}
