use std::time::Duration;

use crate::config::WebhookConfig;
use crate::domain::WebhookTask;

/// What to do with a task whose delivery just failed.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Re-insert `task` (counter already incremented) after `delay`.
    Retry { task: WebhookTask, delay: Duration },
    /// Retry budget exhausted.
    GiveUp(WebhookTask),
}

/// Linear backoff with a bounded number of retries.
///
/// A task failing with `retry_count = k` is retried as attempt `k + 1` after
/// `(k + 1) * unit`, unless `k >= max_retries`, in which case it is given up.
/// With the defaults (5 retries, 5 s unit) the delays are 5, 10, 15, 20, 25 s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, unit: Duration) -> Self {
        Self { max_retries, unit }
    }

    pub fn from_config(config: &WebhookConfig) -> Self {
        Self::new(config.max_retries, config.retry_unit())
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the `retry_count`-th retry. Saturates at `Duration::MAX`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        self.unit.saturating_mul(retry_count)
    }

    pub fn on_failure(&self, task: WebhookTask) -> RetryDecision {
        if task.retry_count >= self.max_retries {
            return RetryDecision::GiveUp(task);
        }

        let task = task.next_attempt();
        let delay = self.delay_for(task.retry_count);
        RetryDecision::Retry { task, delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&WebhookConfig::default())
    }
}
