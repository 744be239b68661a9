//! Per-task error policy
//!
//! Decides what happens to a task after a failed attempt. Transient driver
//! failures and timeouts are retried with identical inputs until the retry
//! budget is spent; anything else abandons the task immediately.

use crate::config::CrawlerConfig;
use crate::state::TaskState;
use crate::CrawlError;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,

    /// Budget for one attempt
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, timeout: Duration) -> Self {
        Self {
            max_retries,
            timeout,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.max_retries, config.task_timeout())
    }

    /// Total attempts a task may use
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether `error` may go away on an identical retry
    pub fn is_retryable(error: &CrawlError) -> bool {
        match error {
            CrawlError::Driver(e) => e.is_transient(),
            CrawlError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// State a running task moves to after attempt number `attempt` (1-based)
    /// failed with `error`
    pub fn after_failure(&self, attempt: u32, error: &CrawlError) -> TaskState {
        if Self::is_retryable(error) && attempt < self.max_attempts() {
            TaskState::Retrying
        } else {
            TaskState::Abandoned
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}
