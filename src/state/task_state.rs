/// Task state definitions for tracking crawl progress
///
/// This module defines all possible states a task can be in while a worker
/// owns it, and the transitions the error policy is allowed to make.
use crate::CrawlError;
use std::fmt;

/// Represents the current state of a task in the crawl process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    // ===== Active States =====
    /// Task has been generated but not yet picked up by a worker
    Pending,

    /// Task is executing on a context (reset, replay, extract, list)
    Running,

    /// Last attempt failed transiently; task is re-enqueued unmodified
    Retrying,

    // ===== Terminal States =====
    /// Task completed; its children (if any) have been generated
    Succeeded,

    /// Retry budget exhausted or non-retryable failure; subtree dropped
    Abandoned,

    /// Subtree already finished in a previous run
    Skipped,
}

impl TaskState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Abandoned | Self::Skipped)
    }

    /// Returns true if moving from `self` to `to` is allowed
    pub fn can_transition_to(&self, to: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Pending, Skipped)
                | (Running, Succeeded)
                | (Running, Retrying)
                | (Running, Abandoned)
                | (Retrying, Running)
        )
    }

    /// Moves to `to`, rejecting transitions the policy never makes
    pub fn transition(self, to: TaskState) -> Result<TaskState, CrawlError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(CrawlError::InvalidTransition { from: self, to })
        }
    }

    /// Short string representation used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Succeeded => "succeeded",
            Self::Abandoned => "abandoned",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
