//! Public types for the dead-letter queue coordinator.

use serde::Serialize;
use thiserror::Error;

use crate::config::{ConfigError, PoisonPillAction};
use crate::entry::EntryStatus;
use crate::executor::TaskResult;
use crate::storage::traits::StorageError;

/// Lifecycle state of the background retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlqState {
    /// Constructed, timer not started
    Created,
    /// Periodic retry pass is scheduled
    Running,
    /// Timer stopped by [`shutdown()`](super::DeadLetterQueue::shutdown)
    Stopped,
}

impl std::fmt::Display for DlqState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DlqError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("dead-letter entry not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("entry {entry_id} is {status}, only pending entries can be retried")]
    NotRetryable { entry_id: String, status: EntryStatus },
    #[error("retry loop is already running")]
    AlreadyRunning,
}

/// What happened to an entry after one retry.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    /// Executor succeeded; the entry has been removed
    Recovered(TaskResult),
    /// Failed again and scheduled for another attempt
    Rescheduled { retry_count: u32, next_retry_at: i64 },
    /// Failed again and was classified as a poison pill
    PoisonPill { action: PoisonPillAction, similarity: f64 },
    /// Out of retries
    PermanentFailure,
}

impl RetryOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recovered(_) => "recovered",
            Self::Rescheduled { .. } => "rescheduled",
            Self::PoisonPill { .. } => "poison_pill",
            Self::PermanentFailure => "permanent_failure",
        }
    }
}

/// Result of one retry pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryPassSummary {
    /// Entries picked up by the pass
    pub attempted: usize,
    pub recovered: usize,
    pub rescheduled: usize,
    pub poison_pills: usize,
    pub permanent_failures: usize,
    /// Entries that vanished mid-pass (removed or cleared by another caller)
    pub errors: usize,
}

impl RetryPassSummary {
    pub(super) fn record(&mut self, outcome: &RetryOutcome) {
        match outcome {
            RetryOutcome::Recovered(_) => self.recovered += 1,
            RetryOutcome::Rescheduled { .. } => self.rescheduled += 1,
            RetryOutcome::PoisonPill { .. } => self.poison_pills += 1,
            RetryOutcome::PermanentFailure => self.permanent_failures += 1,
        }
    }
}

/// Aggregate view of the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DlqStats {
    pub total_entries: usize,
    pub pending_retry: usize,
    pub retrying: usize,
    /// Cumulative: recovered entries leave the queue immediately
    pub recovered: usize,
    pub permanent_failures: usize,
    pub quarantined: usize,
    pub skipped: usize,
    pub poison_pills: usize,
    /// `recovered / (recovered + permanent_failures) × 100`, 0 when both are 0
    pub recovery_rate: f64,
    /// Mean similarity score over poison-pill entries, 0 when there are none
    pub average_poison_pill_similarity: f64,
}
