// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Dead-letter entry data structure.
//!
//! A [`DlqEntry`] is created the first time a unit of work fails and carries
//! its full retry history until it recovers or is purged.
//!
//! # Example
//!
//! ```
//! use dlq_engine::{DlqEntry, EntryStatus, ErrorInfo, FailedTask};
//! use serde_json::json;
//!
//! let task = FailedTask::new("render-42", json!({"page": 3}));
//! let entry = DlqEntry::new(
//!     "entry-1".into(),
//!     task,
//!     ErrorInfo::new("upstream timed out").with_code("TIMEOUT"),
//!     1_000,  // now
//!     5_000,  // retry delay
//!     60_000, // retention
//! );
//!
//! assert_eq!(entry.status, EntryStatus::PendingRetry);
//! assert_eq!(entry.next_retry_at, Some(6_000));
//! assert_eq!(entry.error_history.len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::offset_millis;

/// Lifecycle status of a dead-letter entry.
///
/// ```text
/// PendingRetry → Retrying → Recovered | PendingRetry | PermanentFailure
/// PendingRetry → Quarantined → PendingRetry (explicit release)
/// PendingRetry → Skipped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    PendingRetry,
    Retrying,
    Recovered,
    PermanentFailure,
    Quarantined,
    Skipped,
}

impl EntryStatus {
    pub const ALL: [EntryStatus; 6] = [
        Self::PendingRetry,
        Self::Retrying,
        Self::Recovered,
        Self::PermanentFailure,
        Self::Quarantined,
        Self::Skipped,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingRetry => "pending_retry",
            Self::Retrying => "retrying",
            Self::Recovered => "recovered",
            Self::PermanentFailure => "permanent_failure",
            Self::Quarantined => "quarantined",
            Self::Skipped => "skipped",
        }
    }

    /// No automatic transition leaves this status.
    ///
    /// Quarantined entries can still be released by hand.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::PendingRetry | Self::Retrying)
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reported failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), code: None }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// The unit of work that failed. The payload is opaque to the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedTask {
    pub task_id: String,
    pub payload: Value,
}

impl FailedTask {
    pub fn new(task_id: impl Into<String>, payload: Value) -> Self {
        Self { task_id: task_id.into(), payload }
    }
}

/// One failure in an entry's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Epoch millis
    pub timestamp: i64,
    /// 0 for the failure that created the entry, then one per failed retry
    pub attempt: u32,
}

/// A failed unit of work and its retry history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEntry {
    pub id: String,
    pub task: FailedTask,
    /// Most recent error
    pub error: ErrorInfo,
    /// Failed retry attempts so far (never decreases)
    pub retry_count: u32,
    pub first_failed_at: i64,
    pub last_failed_at: i64,
    pub last_attempt_at: i64,
    /// Absent once the entry stops being scheduled
    pub next_retry_at: Option<i64>,
    pub expires_at: i64,
    pub quarantined_at: Option<i64>,
    /// Append-only, oldest first
    pub error_history: Vec<ErrorRecord>,
    pub status: EntryStatus,
    pub is_poison_pill: bool,
    pub error_similarity_score: Option<f64>,
    pub poison_pill_reason: Option<String>,
}

impl DlqEntry {
    /// Build the entry for a first observed failure.
    pub fn new(
        id: String,
        task: FailedTask,
        error: ErrorInfo,
        now: i64,
        retry_delay_ms: u64,
        retention_ms: u64,
    ) -> Self {
        let first = ErrorRecord {
            message: error.message.clone(),
            code: error.code.clone(),
            timestamp: now,
            attempt: 0,
        };

        Self {
            id,
            task,
            error,
            retry_count: 0,
            first_failed_at: now,
            last_failed_at: now,
            last_attempt_at: now,
            next_retry_at: Some(offset_millis(now, retry_delay_ms)),
            expires_at: offset_millis(now, retention_ms),
            quarantined_at: None,
            error_history: vec![first],
            status: EntryStatus::PendingRetry,
            is_poison_pill: false,
            error_similarity_score: None,
            poison_pill_reason: None,
        }
    }

    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task.task_id
    }

    /// Register a failed retry: bumps the counter and appends to the history.
    pub(crate) fn record_failure(&mut self, error: ErrorInfo, now: i64) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_attempt_at = now;
        self.last_failed_at = now;
        self.error_history.push(ErrorRecord {
            message: error.message.clone(),
            code: error.code.clone(),
            timestamp: now,
            attempt: self.retry_count,
        });
        self.error = error;
    }

    /// The last `n` error messages, oldest first.
    #[must_use]
    pub fn recent_error_messages(&self, n: usize) -> Vec<&str> {
        let start = self.error_history.len().saturating_sub(n);
        self.error_history[start..]
            .iter()
            .map(|record| record.message.as_str())
            .collect()
    }

    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry() -> DlqEntry {
        DlqEntry::new(
            "e1".into(),
            FailedTask::new("t1", json!({"n": 1})),
            ErrorInfo::new("boom"),
            10_000,
            5_000,
            60_000,
        )
    }

    #[test]
    fn test_new_entry_schedule() {
        let e = entry();
        assert_eq!(e.retry_count, 0);
        assert_eq!(e.first_failed_at, 10_000);
        assert_eq!(e.last_attempt_at, 10_000);
        assert_eq!(e.next_retry_at, Some(15_000));
        assert_eq!(e.expires_at, 70_000);
        assert!(!e.is_poison_pill);
        assert_eq!(e.error_history[0].attempt, 0);
        assert_eq!(e.task_id(), "t1");
    }

    #[test]
    fn test_record_failure_keeps_history_in_step_with_count() {
        let mut e = entry();
        e.record_failure(ErrorInfo::new("second").with_code("E2"), 11_000);
        e.record_failure(ErrorInfo::new("third"), 12_000);

        assert_eq!(e.retry_count, 2);
        assert_eq!(e.error_history.len(), e.retry_count as usize + 1);
        assert_eq!(e.error_history[1].attempt, 1);
        assert_eq!(e.error_history[1].code.as_deref(), Some("E2"));
        assert_eq!(e.error_history[2].attempt, 2);
        assert_eq!(e.last_failed_at, 12_000);
        assert_eq!(e.first_failed_at, 10_000);
        assert_eq!(e.error.message, "third");
    }

    #[test]
    fn test_recent_error_messages() {
        let mut e = entry();
        e.record_failure(ErrorInfo::new("b"), 1);
        e.record_failure(ErrorInfo::new("c"), 2);

        assert_eq!(e.recent_error_messages(2), vec!["b", "c"]);
        assert_eq!(e.recent_error_messages(10), vec!["boom", "b", "c"]);
        assert!(e.recent_error_messages(0).is_empty());
    }

    #[test]
    fn test_status_terminal() {
        assert!(!EntryStatus::PendingRetry.is_terminal());
        assert!(!EntryStatus::Retrying.is_terminal());
        assert!(EntryStatus::Recovered.is_terminal());
        assert!(EntryStatus::PermanentFailure.is_terminal());
        assert!(EntryStatus::Quarantined.is_terminal());
        assert!(EntryStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&EntryStatus::PermanentFailure).unwrap();
        assert_eq!(json, "\"permanent_failure\"");
        for status in EntryStatus::ALL {
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status)
            );
        }
    }

    #[test]
    fn test_error_info_display() {
        assert_eq!(ErrorInfo::new("x").to_string(), "x");
        assert_eq!(ErrorInfo::new("x").with_code("C").to_string(), "[C] x");
    }
}
