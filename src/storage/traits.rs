use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::{DlqEntry, EntryStatus, ErrorInfo, ErrorRecord, FailedTask};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Entry not found: {0}")]
    NotFound(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The persisted form of a [`DlqEntry`].
///
/// Only the most recent error is kept, so an entry loaded back from storage
/// starts over with a single-record error history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub id: String,
    pub task: FailedTask,
    pub error: ErrorInfo,
    pub retry_count: u32,
    pub status: EntryStatus,
    pub first_failed_at: i64,
    pub last_failed_at: i64,
    pub last_attempt_at: i64,
    #[serde(default)]
    pub next_retry_at: Option<i64>,
    pub expires_at: i64,
    #[serde(default)]
    pub quarantined_at: Option<i64>,
    #[serde(default)]
    pub is_poison_pill: bool,
    #[serde(default)]
    pub error_similarity_score: Option<f64>,
    #[serde(default)]
    pub poison_pill_reason: Option<String>,
}

impl From<&DlqEntry> for StoredEntry {
    fn from(entry: &DlqEntry) -> Self {
        Self {
            id: entry.id.clone(),
            task: entry.task.clone(),
            error: entry.error.clone(),
            retry_count: entry.retry_count,
            status: entry.status,
            first_failed_at: entry.first_failed_at,
            last_failed_at: entry.last_failed_at,
            last_attempt_at: entry.last_attempt_at,
            next_retry_at: entry.next_retry_at,
            expires_at: entry.expires_at,
            quarantined_at: entry.quarantined_at,
            is_poison_pill: entry.is_poison_pill,
            error_similarity_score: entry.error_similarity_score,
            poison_pill_reason: entry.poison_pill_reason.clone(),
        }
    }
}

impl StoredEntry {
    /// Rebuild an in-memory entry from the last known failure.
    #[must_use]
    pub fn into_entry(self) -> DlqEntry {
        let last = ErrorRecord {
            message: self.error.message.clone(),
            code: self.error.code.clone(),
            timestamp: self.last_failed_at,
            attempt: self.retry_count,
        };

        DlqEntry {
            id: self.id,
            task: self.task,
            error: self.error,
            retry_count: self.retry_count,
            first_failed_at: self.first_failed_at,
            last_failed_at: self.last_failed_at,
            last_attempt_at: self.last_attempt_at,
            next_retry_at: self.next_retry_at,
            expires_at: self.expires_at,
            quarantined_at: self.quarantined_at,
            error_history: vec![last],
            status: self.status,
            is_poison_pill: self.is_poison_pill,
            error_similarity_score: self.error_similarity_score,
            poison_pill_reason: self.poison_pill_reason,
        }
    }
}

/// Persistence adapter for dead-letter entries.
///
/// The queue calls it best-effort: failures are logged and counted, and the
/// in-memory state stays authoritative for the running process.
#[async_trait]
pub trait DlqStore: Send + Sync {
    /// Insert or replace the record with the same id.
    async fn put(&self, entry: &StoredEntry) -> Result<(), StorageError>;

    /// Deleting a missing id is not an error.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;

    async fn list(&self) -> Result<Vec<StoredEntry>, StorageError>;

    /// Delete several records.
    /// Default implementation falls back to sequential deletes.
    async fn delete_batch(&self, ids: &[String]) -> Result<usize, StorageError> {
        for id in ids {
            self.delete(id).await?;
        }
        Ok(ids.len())
    }
}
