//! Entry API: add, query, remove, release, stats.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entry::{DlqEntry, EntryStatus, ErrorInfo, FailedTask};
use crate::events::{DlqEvent, EventObserver};
use crate::poison_pill;

use super::retry_pass::finalize_permanent_failure;
use super::{DeadLetterQueue, DlqStats};

impl DeadLetterQueue {
    /// Record the first failure of a task.
    ///
    /// The entry is scheduled `retry_delay_ms` from now and written to the
    /// store when one is configured.
    #[tracing::instrument(skip(self, task, error), fields(task_id = %task.task_id))]
    pub async fn add(&self, task: FailedTask, error: ErrorInfo) -> DlqEntry {
        let entry = DlqEntry::new(
            Uuid::new_v4().to_string(),
            task,
            error,
            self.now(),
            self.config.retry_delay_ms,
            self.config.permanent_failure_retention_ms,
        );

        info!(
            entry_id = %entry.id,
            error = %entry.error,
            next_retry_at = ?entry.next_retry_at,
            "Task added to dead-letter queue"
        );

        self.insert_entry(entry.clone());
        self.persist(&entry).await;
        crate::metrics::record_entry_added();
        entry
    }

    #[must_use]
    pub fn get(&self, entry_id: &str) -> Option<DlqEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    /// Most recent entry for a task.
    #[must_use]
    pub fn get_by_task_id(&self, task_id: &str) -> Option<DlqEntry> {
        let entry_id = self.task_index.get(task_id)?.value().clone();
        self.get(&entry_id)
    }

    /// All entries, oldest failure first.
    #[must_use]
    pub fn entries(&self) -> Vec<DlqEntry> {
        let mut all: Vec<DlqEntry> = self.entries.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| {
            a.first_failed_at
                .cmp(&b.first_failed_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        all
    }

    #[must_use]
    pub fn entries_with_status(&self, status: EntryStatus) -> Vec<DlqEntry> {
        let mut matching = self.entries();
        matching.retain(|entry| entry.status == status);
        matching
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop an entry from memory and storage.
    pub async fn remove(&self, entry_id: &str) -> bool {
        if self.forget_entry(entry_id).is_none() {
            return false;
        }
        self.unpersist(entry_id).await;
        debug!(entry_id = %entry_id, "Removed dead-letter entry");
        true
    }

    /// Drop every entry. Returns how many were removed.
    pub async fn clear(&self) -> usize {
        let ids: Vec<String> = self.entries.iter().map(|r| r.key().clone()).collect();
        for id in &ids {
            self.forget_entry(id);
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.delete_batch(&ids).await {
                warn!(count = ids.len(), error = %e, "Failed to clear DLQ entries from storage");
                crate::metrics::record_storage_error("delete");
            }
        }

        info!(count = ids.len(), "Cleared dead-letter queue");
        ids.len()
    }

    /// Put a quarantined entry back on the retry schedule.
    ///
    /// Returns `false` and changes nothing unless the entry is quarantined.
    /// A released entry with no retries left is finalized as a permanent
    /// failure rather than left pending forever.
    pub async fn release_from_quarantine(&self, entry_id: &str) -> bool {
        let now = self.now();
        let delay = self.config.retry_delay_ms;
        let backoff = self.backoff;
        let Some((released, snapshot)) = self.update_entry(entry_id, |entry| {
            if !poison_pill::release(entry, now, delay) {
                return None;
            }
            let exhausted = backoff.is_exhausted(entry.retry_count);
            if exhausted {
                finalize_permanent_failure(entry);
            }
            Some(exhausted)
        }) else {
            return false;
        };

        let Some(exhausted) = released else {
            debug!(entry_id = %entry_id, status = %snapshot.status, "Release ignored, entry is not quarantined");
            return false;
        };

        if exhausted {
            info!(entry_id = %entry_id, task_id = %snapshot.task.task_id, "Released entry has no retries left");
            self.persist(&snapshot).await;
            self.announce_permanent_failure(&snapshot);
            return true;
        }

        info!(
            entry_id = %entry_id,
            task_id = %snapshot.task.task_id,
            next_retry_at = ?snapshot.next_retry_at,
            "Released entry from quarantine"
        );
        self.persist(&snapshot).await;
        true
    }

    /// Counts per status plus recovery and poison-pill aggregates.
    #[must_use]
    pub fn get_stats(&self) -> DlqStats {
        let mut stats = DlqStats {
            recovered: self.recovered_total.load(Ordering::Relaxed) as usize,
            ..Default::default()
        };
        let mut similarity_sum = 0.0;

        for item in self.entries.iter() {
            let entry = item.value();
            stats.total_entries += 1;
            match entry.status {
                EntryStatus::PendingRetry => stats.pending_retry += 1,
                EntryStatus::Retrying => stats.retrying += 1,
                // Counted through recovered_total once removed
                EntryStatus::Recovered => {}
                EntryStatus::PermanentFailure => stats.permanent_failures += 1,
                EntryStatus::Quarantined => stats.quarantined += 1,
                EntryStatus::Skipped => stats.skipped += 1,
            }
            if entry.is_poison_pill {
                stats.poison_pills += 1;
                similarity_sum += entry.error_similarity_score.unwrap_or(0.0);
            }
        }

        let finished = stats.recovered + stats.permanent_failures;
        if finished > 0 {
            stats.recovery_rate = stats.recovered as f64 / finished as f64 * 100.0;
        }
        if stats.poison_pills > 0 {
            stats.average_poison_pill_similarity = similarity_sum / stats.poison_pills as f64;
        }
        stats
    }

    /// Register a synchronous observer.
    pub fn add_observer(&self, observer: Arc<dyn EventObserver>) {
        self.events.add_observer(observer);
    }

    /// Receive events asynchronously. Slow receivers may see `Lagged`.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DlqEvent> {
        self.events.subscribe()
    }
}
