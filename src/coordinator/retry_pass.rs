// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The retry path: eligibility, the single-flight pass, per-entry retries
//! and failure bookkeeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::clock::offset_millis;
use crate::config::PoisonPillAction;
use crate::entry::{DlqEntry, EntryStatus, ErrorInfo, FailedTask};
use crate::events::{panic_message, DlqEventKind};
use crate::executor::{ExecutorError, TaskResult};

use super::{DeadLetterQueue, DlqError, RetryOutcome, RetryPassSummary};

/// Held for the duration of a retry pass; releases the flag on every exit path.
struct PassGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// How a failed attempt was resolved, decided under the entry lock.
enum FailureResolution {
    Rescheduled { next_retry_at: i64, delay_ms: u64 },
    PoisonPill,
    PermanentFailure,
}

pub(super) fn finalize_permanent_failure(entry: &mut DlqEntry) {
    entry.status = EntryStatus::PermanentFailure;
    entry.next_retry_at = None;
}

impl DeadLetterQueue {
    /// Entries the retry pass may pick up right now, soonest due first.
    ///
    /// Pending, not a poison pill, retries left, and due.
    #[must_use]
    pub fn get_retryable_entries(&self) -> Vec<DlqEntry> {
        let now = self.now();
        let mut due: Vec<DlqEntry> = self
            .entries
            .iter()
            .filter(|r| self.backoff.is_eligible(r.value(), now))
            .map(|r| r.value().clone())
            .collect();

        due.sort_by(|a, b| {
            a.next_retry_at
                .cmp(&b.next_retry_at)
                .then_with(|| a.first_failed_at.cmp(&b.first_failed_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        due
    }

    #[must_use]
    pub fn calculate_retry_delay(&self, retry_count: u32) -> u64 {
        self.backoff.calculate_retry_delay(retry_count)
    }

    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Retry every eligible entry, one at a time.
    ///
    /// Returns `None` without doing anything if another pass is running.
    /// Failures are recorded on their entries and never abort the pass.
    #[tracing::instrument(skip(self))]
    pub async fn process_retries(&self) -> Option<RetryPassSummary> {
        let Some(_guard) = PassGuard::acquire(&self.processing) else {
            debug!("Retry pass already in progress, dropping tick");
            crate::metrics::record_retry_pass_skipped();
            return None;
        };

        let started = Instant::now();
        let batch = self.get_retryable_entries();
        let mut summary = RetryPassSummary {
            attempted: batch.len(),
            ..Default::default()
        };

        if !batch.is_empty() {
            debug!(count = batch.len(), "Starting retry pass");
        }

        for entry in batch {
            match self.retry_entry(&entry.id).await {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => {
                    warn!(entry_id = %entry.id, error = %e, "Entry changed during retry pass, skipped");
                    crate::metrics::record_retry_attempt("error");
                    summary.errors += 1;
                }
            }
        }

        crate::metrics::record_retry_pass(summary.attempted, started.elapsed());
        crate::metrics::set_entry_counts(&self.get_stats());

        if summary.attempted > 0 {
            info!(
                attempted = summary.attempted,
                recovered = summary.recovered,
                rescheduled = summary.rescheduled,
                poison_pills = summary.poison_pills,
                permanent_failures = summary.permanent_failures,
                "Retry pass complete"
            );
        }
        Some(summary)
    }

    /// Retry one entry now.
    ///
    /// Only `PendingRetry` entries can be retried; anything else, including an
    /// entry another caller is already retrying, is refused with
    /// [`DlqError::NotRetryable`]. An entry that has used up its retries is
    /// finalized as a permanent failure instead. The executor runs on its own
    /// task so a panic is recorded as a failed attempt.
    pub async fn retry_entry(&self, entry_id: &str) -> Result<RetryOutcome, DlqError> {
        let max_retries = self.config.max_retries;
        let (claimed, snapshot) = self
            .update_entry(entry_id, |entry| {
                if entry.status != EntryStatus::PendingRetry {
                    return Err(entry.status);
                }
                if entry.retry_count >= max_retries {
                    finalize_permanent_failure(entry);
                    return Ok(true);
                }
                entry.status = EntryStatus::Retrying;
                Ok(false)
            })
            .ok_or_else(|| DlqError::NotFound(entry_id.to_string()))?;

        let exhausted = claimed.map_err(|status| DlqError::NotRetryable {
            entry_id: entry_id.to_string(),
            status,
        })?;

        if exhausted {
            self.persist(&snapshot).await;
            self.announce_permanent_failure(&snapshot);
            return Ok(RetryOutcome::PermanentFailure);
        }

        let attempt = snapshot.retry_count + 1;
        debug!(entry_id = %entry_id, task_id = %snapshot.task.task_id, attempt, "Retrying task");
        self.emit(DlqEventKind::RetryStarted, &snapshot, json!({ "attempt": attempt }));

        match self.execute(&snapshot.task).await {
            Ok(result) if result.success => self.complete_recovery(entry_id, result, attempt).await,
            Ok(result) => self.record_failed_attempt(entry_id, result.failure_error()).await,
            Err(e) => self.record_failed_attempt(entry_id, ErrorInfo::from(&e)).await,
        }
    }

    async fn execute(&self, task: &FailedTask) -> Result<TaskResult, ExecutorError> {
        let executor = Arc::clone(&self.executor);
        let task = task.clone();
        match tokio::spawn(async move { executor.execute(&task).await }).await {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                Err(ExecutorError::Panicked(panic_message(join_err.into_panic().as_ref())))
            }
            Err(join_err) => Err(ExecutorError::Failed(join_err.to_string())),
        }
    }

    async fn complete_recovery(
        &self,
        entry_id: &str,
        result: TaskResult,
        attempt: u32,
    ) -> Result<RetryOutcome, DlqError> {
        let (_, snapshot) = self
            .update_entry(entry_id, |entry| entry.status = EntryStatus::Recovered)
            .ok_or_else(|| DlqError::NotFound(entry_id.to_string()))?;

        info!(entry_id = %entry_id, task_id = %snapshot.task.task_id, attempt, "Task recovered from dead-letter queue");
        self.emit(
            DlqEventKind::RetrySucceeded,
            &snapshot,
            json!({ "attempt": attempt, "output": result.output }),
        );

        self.forget_entry(entry_id);
        self.unpersist(entry_id).await;
        self.recovered_total.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_retry_attempt("recovered");
        Ok(RetryOutcome::Recovered(result))
    }

    /// Register a failed attempt: bump the counter, append the error, back
    /// off, classify, and finalize when retries run out.
    ///
    /// Running out of retries wins over a quarantine or skip verdict, so an
    /// entry flagged on its last attempt still ends as a permanent failure.
    /// Entries in a terminal status are refused with [`DlqError::NotRetryable`].
    pub async fn record_failed_attempt(
        &self,
        entry_id: &str,
        error: ErrorInfo,
    ) -> Result<RetryOutcome, DlqError> {
        let now = self.now();
        let (verdict, snapshot) = self
            .update_entry(entry_id, |entry| {
                if entry.status.is_terminal() {
                    return Err(entry.status);
                }
                entry.record_failure(error, now);
                let delay_ms = self.backoff.calculate_retry_delay(entry.retry_count);
                let next_retry_at = offset_millis(now, delay_ms);
                entry.next_retry_at = Some(next_retry_at);
                entry.status = EntryStatus::PendingRetry;

                let poisoned = self.classifier.detect(entry, now);
                if self.backoff.is_exhausted(entry.retry_count) {
                    finalize_permanent_failure(entry);
                    return Ok((FailureResolution::PermanentFailure, poisoned));
                }
                if poisoned && entry.status != EntryStatus::PendingRetry {
                    return Ok((FailureResolution::PoisonPill, true));
                }
                Ok((FailureResolution::Rescheduled { next_retry_at, delay_ms }, poisoned))
            })
            .ok_or_else(|| DlqError::NotFound(entry_id.to_string()))?;

        let (resolution, poisoned) = verdict.map_err(|status| DlqError::NotRetryable {
            entry_id: entry_id.to_string(),
            status,
        })?;

        self.persist(&snapshot).await;

        let similarity = snapshot.error_similarity_score.unwrap_or(0.0);
        let action = self.classifier.config().action;
        if poisoned {
            self.announce_poison_pill(&snapshot, action, similarity);
        }

        let outcome = match resolution {
            FailureResolution::PoisonPill => RetryOutcome::PoisonPill { action, similarity },
            FailureResolution::PermanentFailure => {
                self.announce_permanent_failure(&snapshot);
                RetryOutcome::PermanentFailure
            }
            FailureResolution::Rescheduled { next_retry_at, delay_ms } => {
                debug!(
                    entry_id = %entry_id,
                    retry_count = snapshot.retry_count,
                    delay_ms,
                    error = %snapshot.error,
                    "Retry failed, rescheduled"
                );
                self.emit(
                    DlqEventKind::RetryFailed,
                    &snapshot,
                    json!({
                        "retry_count": snapshot.retry_count,
                        "error": snapshot.error,
                        "next_retry_at": next_retry_at,
                        "delay_ms": delay_ms,
                    }),
                );
                if poisoned {
                    RetryOutcome::PoisonPill { action, similarity }
                } else {
                    RetryOutcome::Rescheduled { retry_count: snapshot.retry_count, next_retry_at }
                }
            }
        };

        crate::metrics::record_retry_attempt(outcome.as_str());
        Ok(outcome)
    }

    /// Give up on an entry: no further automatic retries.
    pub async fn mark_as_permanent_failure(&self, entry_id: &str) -> Result<(), DlqError> {
        let (_, snapshot) = self
            .update_entry(entry_id, finalize_permanent_failure)
            .ok_or_else(|| DlqError::NotFound(entry_id.to_string()))?;

        self.persist(&snapshot).await;
        self.announce_permanent_failure(&snapshot);
        Ok(())
    }

    pub(super) fn announce_permanent_failure(&self, entry: &DlqEntry) {
        warn!(
            entry_id = %entry.id,
            task_id = %entry.task.task_id,
            retry_count = entry.retry_count,
            error = %entry.error,
            "Task permanently failed"
        );
        crate::metrics::record_permanent_failure();
        self.emit(
            DlqEventKind::PermanentFailure,
            entry,
            json!({ "retry_count": entry.retry_count, "error": entry.error }),
        );
    }

    fn announce_poison_pill(&self, entry: &DlqEntry, action: PoisonPillAction, similarity: f64) {
        warn!(
            entry_id = %entry.id,
            task_id = %entry.task.task_id,
            similarity,
            action = %action,
            status = %entry.status,
            "Poison pill detected"
        );
        crate::metrics::record_poison_pill(action.as_str());
        self.emit(
            DlqEventKind::PoisonPillDetected,
            entry,
            json!({
                "similarity": similarity,
                "action": action,
                "reason": entry.poison_pill_reason,
                "retry_count": entry.retry_count,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        let first = PassGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(PassGuard::acquire(&flag).is_none());

        drop(first);
        assert!(!flag.load(Ordering::Acquire));
        assert!(PassGuard::acquire(&flag).is_some());
    }
}
