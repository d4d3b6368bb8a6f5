// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Poison-pill classification.
//!
//! An entry whose most recent errors read the same is unlikely to succeed on
//! the next blind retry. The classifier scores the last `min_failures` error
//! messages and, when the average pairwise similarity reaches the threshold,
//! flags the entry and applies the configured [`PoisonPillAction`].
//!
//! This is a heuristic: differently worded transient errors can slip under
//! the threshold and unrelated errors with a shared template can cross it.

use crate::clock::offset_millis;
use crate::config::{PoisonPillAction, PoisonPillConfig};
use crate::entry::{DlqEntry, EntryStatus};
use crate::similarity::calculate_error_similarity;

#[derive(Debug, Clone)]
pub struct PoisonPillClassifier {
    config: PoisonPillConfig,
}

impl PoisonPillClassifier {
    #[must_use]
    pub fn new(config: PoisonPillConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &PoisonPillConfig {
        &self.config
    }

    /// Score the entry's recent errors and act on a positive verdict.
    ///
    /// Stores the score on the entry whenever one is computed.
    pub fn detect(&self, entry: &mut DlqEntry, now: i64) -> bool {
        if !self.config.enabled || entry.error_history.len() < self.config.min_failures {
            return false;
        }

        let recent = entry.recent_error_messages(self.config.min_failures);
        let similarity = calculate_error_similarity(&recent);
        entry.error_similarity_score = Some(similarity);

        if similarity < self.config.error_similarity_threshold {
            return false;
        }

        self.handle(entry, similarity, now);
        true
    }

    /// Flag the entry and apply the configured action.
    ///
    /// `Alert` leaves the status at `PendingRetry`; the flag alone keeps the
    /// entry out of the retry pass.
    pub fn handle(&self, entry: &mut DlqEntry, similarity: f64, now: i64) {
        entry.is_poison_pill = true;
        entry.error_similarity_score = Some(similarity);
        entry.poison_pill_reason = Some(format!(
            "last {} errors are {:.1}% similar (threshold {:.1}%)",
            self.config.min_failures,
            similarity * 100.0,
            self.config.error_similarity_threshold * 100.0,
        ));

        match self.config.action {
            PoisonPillAction::Quarantine => {
                entry.status = EntryStatus::Quarantined;
                entry.quarantined_at = Some(now);
                entry.next_retry_at = None;
            }
            PoisonPillAction::Skip => {
                entry.status = EntryStatus::Skipped;
                entry.next_retry_at = None;
            }
            PoisonPillAction::Alert => {}
        }
    }
}

/// Put a quarantined entry back on the retry schedule.
///
/// Returns `false`, leaving the entry untouched, for any other status.
pub fn release(entry: &mut DlqEntry, now: i64, retry_delay_ms: u64) -> bool {
    if entry.status != EntryStatus::Quarantined {
        return false;
    }

    entry.status = EntryStatus::PendingRetry;
    entry.is_poison_pill = false;
    entry.quarantined_at = None;
    entry.poison_pill_reason = None;
    entry.next_retry_at = Some(offset_millis(now, retry_delay_ms));
    true
}
