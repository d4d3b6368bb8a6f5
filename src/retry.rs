// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry scheduling: exponential backoff and eligibility.
//!
//! Delays are deterministic (no jitter): the same failure sequence always
//! yields the same schedule.
//!
//! # Example
//!
//! ```
//! use dlq_engine::{BackoffPolicy, DlqConfig};
//!
//! let policy = BackoffPolicy::from_config(&DlqConfig::default());
//!
//! // 5s → 10s → 20s → 40s → capped at 60s
//! assert_eq!(policy.calculate_retry_delay(0), 5_000);
//! assert_eq!(policy.calculate_retry_delay(1), 10_000);
//! assert_eq!(policy.calculate_retry_delay(3), 40_000);
//! assert_eq!(policy.calculate_retry_delay(4), 60_000);
//! ```

use crate::clock::offset_millis;
use crate::config::DlqConfig;
use crate::entry::{DlqEntry, EntryStatus};

/// Backoff and retry-limit settings pulled from [`DlqConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_retry_delay_ms: u64,
}

impl BackoffPolicy {
    #[must_use]
    pub fn from_config(config: &DlqConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
            backoff_multiplier: config.backoff_multiplier,
            max_retry_delay_ms: config.max_retry_delay_ms,
        }
    }

    /// `min(retry_delay × multiplier^retry_count, max_retry_delay)`
    #[must_use]
    pub fn calculate_retry_delay(&self, retry_count: u32) -> u64 {
        let exponent = retry_count.min(i32::MAX as u32) as i32;
        let raw = self.retry_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        raw.min(self.max_retry_delay_ms as f64) as u64
    }

    /// When the next attempt is due for an entry that has failed `retry_count` retries.
    #[must_use]
    pub fn next_retry_at(&self, now: i64, retry_count: u32) -> i64 {
        offset_millis(now, self.calculate_retry_delay(retry_count))
    }

    #[must_use]
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }

    /// Whether the retry pass may pick this entry up at `now`.
    #[must_use]
    pub fn is_eligible(&self, entry: &DlqEntry, now: i64) -> bool {
        entry.status == EntryStatus::PendingRetry
            && !entry.is_poison_pill
            && !self.is_exhausted(entry.retry_count)
            && entry.next_retry_at.is_some_and(|at| at <= now)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&DlqConfig::default())
    }
}
