// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the dead-letter queue.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `dlq_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `status`: entry status (pending_retry, quarantined, ...)
//! - `outcome`: result of a retry attempt
//! - `action`: poison-pill action
//! - `operation`: storage operation (put, delete, list)

use metrics::{counter, gauge, histogram};
use std::time::Duration;

use crate::coordinator::DlqStats;

/// Record a new entry
pub fn record_entry_added() {
    counter!("dlq_entries_added_total").increment(1);
}

/// Record the outcome of one retry attempt
pub fn record_retry_attempt(outcome: &str) {
    counter!(
        "dlq_retry_attempts_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a poison-pill verdict
pub fn record_poison_pill(action: &str) {
    counter!(
        "dlq_poison_pills_total",
        "action" => action.to_string()
    )
    .increment(1);
}

/// Record an entry reaching permanent failure
pub fn record_permanent_failure() {
    counter!("dlq_permanent_failures_total").increment(1);
}

/// Record an emitted event
pub fn record_event(kind: &str) {
    counter!(
        "dlq_events_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record an observer that panicked
pub fn record_observer_error() {
    counter!("dlq_observer_errors_total").increment(1);
}

/// Record a failed storage adapter call
pub fn record_storage_error(operation: &str) {
    counter!(
        "dlq_storage_errors_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a completed retry pass
pub fn record_retry_pass(size: usize, duration: Duration) {
    histogram!("dlq_retry_pass_size").record(size as f64);
    histogram!("dlq_retry_pass_seconds").record(duration.as_secs_f64());
}

/// Record a tick dropped because a pass was already running
pub fn record_retry_pass_skipped() {
    counter!("dlq_retry_passes_skipped_total").increment(1);
}

/// Record purged entries
pub fn record_purged(count: usize) {
    counter!("dlq_purged_entries_total").increment(count as u64);
}

/// Set entry gauges per status
pub fn set_entry_counts(stats: &DlqStats) {
    let by_status = [
        ("pending_retry", stats.pending_retry),
        ("retrying", stats.retrying),
        ("permanent_failure", stats.permanent_failures),
        ("quarantined", stats.quarantined),
        ("skipped", stats.skipped),
    ];
    for (status, count) in by_status {
        gauge!("dlq_entries", "status" => status).set(count as f64);
    }
    gauge!("dlq_poison_pill_entries").set(stats.poison_pills as f64);
}
