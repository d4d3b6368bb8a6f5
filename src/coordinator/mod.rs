// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Dead-letter queue coordinator.
//!
//! The [`DeadLetterQueue`] owns every entry and ties the components together:
//! - entry lifecycle (add / remove / release / finalize)
//! - the single-flight retry pass and its background timer
//! - poison-pill classification of repeated failures
//! - best-effort persistence through a [`DlqStore`]
//! - event fan-out and stats
//!
//! # Lifecycle of an entry
//!
//! ```text
//! add → PendingRetry → Retrying → Recovered (removed)
//!                              → PendingRetry (backoff) → ...
//!                              → PermanentFailure (kept until purge)
//!       PendingRetry → Quarantined → PendingRetry (release)
//!       PendingRetry → Skipped
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dlq_engine::{DeadLetterQueue, DlqConfig, ErrorInfo, FailedTask, FnExecutor, TaskResult};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let executor = Arc::new(FnExecutor::new(|task| async move {
//!     Ok(TaskResult::ok(format!("re-ran {}", task.task_id)))
//! }));
//! let dlq = Arc::new(DeadLetterQueue::new(DlqConfig::default(), executor).unwrap());
//!
//! dlq.add(
//!     FailedTask::new("render-7", json!({"page": 7})),
//!     ErrorInfo::new("renderer crashed"),
//! ).await;
//!
//! dlq.start().unwrap();
//! // ...
//! dlq.shutdown();
//! # }
//! ```

mod types;
mod api;
mod retry_pass;
mod lifecycle;

pub use types::{DlqError, DlqState, DlqStats, RetryOutcome, RetryPassSummary};

use lifecycle::RetryLoop;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::DlqConfig;
use crate::entry::DlqEntry;
use crate::events::{DlqEvent, DlqEventKind, EventBus, EventObserver};
use crate::executor::TaskExecutor;
use crate::poison_pill::PoisonPillClassifier;
use crate::retry::BackoffPolicy;
use crate::storage::traits::{DlqStore, StoredEntry};

/// Dead-letter queue with bounded retries and poison-pill detection.
///
/// # Thread Safety
///
/// The queue is `Send + Sync`; share it as `Arc<DeadLetterQueue>`. Entries
/// live in a `DashMap`, and the retry pass is single-flight: a pass started
/// while another is running returns immediately.
pub struct DeadLetterQueue {
    pub(super) config: DlqConfig,
    pub(super) backoff: BackoffPolicy,
    pub(super) classifier: PoisonPillClassifier,

    /// Entry id → entry
    pub(super) entries: DashMap<String, DlqEntry>,

    /// Task id → entry id of the most recent entry for that task
    pub(super) task_index: DashMap<String, String>,

    pub(super) executor: Arc<dyn TaskExecutor>,
    pub(super) store: Option<Arc<dyn DlqStore>>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) events: EventBus,

    /// Single-flight guard for the retry pass
    pub(super) processing: AtomicBool,

    /// Recovered entries are removed, so they are counted here
    pub(super) recovered_total: AtomicU64,

    pub(super) state: watch::Sender<DlqState>,
    pub(super) retry_loop: Mutex<Option<RetryLoop>>,
}

impl DeadLetterQueue {
    /// Create a queue. Fails only on an invalid config.
    ///
    /// No storage, the system clock, no observers. Use the `with_*` methods
    /// to change that before sharing the queue.
    pub fn new(config: DlqConfig, executor: Arc<dyn TaskExecutor>) -> Result<Self, DlqError> {
        config.validate()?;

        let (state, _) = watch::channel(DlqState::Created);

        Ok(Self {
            backoff: BackoffPolicy::from_config(&config),
            classifier: PoisonPillClassifier::new(config.poison_pill.clone()),
            config,
            entries: DashMap::new(),
            task_index: DashMap::new(),
            executor,
            store: None,
            clock: Arc::new(SystemClock),
            events: EventBus::default(),
            processing: AtomicBool::new(false),
            recovered_total: AtomicU64::new(0),
            state,
            retry_loop: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn DlqStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_observer(self, observer: Arc<dyn EventObserver>) -> Self {
        self.events.add_observer(observer);
        self
    }

    #[must_use]
    pub fn config(&self) -> &DlqConfig {
        &self.config
    }

    pub(super) fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Mutate an entry in place and hand back a snapshot.
    ///
    /// The closure runs under the map's shard lock: it must not touch `entries`.
    pub(super) fn update_entry<R>(
        &self,
        entry_id: &str,
        f: impl FnOnce(&mut DlqEntry) -> R,
    ) -> Option<(R, DlqEntry)> {
        let mut entry = self.entries.get_mut(entry_id)?;
        let result = f(entry.value_mut());
        Some((result, entry.value().clone()))
    }

    pub(super) fn insert_entry(&self, entry: DlqEntry) {
        self.task_index.insert(entry.task.task_id.clone(), entry.id.clone());
        self.entries.insert(entry.id.clone(), entry);
    }

    pub(super) fn forget_entry(&self, entry_id: &str) -> Option<DlqEntry> {
        let (_, entry) = self.entries.remove(entry_id)?;
        self.task_index.remove_if(&entry.task.task_id, |_, indexed| indexed == entry_id);
        Some(entry)
    }

    /// Upsert through the store. Failures are logged, never returned.
    ///
    /// An entry removed while the write was in flight has its record deleted
    /// again, so a late put cannot bring it back on the next load.
    pub(super) async fn persist(&self, entry: &DlqEntry) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.put(&StoredEntry::from(entry)).await {
            warn!(entry_id = %entry.id, error = %e, "Failed to persist DLQ entry");
            crate::metrics::record_storage_error("put");
            return;
        }
        if !self.entries.contains_key(&entry.id) {
            debug!(entry_id = %entry.id, "Entry removed during persist, deleting stale record");
            self.unpersist(&entry.id).await;
        }
    }

    pub(super) async fn unpersist(&self, entry_id: &str) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.delete(entry_id).await {
            warn!(entry_id = %entry_id, error = %e, "Failed to delete DLQ entry from storage");
            crate::metrics::record_storage_error("delete");
        }
    }

    pub(super) fn emit(&self, kind: DlqEventKind, entry: &DlqEntry, payload: serde_json::Value) {
        self.events.emit(DlqEvent {
            kind,
            entry_id: entry.id.clone(),
            task_id: entry.task.task_id.clone(),
            timestamp: self.now(),
            payload,
        });
    }
}
