//! Queue lifecycle: hydration from storage, the background retry timer,
//! shutdown and retention purge.

use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{DeadLetterQueue, DlqError, DlqState};

/// A running retry timer and the channel that stops it.
pub(crate) struct RetryLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl DeadLetterQueue {
    /// Hydrate memory from the configured store.
    ///
    /// Entries already in memory win over their persisted copy. Each loaded
    /// entry carries a single-record error history rebuilt from its last
    /// failure. Returns the number of entries added.
    #[tracing::instrument(skip(self))]
    pub async fn load_from_storage(&self) -> Result<usize, DlqError> {
        let Some(store) = &self.store else {
            debug!("No store configured, nothing to load");
            return Ok(0);
        };

        let records = store.list().await.map_err(|e| {
            crate::metrics::record_storage_error("list");
            e
        })?;

        let mut loaded = 0;
        for record in records {
            if self.entries.contains_key(&record.id) {
                continue;
            }
            self.insert_entry(record.into_entry());
            loaded += 1;
        }

        info!(loaded, total = self.entries.len(), "Loaded dead-letter entries from storage");
        crate::metrics::set_entry_counts(&self.get_stats());
        Ok(loaded)
    }

    /// Start the periodic retry pass.
    ///
    /// Does nothing when auto retry is disabled. Must be called from within a
    /// Tokio runtime. The timer holds a weak reference, so dropping the last
    /// `Arc` to the queue also ends it.
    pub fn start(self: &Arc<Self>) -> Result<(), DlqError> {
        if !self.config.auto_retry_enabled {
            info!("Auto retry disabled, retry timer not started");
            return Ok(());
        }

        let mut slot = self.retry_loop.lock();
        if slot.is_some() {
            return Err(DlqError::AlreadyRunning);
        }

        let period = self.config.auto_retry_interval();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_retry_loop(Arc::downgrade(self), period, shutdown_rx));
        *slot = Some(RetryLoop { shutdown, handle });
        drop(slot);

        let _ = self.state.send_replace(DlqState::Running);
        info!(interval_ms = self.config.auto_retry_interval_ms, "Retry timer started");
        Ok(())
    }

    /// Stop the retry timer.
    ///
    /// A pass already in flight runs to completion; no executor call is
    /// interrupted. Entries stay in memory.
    pub fn shutdown(&self) {
        let Some(retry_loop) = self.retry_loop.lock().take() else {
            let _ = self.state.send_replace(DlqState::Stopped);
            return;
        };

        let _ = retry_loop.shutdown.send(true);
        // Detached: the loop exits at its next select.
        drop(retry_loop.handle);

        let _ = self.state.send_replace(DlqState::Stopped);
        info!(entries = self.entries.len(), "Retry timer stopped");
    }

    #[must_use]
    pub fn state(&self) -> DlqState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<DlqState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == DlqState::Running
    }

    /// Delete every entry whose retention has elapsed, from memory and storage.
    ///
    /// Never runs on its own; the owner schedules it.
    #[tracing::instrument(skip(self))]
    pub async fn purge_expired(&self) -> usize {
        let now = self.now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|r| r.value().is_expired(now))
            .map(|r| r.key().clone())
            .collect();

        if expired.is_empty() {
            return 0;
        }

        let purged: Vec<String> = expired
            .into_iter()
            .filter(|id| self.forget_entry(id).is_some())
            .collect();

        if let Some(store) = &self.store {
            if let Err(e) = store.delete_batch(&purged).await {
                warn!(count = purged.len(), error = %e, "Failed to purge expired entries from storage");
                crate::metrics::record_storage_error("delete");
            }
        }

        info!(count = purged.len(), "Purged expired dead-letter entries");
        crate::metrics::record_purged(purged.len());
        crate::metrics::set_entry_counts(&self.get_stats());
        purged.len()
    }
}

async fn run_retry_loop(
    dlq: Weak<DeadLetterQueue>,
    period: std::time::Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(dlq) = dlq.upgrade() else {
                    debug!("Queue dropped, retry timer exiting");
                    break;
                };
                dlq.process_retries().await;
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
