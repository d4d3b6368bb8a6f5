// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry lifecycle events.
//!
//! Events go to registered [`EventObserver`]s synchronously and to any
//! [`broadcast`] subscribers. A misbehaving observer is logged and skipped;
//! it never reaches the retry path.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqEventKind {
    RetryStarted,
    RetrySucceeded,
    RetryFailed,
    PermanentFailure,
    PoisonPillDetected,
}

impl DlqEventKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetryStarted => "retry_started",
            Self::RetrySucceeded => "retry_succeeded",
            Self::RetryFailed => "retry_failed",
            Self::PermanentFailure => "permanent_failure",
            Self::PoisonPillDetected => "poison_pill_detected",
        }
    }
}

impl std::fmt::Display for DlqEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEvent {
    pub kind: DlqEventKind,
    pub entry_id: String,
    pub task_id: String,
    /// Epoch millis
    pub timestamp: i64,
    /// Kind-specific details (attempt, error, next_retry_at, ...)
    pub payload: Value,
}

/// Receives events as they happen. Runs on the retry path, so keep it quick.
pub trait EventObserver: Send + Sync {
    fn on_event(&self, event: &DlqEvent);
}

impl<F> EventObserver for F
where
    F: Fn(&DlqEvent) + Send + Sync,
{
    fn on_event(&self, event: &DlqEvent) {
        self(event)
    }
}

/// Fan-out to observers and broadcast subscribers.
pub struct EventBus {
    observers: RwLock<Vec<Arc<dyn EventObserver>>>,
    sender: broadcast::Sender<DlqEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { observers: RwLock::new(Vec::new()), sender }
    }

    pub fn add_observer(&self, observer: Arc<dyn EventObserver>) {
        self.observers.write().push(observer);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DlqEvent> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    pub fn emit(&self, event: DlqEvent) {
        crate::metrics::record_event(event.kind.as_str());

        // Snapshot so an observer can register another without deadlocking
        let observers = self.observers.read().clone();
        for observer in &observers {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(&event)));
            if let Err(panic) = delivered {
                warn!(
                    kind = %event.kind,
                    entry_id = %event.entry_id,
                    error = %panic_message(panic.as_ref()),
                    "Event observer panicked, continuing"
                );
                crate::metrics::record_observer_error();
            }
        }

        // No subscribers is fine
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(kind: DlqEventKind) -> DlqEvent {
        DlqEvent {
            kind,
            entry_id: "e1".into(),
            task_id: "t1".into(),
            timestamp: 1,
            payload: json!({"attempt": 1}),
        }
    }

    #[test]
    fn test_closure_observer_receives_events() {
        let bus = EventBus::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        bus.add_observer(Arc::new(move |_: &DlqEvent| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        }));

        bus.emit(event(DlqEventKind::RetryStarted));
        bus.emit(event(DlqEventKind::RetryFailed));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_observer_does_not_stop_others() {
        let bus = EventBus::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();

        bus.add_observer(Arc::new(|_: &DlqEvent| panic!("observer bug")));
        bus.add_observer(Arc::new(move |_: &DlqEvent| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        }));

        bus.emit(event(DlqEventKind::PermanentFailure));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(bus.observer_count(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(event(DlqEventKind::PoisonPillDetected));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, DlqEventKind::PoisonPillDetected);
        assert_eq!(received.entry_id, "e1");
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(0);
        bus.emit(event(DlqEventKind::RetrySucceeded));
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(event(DlqEventKind::RetrySucceeded)).unwrap();
        assert_eq!(json["kind"], "retry_succeeded");
        assert_eq!(json["task_id"], "t1");
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic payload");
    }
}
