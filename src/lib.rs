//! # DLQ Engine
//!
//! A dead-letter queue for failed work items: bounded retries with
//! exponential backoff, and poison-pill detection for tasks that keep
//! failing the same way.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Ingest                               │
//! │  • add(task, error) on first observed failure              │
//! │  • Entry persisted best-effort through a DlqStore          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                   (periodic, single-flight pass)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Retry pass                             │
//! │  • Due, pending, non-poison entries, retried sequentially  │
//! │  • TaskExecutor re-runs the task                           │
//! │  • Failure → backoff: min(base × mult^n, max)              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                     (on repeated failure)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Poison-pill classifier                      │
//! │  • Levenshtein similarity of the last N errors             │
//! │  • Quarantine / Skip / Alert                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dlq_engine::{DeadLetterQueue, DlqConfig, ErrorInfo, FailedTask, FnExecutor, TaskResult};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let executor = Arc::new(FnExecutor::new(|task| async move {
//!         Ok(TaskResult::ok(format!("re-ran {}", task.task_id)))
//!     }));
//!     let dlq = Arc::new(
//!         DeadLetterQueue::new(DlqConfig::default(), executor).expect("valid config"),
//!     );
//!
//!     dlq.add(
//!         FailedTask::new("invoice-42", json!({"amount": 120})),
//!         ErrorInfo::new("connection reset").with_code("ECONNRESET"),
//!     ).await;
//!
//!     dlq.start().expect("timer");
//!     // ...
//!     let stats = dlq.get_stats();
//!     println!("recovery rate: {:.1}%", stats.recovery_rate);
//!
//!     dlq.shutdown();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`DeadLetterQueue`] tying everything together
//! - [`entry`]: Entry model, statuses and error history
//! - [`retry`]: Backoff and eligibility rules
//! - [`similarity`]: Levenshtein-based error similarity
//! - [`poison_pill`]: Poison-pill classification and release
//! - [`executor`]: The [`TaskExecutor`] seam used to re-run tasks
//! - [`events`]: Observer and broadcast fan-out of lifecycle events
//! - [`storage`]: Persistence adapters (memory, NDJSON file)
//! - [`clock`]: Injectable wall clock

pub mod config;
pub mod clock;
pub mod entry;
pub mod similarity;
pub mod retry;
pub mod poison_pill;
pub mod executor;
pub mod events;
pub mod storage;
pub mod coordinator;
pub mod metrics;

pub use config::{ConfigError, DlqConfig, PoisonPillAction, PoisonPillConfig};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{DlqEntry, EntryStatus, ErrorInfo, ErrorRecord, FailedTask};
pub use retry::BackoffPolicy;
pub use poison_pill::PoisonPillClassifier;
pub use executor::{ExecutorError, FnExecutor, TaskExecutor, TaskResult};
pub use events::{DlqEvent, DlqEventKind, EventObserver};
pub use storage::{DlqStore, InMemoryStore, NdjsonFileStore, StorageError, StoredEntry};
pub use coordinator::{DeadLetterQueue, DlqError, DlqState, DlqStats, RetryOutcome, RetryPassSummary};
