// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The task executor seam.
//!
//! The queue never knows what a task does; it hands the [`FailedTask`] back
//! to an injected [`TaskExecutor`] and only looks at `success` and, on
//! failure, the first reported error. Per-attempt timeouts are the
//! executor's business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::entry::{ErrorInfo, FailedTask};

/// Outcome reported by an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorInfo>,
}

impl TaskResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self { success: true, output: output.into(), errors: Vec::new() }
    }

    #[must_use]
    pub fn failed(error: ErrorInfo) -> Self {
        Self { success: false, output: String::new(), errors: vec![error] }
    }

    /// The error the queue records for a failed result.
    #[must_use]
    pub fn failure_error(&self) -> ErrorInfo {
        self.errors
            .first()
            .cloned()
            .unwrap_or_else(|| ErrorInfo::new("task reported failure without error details"))
    }
}

/// An executor call that did not produce a [`TaskResult`].
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("{0}")]
    Failed(String),
    #[error("task timed out after {0:?}")]
    Timeout(Duration),
    #[error("task executor panicked: {0}")]
    Panicked(String),
}

impl ExecutorError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Failed(_) => "EXECUTION_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Panicked(_) => "PANIC",
        }
    }
}

impl From<&ExecutorError> for ErrorInfo {
    fn from(err: &ExecutorError) -> Self {
        ErrorInfo::new(err.to_string()).with_code(err.code())
    }
}

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &FailedTask) -> Result<TaskResult, ExecutorError>;
}

/// Adapts an async closure into a [`TaskExecutor`].
///
/// ```
/// use dlq_engine::{FnExecutor, TaskResult};
///
/// let executor = FnExecutor::new(|task| async move {
///     Ok(TaskResult::ok(format!("ran {}", task.task_id)))
/// });
/// # let _ = executor;
/// ```
pub struct FnExecutor<F> {
    func: F,
}

impl<F, Fut> FnExecutor<F>
where
    F: Fn(FailedTask) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskResult, ExecutorError>> + Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> TaskExecutor for FnExecutor<F>
where
    F: Fn(FailedTask) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskResult, ExecutorError>> + Send + 'static,
{
    async fn execute(&self, task: &FailedTask) -> Result<TaskResult, ExecutorError> {
        (self.func)(task.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_error_uses_first_reported() {
        let result = TaskResult {
            success: false,
            output: String::new(),
            errors: vec![ErrorInfo::new("first"), ErrorInfo::new("second")],
        };
        assert_eq!(result.failure_error().message, "first");
    }

    #[test]
    fn test_failure_error_synthesized_when_missing() {
        let result = TaskResult { success: false, output: String::new(), errors: vec![] };
        assert!(result.failure_error().message.contains("without error details"));
    }

    #[test]
    fn test_executor_error_to_error_info() {
        let info = ErrorInfo::from(&ExecutorError::Timeout(Duration::from_secs(2)));
        assert_eq!(info.code.as_deref(), Some("TIMEOUT"));
        assert!(info.message.contains("2s"));

        let info = ErrorInfo::from(&ExecutorError::Failed("socket closed".into()));
        assert_eq!(info.message, "socket closed");
        assert_eq!(info.code.as_deref(), Some("EXECUTION_ERROR"));
    }

    #[test]
    fn test_task_result_deserializes_without_optional_fields() {
        let result: TaskResult = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(result.success);
        assert!(result.output.is_empty());
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_fn_executor() {
        let executor = FnExecutor::new(|task: FailedTask| async move {
            if task.payload["ok"] == json!(true) {
                Ok(TaskResult::ok("done"))
            } else {
                Err(ExecutorError::Failed("not ok".into()))
            }
        });

        let ok = executor.execute(&FailedTask::new("a", json!({"ok": true}))).await.unwrap();
        assert!(ok.success);

        let err = executor.execute(&FailedTask::new("b", json!({"ok": false}))).await;
        assert!(matches!(err, Err(ExecutorError::Failed(_))));
    }
}
