//! Configuration for the dead-letter queue.
//!
//! # Example
//!
//! ```
//! use dlq_engine::{DlqConfig, PoisonPillAction};
//!
//! // Minimal config (uses defaults)
//! let config = DlqConfig::default();
//! assert_eq!(config.max_retries, 3);
//! assert_eq!(config.retry_delay_ms, 5_000);
//! assert_eq!(config.poison_pill.action, PoisonPillAction::Quarantine);
//!
//! // Partial documents fill in the rest
//! let config: DlqConfig = serde_json::from_str(r#"{"max_retries": 5}"#).unwrap();
//! assert_eq!(config.max_retries, 5);
//! assert_eq!(config.backoff_multiplier, 2.0);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// What to do with an entry once it is classified as a poison pill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoisonPillAction {
    /// Stop automatic retries and hold the entry for manual release.
    #[default]
    Quarantine,
    /// Flag the entry and leave its status untouched.
    Alert,
    /// Stop automatic retries for good.
    Skip,
}

impl PoisonPillAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quarantine => "quarantine",
            Self::Alert => "alert",
            Self::Skip => "skip",
        }
    }
}

impl std::fmt::Display for PoisonPillAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}

/// Poison-pill detection policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoisonPillConfig {
    #[serde(default = "default_poison_pill_enabled")]
    pub enabled: bool,

    /// How many of the most recent errors are compared
    #[serde(default = "default_min_failures")]
    pub min_failures: usize,

    /// Average pairwise similarity (0.0 - 1.0) at which an entry is a poison pill
    #[serde(default = "default_error_similarity_threshold")]
    pub error_similarity_threshold: f64,

    #[serde(default)]
    pub action: PoisonPillAction,
}

fn default_poison_pill_enabled() -> bool { true }
fn default_min_failures() -> usize { 3 }
fn default_error_similarity_threshold() -> f64 { 0.8 }

impl Default for PoisonPillConfig {
    fn default() -> Self {
        Self {
            enabled: default_poison_pill_enabled(),
            min_failures: default_min_failures(),
            error_similarity_threshold: default_error_similarity_threshold(),
            action: PoisonPillAction::default(),
        }
    }
}

/// Configuration for the dead-letter queue.
///
/// All fields have defaults; a deserialized document only needs to name the
/// fields it changes. Call [`validate()`](Self::validate) before use
/// ([`DeadLetterQueue::new`](crate::DeadLetterQueue::new) does this for you).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqConfig {
    /// Failed retry attempts allowed before an entry is a permanent failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Backoff cap
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Run the periodic retry pass after [`start()`](crate::DeadLetterQueue::start)
    #[serde(default = "default_auto_retry_enabled")]
    pub auto_retry_enabled: bool,

    #[serde(default = "default_auto_retry_interval_ms")]
    pub auto_retry_interval_ms: u64,

    /// How long an entry is kept before `purge_expired` may drop it
    #[serde(default = "default_permanent_failure_retention_ms")]
    pub permanent_failure_retention_ms: u64,

    #[serde(default)]
    pub poison_pill: PoisonPillConfig,
}

fn default_max_retries() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 5_000 }
fn default_backoff_multiplier() -> f64 { 2.0 }
fn default_max_retry_delay_ms() -> u64 { 60_000 }
fn default_auto_retry_enabled() -> bool { true }
fn default_auto_retry_interval_ms() -> u64 { 30_000 }
fn default_permanent_failure_retention_ms() -> u64 { 24 * 60 * 60 * 1000 } // 24h

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            auto_retry_enabled: default_auto_retry_enabled(),
            auto_retry_interval_ms: default_auto_retry_interval_ms(),
            permanent_failure_retention_ms: default_permanent_failure_retention_ms(),
            poison_pill: PoisonPillConfig::default(),
        }
    }
}

impl DlqConfig {
    /// Check the values a deserialized or hand-built config can get wrong.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "backoff_multiplier",
                format!("must be a finite number >= 1, got {}", self.backoff_multiplier),
            ));
        }
        if self.auto_retry_enabled && self.auto_retry_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "auto_retry_interval_ms",
                "must be greater than zero when auto retry is enabled",
            ));
        }

        let threshold = self.poison_pill.error_similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::invalid(
                "poison_pill.error_similarity_threshold",
                format!("must be within [0, 1], got {}", threshold),
            ));
        }
        if self.poison_pill.enabled && self.poison_pill.min_failures < 2 {
            return Err(ConfigError::invalid(
                "poison_pill.min_failures",
                format!("must be at least 2, got {}", self.poison_pill.min_failures),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn auto_retry_interval(&self) -> Duration {
        Duration::from_millis(self.auto_retry_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = DlqConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 5_000);
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.max_retry_delay_ms, 60_000);
        assert!(config.auto_retry_enabled);
        assert_eq!(config.auto_retry_interval_ms, 30_000);
        assert_eq!(config.permanent_failure_retention_ms, 86_400_000);

        assert!(config.poison_pill.enabled);
        assert_eq!(config.poison_pill.min_failures, 3);
        assert_eq!(config.poison_pill.error_similarity_threshold, 0.8);
        assert_eq!(config.poison_pill.action, PoisonPillAction::Quarantine);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: DlqConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, DlqConfig::default());
    }

    #[test]
    fn test_partial_poison_pill_section() {
        let config: DlqConfig = serde_json::from_str(
            r#"{"retry_delay_ms": 100, "poison_pill": {"action": "skip"}}"#,
        )
        .unwrap();
        assert_eq!(config.retry_delay_ms, 100);
        assert_eq!(config.poison_pill.action, PoisonPillAction::Skip);
        assert_eq!(config.poison_pill.min_failures, 3);
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let result: Result<DlqConfig, _> =
            serde_json::from_str(r#"{"poison_pill": {"action": "explode"}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_shrinking_backoff() {
        let config = DlqConfig { backoff_multiplier: 0.5, ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("backoff_multiplier"));

        let config = DlqConfig { backoff_multiplier: f64::NAN, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval_only_when_enabled() {
        let config = DlqConfig { auto_retry_interval_ms: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = DlqConfig {
            auto_retry_interval_ms: 0,
            auto_retry_enabled: false,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_threshold_range() {
        let mut config = DlqConfig::default();
        config.poison_pill.error_similarity_threshold = 1.5;
        assert!(config.validate().is_err());

        config.poison_pill.error_similarity_threshold = 1.0;
        assert!(config.validate().is_ok());

        config.poison_pill.error_similarity_threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_min_failures() {
        let mut config = DlqConfig::default();
        config.poison_pill.min_failures = 1;
        assert!(config.validate().is_err());

        config.poison_pill.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_action_display() {
        assert_eq!(PoisonPillAction::Quarantine.to_string(), "quarantine");
        assert_eq!(PoisonPillAction::Alert.to_string(), "alert");
        assert_eq!(PoisonPillAction::Skip.to_string(), "skip");
    }
}
