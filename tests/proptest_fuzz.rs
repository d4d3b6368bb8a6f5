//! Property-based tests (fuzzing) for the dead-letter queue building blocks.
//!
//! Uses proptest to check similarity and backoff invariants, and to verify
//! that malformed persisted records fail cleanly instead of panicking.
//!
//! Run with: `cargo test --test proptest_fuzz`

use proptest::prelude::*;
use serde_json::{json, Value};

use dlq_engine::similarity::{calculate_error_similarity, levenshtein, string_similarity};
use dlq_engine::{
    BackoffPolicy, DlqEntry, EntryStatus, ErrorInfo, ErrorRecord, FailedTask,
    PoisonPillAction, PoisonPillClassifier, PoisonPillConfig, StoredEntry,
};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Error-message-like strings, including non-ASCII
fn message_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 :._-]{0,40}",
        ".{0,20}",
    ]
}

fn backoff_strategy() -> impl Strategy<Value = BackoffPolicy> {
    (0u32..20, 0u64..100_000, 1.0f64..10.0, 0u64..10_000_000).prop_map(
        |(max_retries, retry_delay_ms, backoff_multiplier, max_retry_delay_ms)| BackoffPolicy {
            max_retries,
            retry_delay_ms,
            backoff_multiplier,
            max_retry_delay_ms,
        },
    )
}

/// Generate arbitrary JSON values (including invalid structures)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        4,   // depth
        64,  // max nodes
        10,  // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..10)
                    .prop_map(Value::Array),
                prop::collection::hash_map(".*", inner, 0..10)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

fn entry_with_errors(messages: &[String]) -> DlqEntry {
    let mut entry = DlqEntry::new(
        "e1".into(),
        FailedTask::new("t1", json!({})),
        ErrorInfo::new(messages[0].clone()),
        0,
        1_000,
        60_000,
    );
    for (i, message) in messages.iter().enumerate().skip(1) {
        entry.retry_count = i as u32;
        entry.error_history.push(ErrorRecord {
            message: message.clone(),
            code: None,
            timestamp: i as i64,
            attempt: i as u32,
        });
    }
    entry
}

// =============================================================================
// Similarity invariants
// =============================================================================

proptest! {
    #[test]
    fn prop_similarity_identity(s in message_strategy()) {
        prop_assert_eq!(levenshtein(&s, &s), 0);
        prop_assert_eq!(string_similarity(&s, &s), 1.0);
    }

    #[test]
    fn prop_similarity_symmetric_and_bounded(a in message_strategy(), b in message_strategy()) {
        let ab = string_similarity(&a, &b);
        let ba = string_similarity(&b, &a);
        prop_assert_eq!(ab, ba);
        prop_assert!((0.0..=1.0).contains(&ab));

        let longest = a.chars().count().max(b.chars().count());
        prop_assert!(levenshtein(&a, &b) <= longest);
    }

    #[test]
    fn prop_error_similarity_bounded(messages in prop::collection::vec(message_strategy(), 0..6)) {
        let score = calculate_error_similarity(&messages);
        prop_assert!((0.0..=1.0).contains(&score));
        if messages.len() < 2 {
            prop_assert_eq!(score, 0.0);
        }
    }
}

// =============================================================================
// Backoff invariants
// =============================================================================

proptest! {
    /// Delay follows min(base × mult^n, max) and never decreases with n
    #[test]
    fn prop_backoff_capped_and_monotonic(policy in backoff_strategy(), n in 0u32..64) {
        let delay = policy.calculate_retry_delay(n);
        let next = policy.calculate_retry_delay(n + 1);

        prop_assert!(delay <= policy.max_retry_delay_ms);
        prop_assert!(next >= delay);
        if n == 0 {
            prop_assert_eq!(delay, policy.retry_delay_ms.min(policy.max_retry_delay_ms));
        }
    }

    #[test]
    fn prop_exhausted_entries_never_eligible(policy in backoff_strategy(), extra in 0u32..5) {
        let mut entry = entry_with_errors(&["boom".to_string()]);
        entry.retry_count = policy.max_retries + extra;
        prop_assert!(!policy.is_eligible(&entry, i64::MAX));
    }
}

// =============================================================================
// Poison-pill classifier
// =============================================================================

proptest! {
    /// Repeating one message min_failures times always trips the detector
    #[test]
    fn prop_identical_errors_are_poison(message in message_strategy(), min_failures in 2usize..6) {
        let classifier = PoisonPillClassifier::new(PoisonPillConfig {
            enabled: true,
            min_failures,
            error_similarity_threshold: 0.8,
            action: PoisonPillAction::Quarantine,
        });
        let mut entry = entry_with_errors(&vec![message; min_failures]);

        prop_assert!(classifier.detect(&mut entry, 10));
        prop_assert_eq!(entry.status, EntryStatus::Quarantined);
        prop_assert!(entry.is_poison_pill);
        prop_assert_eq!(entry.next_retry_at, None);
    }

    /// Too few failures never trips the detector
    #[test]
    fn prop_short_history_is_not_poison(messages in prop::collection::vec(message_strategy(), 1..3)) {
        let classifier = PoisonPillClassifier::new(PoisonPillConfig {
            min_failures: 3,
            ..Default::default()
        });
        let mut entry = entry_with_errors(&messages);

        prop_assert!(!classifier.detect(&mut entry, 10));
        prop_assert_eq!(entry.status, EntryStatus::PendingRetry);
        prop_assert!(!entry.is_poison_pill);
    }
}

// =============================================================================
// Deserialization Fuzz Tests
// =============================================================================

proptest! {
    /// StoredEntry deserialization should never panic on arbitrary bytes
    #[test]
    fn fuzz_stored_entry_from_random_bytes(bytes in prop::collection::vec(any::<u8>(), 0..4096)) {
        let result: Result<StoredEntry, _> = serde_json::from_slice(&bytes);
        let _ = result;
    }

    /// StoredEntry deserialization should handle arbitrary JSON gracefully
    #[test]
    fn fuzz_stored_entry_from_arbitrary_json(json in arbitrary_json_strategy()) {
        let serialized = serde_json::to_vec(&json).unwrap();
        let result: Result<StoredEntry, _> = serde_json::from_slice(&serialized);
        let _ = result;
    }

    /// A corrupted persisted record either parses or fails cleanly
    #[test]
    fn fuzz_corrupted_stored_entry(
        message in message_strategy(),
        corruption in prop::collection::vec(any::<u8>(), 1..50),
        position in 0usize..10000,
    ) {
        let entry = entry_with_errors(&[message]);
        let serialized = serde_json::to_vec(&StoredEntry::from(&entry)).unwrap();

        let mut corrupted = serialized.clone();
        let pos = position % corrupted.len();
        for (i, b) in corruption.iter().enumerate() {
            let idx = (pos + i) % corrupted.len();
            corrupted[idx] ^= b;
        }

        if let Ok(stored) = serde_json::from_slice::<StoredEntry>(&corrupted) {
            // Whatever parsed must rebuild without panicking
            let rebuilt = stored.into_entry();
            prop_assert_eq!(rebuilt.error_history.len(), 1);
        }
    }
}
