// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error-message similarity scoring.
//!
//! Normalized Levenshtein distance, used to decide whether an entry keeps
//! failing for the same reason.
//!
//! ```
//! use dlq_engine::similarity::{calculate_error_similarity, string_similarity};
//!
//! assert_eq!(string_similarity("", ""), 1.0);
//! assert_eq!(string_similarity("kitten", "kitten"), 1.0);
//! assert!((string_similarity("kitten", "sitting") - (1.0 - 3.0 / 7.0)).abs() < 1e-12);
//!
//! let score = calculate_error_similarity(&[
//!     "connection refused (attempt 1)",
//!     "connection refused (attempt 2)",
//!     "connection refused (attempt 3)",
//! ]);
//! assert!(score > 0.9);
//! ```

/// Edit distance with unit-cost insertion, deletion and substitution.
///
/// Works on `char`s and keeps two rolling rows sized by the shorter input.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };

    if short.is_empty() {
        return long.len();
    }

    let mut prev: Vec<usize> = (0..=short.len()).collect();
    let mut curr: Vec<usize> = vec![0; short.len() + 1];

    for (i, lc) in long.iter().enumerate() {
        curr[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let substitution = prev[j] + usize::from(lc != sc);
            let deletion = prev[j + 1] + 1;
            let insertion = curr[j] + 1;
            curr[j + 1] = substitution.min(deletion).min(insertion);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[short.len()]
}

/// `1 - distance / max_len`, in `[0, 1]`. Two empty strings score `1`.
#[must_use]
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Average similarity over every unordered pair. `0` for fewer than two messages.
#[must_use]
pub fn calculate_error_similarity<S: AsRef<str>>(messages: &[S]) -> f64 {
    if messages.len() < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, first) in messages.iter().enumerate() {
        for second in &messages[i + 1..] {
            total += string_similarity(first.as_ref(), second.as_ref());
            pairs += 1;
        }
    }

    total / pairs as f64
}
