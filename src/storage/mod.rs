// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Persistence adapters for dead-letter entries.
//!
//! - [`traits`]: the [`DlqStore`] seam and the persisted [`StoredEntry`] record
//! - [`memory`]: `DashMap`-backed store for tests and single-process use
//! - [`file`]: NDJSON file store

pub mod traits;
pub mod memory;
pub mod file;

pub use traits::{DlqStore, StorageError, StoredEntry};
pub use memory::InMemoryStore;
pub use file::NdjsonFileStore;
