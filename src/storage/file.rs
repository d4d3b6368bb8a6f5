// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! File-backed store writing one JSON record per line.
//!
//! The whole file is rewritten on every change (temp file + rename), which
//! is fine for the volumes a dead-letter queue sees and keeps the file
//! readable with `jq` at any point.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::traits::{DlqStore, StorageError, StoredEntry};

pub struct NdjsonFileStore {
    path: PathBuf,
    /// Loaded from disk on first use
    records: Mutex<Option<BTreeMap<String, StoredEntry>>>,
}

impl NdjsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(path: &Path) -> Result<BTreeMap<String, StoredEntry>, StorageError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = BTreeMap::new();
        for (n, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredEntry>(line) {
                Ok(record) => {
                    records.insert(record.id.clone(), record);
                }
                Err(e) => {
                    warn!(path = %path.display(), line = n + 1, error = %e, "Skipping unreadable DLQ record");
                }
            }
        }

        debug!(path = %path.display(), count = records.len(), "Loaded DLQ file");
        Ok(records)
    }

    async fn loaded<'a>(
        &self,
        slot: &'a mut Option<BTreeMap<String, StoredEntry>>,
    ) -> Result<&'a mut BTreeMap<String, StoredEntry>, StorageError> {
        if slot.is_none() {
            *slot = Some(Self::read_file(&self.path).await?);
        }
        Ok(slot.get_or_insert_with(BTreeMap::new))
    }

    async fn write_file(&self, records: &BTreeMap<String, StoredEntry>) -> Result<(), StorageError> {
        let mut ndjson = String::new();
        for record in records.values() {
            ndjson.push_str(&serde_json::to_string(record)?);
            ndjson.push('\n');
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, ndjson).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DlqStore for NdjsonFileStore {
    async fn put(&self, entry: &StoredEntry) -> Result<(), StorageError> {
        let mut guard = self.records.lock().await;
        let records = self.loaded(&mut guard).await?;
        records.insert(entry.id.clone(), entry.clone());
        self.write_file(records).await
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let mut guard = self.records.lock().await;
        let records = self.loaded(&mut guard).await?;
        if records.remove(id).is_none() {
            return Ok(());
        }
        self.write_file(records).await
    }

    async fn list(&self) -> Result<Vec<StoredEntry>, StorageError> {
        let mut guard = self.records.lock().await;
        let records = self.loaded(&mut guard).await?;
        Ok(records.values().cloned().collect())
    }

    async fn delete_batch(&self, ids: &[String]) -> Result<usize, StorageError> {
        let mut guard = self.records.lock().await;
        let records = self.loaded(&mut guard).await?;
        let removed = ids.iter().filter(|id| records.remove(id.as_str()).is_some()).count();
        if removed > 0 {
            self.write_file(records).await?;
        }
        Ok(removed)
    }
}
