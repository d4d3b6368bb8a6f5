use async_trait::async_trait;
use dashmap::DashMap;
use super::traits::{DlqStore, StorageError, StoredEntry};

pub struct InMemoryStore {
    data: DashMap<String, StoredEntry>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current record count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<StoredEntry> {
        self.data.get(id).map(|r| r.value().clone())
    }

    /// Clear all records
    pub fn clear(&self) {
        self.data.clear();
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DlqStore for InMemoryStore {
    async fn put(&self, entry: &StoredEntry) -> Result<(), StorageError> {
        self.data.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.data.remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredEntry>, StorageError> {
        Ok(self.data.iter().map(|r| r.value().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{DlqEntry, ErrorInfo, FailedTask};
    use serde_json::json;

    fn test_record(id: &str) -> StoredEntry {
        let entry = DlqEntry::new(
            id.to_string(),
            FailedTask::new(format!("task-{}", id), json!({"id": id})),
            ErrorInfo::new("failed"),
            0,
            1_000,
            60_000,
        );
        StoredEntry::from(&entry)
    }

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_put_and_list() {
        let store = InMemoryStore::new();
        store.put(&test_record("entry-1")).await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "entry-1");
        assert!(store.get("entry-1").is_some());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryStore::new();
        store.put(&test_record("to-delete")).await.unwrap();
        assert_eq!(store.len(), 1);

        store.delete("to-delete").await.unwrap();
        assert_eq!(store.len(), 0);
        assert!(store.get("to-delete").is_none());
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let store = InMemoryStore::new();

        // Should not error
        let result = store.delete("nonexistent").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = InMemoryStore::new();

        let mut record = test_record("same-id");
        store.put(&record).await.unwrap();
        record.retry_count = 2;
        store.put(&record).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("same-id").unwrap().retry_count, 2);
    }

    #[tokio::test]
    async fn test_delete_batch_via_trait() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store.put(&test_record(&format!("batch-{}", i))).await.unwrap();
        }

        // Use trait default implementation
        let ids: Vec<String> = (0..3).map(|i| format!("batch-{}", i)).collect();
        let deleted = store.delete_batch(&ids).await.unwrap();

        assert_eq!(deleted, 3);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryStore::new());
        let mut handles = vec![];

        // Spawn 10 tasks that each insert 10 records
        for batch in 0..10 {
            let store_clone = store.clone();
            let handle = tokio::spawn(async move {
                for i in 0..10 {
                    let record = test_record(&format!("batch-{}-entry-{}", batch, i));
                    store_clone.put(&record).await.unwrap();
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 100);
    }
}
