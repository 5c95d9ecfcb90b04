use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::seeds::SeedRecord;

/// Persistence boundary for per-user seed records.
///
/// `upsert` is the only write. With `expected_version = None` it inserts only
/// when no record exists for the user; with `Some(v)` it replaces the record
/// only if the stored version is still `v`. Either mismatch is
/// [`StoreError::Conflict`]. On success the stored record (with its new
/// version) is returned.
#[async_trait]
pub trait SeedStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<SeedRecord>, StoreError>;

    async fn upsert(
        &self,
        record: SeedRecord,
        expected_version: Option<u64>,
    ) -> Result<SeedRecord, StoreError>;
}

/// Process-local store, used by tests and the offline tooling.
#[derive(Debug, Default)]
pub struct MemorySeedStore {
    records: Mutex<HashMap<String, SeedRecord>>,
}

impl MemorySeedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SeedStore for MemorySeedStore {
    async fn get(&self, user_id: &str) -> Result<Option<SeedRecord>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(records.get(user_id).cloned())
    }

    async fn upsert(
        &self,
        mut record: SeedRecord,
        expected_version: Option<u64>,
    ) -> Result<SeedRecord, StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let current = records.get(&record.user_id).map(|r| r.version);
        match (current, expected_version) {
            (None, None) => record.version = 0,
            (Some(stored), Some(expected)) if stored == expected => record.version = stored + 1,
            _ => {
                return Err(StoreError::Conflict {
                    user_id: record.user_id,
                })
            }
        }
        records.insert(record.user_id.clone(), record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_if_absent_and_versioned_update() {
        let store = MemorySeedStore::new();
        let rec = SeedRecord::generate("u1");
        let stored = store.upsert(rec.clone(), None).await.unwrap();
        assert_eq!(stored.version, 0);

        // second insert loses
        let dup = store.upsert(SeedRecord::generate("u1"), None).await;
        assert!(matches!(dup, Err(StoreError::Conflict { .. })));

        let mut next = stored.clone();
        next.nonce = 1;
        let updated = store.upsert(next.clone(), Some(0)).await.unwrap();
        assert_eq!(updated.version, 1);

        // stale version loses
        let stale = store.upsert(next, Some(0)).await;
        assert!(matches!(stale, Err(StoreError::Conflict { .. })));

        let fetched = store.get("u1").await.unwrap().unwrap();
        assert_eq!(fetched.nonce, 1);
        assert_eq!(fetched.server_seed, rec.server_seed);
    }

    #[tokio::test]
    async fn update_of_missing_record_conflicts() {
        let store = MemorySeedStore::new();
        let res = store.upsert(SeedRecord::generate("ghost"), Some(0)).await;
        assert!(matches!(res, Err(StoreError::Conflict { .. })));
        assert!(store.get("ghost").await.unwrap().is_none());
    }
}
