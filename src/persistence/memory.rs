//! Process-local record store.
//!
//! A transaction takes the store's lock for its whole lifetime and works on a
//! copy of the data, which replaces the shared state on commit. Failures can
//! be injected per operation to exercise the soft-fail paths of a
//! reconciliation pass.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::{NewRecord, Record, RecordId};
use crate::persistence::{
    LockPolicy, PersistenceError, RecordFilter, RecordStore, StoreTransaction,
};

/// Store operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Query,
    Delete,
    Create,
    Update,
    Commit,
}

impl StoreOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Delete => "delete",
            Self::Create => "create",
            Self::Update => "update",
            Self::Commit => "commit",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    collections: HashMap<String, IndexMap<RecordId, Record>>,
    next_id: i64,
    failures: HashSet<StoreOperation>,
    commits: usize,
    rollbacks: usize,
}

impl MemoryState {
    fn check(&self, operation: StoreOperation) -> Result<(), PersistenceError> {
        if self.failures.contains(&operation) {
            tracing::debug!(operation = operation.as_str(), "injected store failure");
            return Err(PersistenceError::InjectedFailure {
                operation: operation.as_str().to_string(),
            });
        }
        Ok(())
    }

    fn select(&self, filter: &RecordFilter) -> Vec<Record> {
        self.collections
            .get(&filter.collection)
            .map(|records| {
                records
                    .values()
                    .filter(|record| filter.matches(record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn insert(&mut self, collection: &str, values: Map<String, Value>) -> Record {
        self.next_id += 1;
        let record = Record::new(self.next_id, values);
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(record.id.clone(), record.clone());
        record
    }
}

/// In-memory [`RecordStore`]; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record outside any transaction, assigning the next identifier.
    pub async fn insert(&self, collection: &str, values: Map<String, Value>) -> Record {
        self.state.lock().await.insert(collection, values)
    }

    /// Every record of a collection, in insertion order.
    pub async fn records(&self, collection: &str) -> Vec<Record> {
        self.state
            .lock()
            .await
            .select(&RecordFilter::new(collection))
    }

    /// Make every later `operation` fail until [`clear_failures`] is called.
    ///
    /// [`clear_failures`]: Self::clear_failures
    pub async fn fail_on(&self, operation: StoreOperation) {
        self.state.lock().await.failures.insert(operation);
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failures.clear();
    }

    /// Number of committed and rolled back transactions so far.
    pub async fn transaction_counts(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.commits, state.rollbacks)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, PersistenceError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        tracing::debug!("began in-memory transaction");
        Ok(Box::new(InMemoryTransaction { guard, working }))
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<Record>, PersistenceError> {
        let state = self.state.lock().await;
        state.check(StoreOperation::Query)?;
        Ok(state.select(filter))
    }
}

/// Transaction over an [`InMemoryRecordStore`]
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn query(
        &mut self,
        filter: &RecordFilter,
        _lock: LockPolicy,
    ) -> Result<Vec<Record>, PersistenceError> {
        // the transaction already holds the store exclusively
        self.working.check(StoreOperation::Query)?;
        Ok(self.working.select(filter))
    }

    async fn delete(
        &mut self,
        collection: &str,
        ids: &[RecordId],
    ) -> Result<u64, PersistenceError> {
        self.working.check(StoreOperation::Delete)?;
        let Some(records) = self.working.collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut deleted = 0;
        for id in ids {
            if records.shift_remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn bulk_create(
        &mut self,
        collection: &str,
        records: Vec<NewRecord>,
        batch_size: usize,
    ) -> Result<Vec<Record>, PersistenceError> {
        self.working.check(StoreOperation::Create)?;
        let mut created = Vec::with_capacity(records.len());
        for batch in records.chunks(batch_size.max(1)) {
            for record in batch {
                created.push(self.working.insert(collection, record.values.clone()));
            }
        }
        Ok(created)
    }

    async fn bulk_update(
        &mut self,
        collection: &str,
        records: Vec<Record>,
        fields: &[String],
        batch_size: usize,
    ) -> Result<u64, PersistenceError> {
        self.working.check(StoreOperation::Update)?;
        let stored = self
            .working
            .collections
            .entry(collection.to_string())
            .or_default();
        let mut updated = 0;
        for batch in records.chunks(batch_size.max(1)) {
            for record in batch {
                let existing = stored
                    .get_mut(&record.id)
                    .ok_or_else(|| PersistenceError::not_found(collection, &record.id))?;
                for field in fields {
                    if let Some(value) = record.values.get(field) {
                        existing.values.insert(field.clone(), value.clone());
                    }
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError> {
        let InMemoryTransaction { mut guard, mut working } = *self;
        working.check(StoreOperation::Commit)?;
        working.commits += 1;
        *guard = working;
        tracing::debug!("committed in-memory transaction");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError> {
        let mut guard = self.guard;
        guard.rollbacks += 1;
        tracing::debug!("rolled back in-memory transaction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(name: &str) -> Map<String, Value> {
        let mut values = Map::new();
        values.insert("name".into(), json!(name));
        values
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = InMemoryRecordStore::new();
        let first = store.insert("members", values("A")).await;

        let mut tx = store.begin().await.unwrap();
        tx.delete("members", &[first.id.clone()]).await.unwrap();
        let created = tx
            .bulk_create("members", vec![NewRecord::new(values("B"))], 200)
            .await
            .unwrap();
        assert_eq!(created[0].id, RecordId::from(2));
        tx.commit().await.unwrap();

        let records = store.records("members").await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].values["name"], "B");
        assert_eq!(store.transaction_counts().await, (1, 0));
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = InMemoryRecordStore::new();
        store.insert("members", values("A")).await;

        let mut tx = store.begin().await.unwrap();
        tx.bulk_create("members", vec![NewRecord::new(values("B"))], 1)
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.records("members").await.len(), 1);
        assert_eq!(store.transaction_counts().await, (0, 1));
    }

    #[tokio::test]
    async fn test_update_only_touches_listed_fields() {
        let store = InMemoryRecordStore::new();
        let mut initial = values("A");
        initial.insert("secret".into(), json!("s"));
        let record = store.insert("members", initial).await;

        let mut changed = record.clone();
        changed.values.insert("name".into(), json!("A2"));
        changed.values.insert("secret".into(), json!("leaked"));

        let mut tx = store.begin().await.unwrap();
        let updated = tx
            .bulk_update("members", vec![changed], &["name".to_string()], 200)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(updated, 1);
        let stored = &store.records("members").await[0];
        assert_eq!(stored.values["name"], "A2");
        assert_eq!(stored.values["secret"], "s");
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = InMemoryRecordStore::new();
        store.fail_on(StoreOperation::Create).await;

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .bulk_create("members", vec![NewRecord::default()], 200)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::InjectedFailure { .. }));
        tx.rollback().await.unwrap();

        store.clear_failures().await;
        let filter = RecordFilter::new("members");
        assert!(store.query(&filter).await.unwrap().is_empty());
    }
}
