//! Per-field hooks replacing the default create and delete steps of a
//! reconciliation pass.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::{NewRecord, Record, RecordId};
use crate::persistence::{PersistenceError, StoreTransaction};

/// Builds the record inserted for a valid new item.
///
/// `values` already holds the cleaned item data merged with the field's
/// new-item defaults. `parent` is the identifier of the record the owning
/// form edits, if it is bound to one.
pub trait CreateHook: Send + Sync {
    fn new_record(&self, parent: Option<&RecordId>, values: Map<String, Value>) -> NewRecord;
}

impl<F> CreateHook for F
where
    F: Fn(Option<&RecordId>, Map<String, Value>) -> NewRecord + Send + Sync,
{
    fn new_record(&self, parent: Option<&RecordId>, values: Map<String, Value>) -> NewRecord {
        self(parent, values)
    }
}

/// Handles the records that were not posted back, in place of a hard delete.
#[async_trait]
pub trait DeleteHook: Send + Sync {
    /// Returns how many records were handled.
    async fn delete(
        &self,
        tx: &mut dyn StoreTransaction,
        collection: &str,
        ids: &[RecordId],
    ) -> Result<u64, PersistenceError>;
}

/// Marks unposted records by setting a boolean field instead of removing them.
#[derive(Debug, Clone)]
pub struct SoftDelete {
    field: String,
    batch_size: usize,
}

impl SoftDelete {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            batch_size: crate::forms::reconcile::DEFAULT_BATCH_SIZE,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

#[async_trait]
impl DeleteHook for SoftDelete {
    async fn delete(
        &self,
        tx: &mut dyn StoreTransaction,
        collection: &str,
        ids: &[RecordId],
    ) -> Result<u64, PersistenceError> {
        let marked = ids
            .iter()
            .map(|id| {
                let mut values = Map::new();
                values.insert(self.field.clone(), Value::Bool(true));
                Record::new(id.clone(), values)
            })
            .collect();
        tx.bulk_update(
            collection,
            marked,
            std::slice::from_ref(&self.field),
            self.batch_size,
        )
        .await
    }
}
