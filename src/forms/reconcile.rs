//! Array reconciliation engine.
//!
//! A pass runs in two steps. [`Reconciler::plan`] is pure: it diffs the
//! posted items against the current records, validates every item, and
//! produces the delete, create and update sets together with the errors
//! found on the way. [`Reconciler::apply`] then issues the three store
//! operations, in that order, inside the caller's transaction.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::{
    summarize_errors, ErrorMap, NewRecord, PostedItem, Record, RecordId, NON_FIELD_ERRORS,
};
use crate::forms::error::ArrayErrors;
use crate::forms::hooks::{CreateHook, DeleteHook};
use crate::forms::validator::ItemValidator;
use crate::persistence::StoreTransaction;

pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Store operations computed for one pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Current records whose identifier was not posted
    pub deletes: Vec<RecordId>,
    pub creates: Vec<NewRecord>,
    /// Existing records with their cleaned values applied
    pub updates: Vec<Record>,
    pub errors: ArrayErrors,
}

impl ReconcilePlan {
    pub fn is_noop(&self) -> bool {
        self.deletes.is_empty() && self.creates.is_empty() && self.updates.is_empty()
    }
}

/// What a pass actually wrote, plus every error it recorded
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileOutcome {
    pub deleted: Vec<RecordId>,
    pub created: Vec<Record>,
    pub updated: Vec<Record>,
    /// False when the pass was rolled back
    pub committed: bool,
    #[serde(skip_serializing_if = "ArrayErrors::is_empty")]
    pub errors: ArrayErrors,
}

/// Diffs posted items against current records and commits the difference.
pub struct Reconciler {
    validator: Arc<dyn ItemValidator>,
    collection: String,
    identifier_field: String,
    batch_size: usize,
    defaults: Map<String, Value>,
    parent: Option<RecordId>,
    create_hook: Option<Arc<dyn CreateHook>>,
    delete_hook: Option<Arc<dyn DeleteHook>>,
}

impl Reconciler {
    pub fn new(validator: Arc<dyn ItemValidator>, collection: impl Into<String>) -> Self {
        Self {
            validator,
            collection: collection.into(),
            identifier_field: "pk".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            defaults: Map::new(),
            parent: None,
            create_hook: None,
            delete_hook: None,
        }
    }

    pub fn identifier_field(mut self, field: impl Into<String>) -> Self {
        self.identifier_field = field.into();
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Values merged into every created record, after the cleaned data.
    pub fn defaults(mut self, defaults: Map<String, Value>) -> Self {
        self.defaults = defaults;
        self
    }

    /// Identifier of the record owning this collection, handed to the
    /// create hook.
    pub fn parent(mut self, parent: Option<RecordId>) -> Self {
        self.parent = parent;
        self
    }

    pub fn create_hook(mut self, hook: Option<Arc<dyn CreateHook>>) -> Self {
        self.create_hook = hook;
        self
    }

    pub fn delete_hook(mut self, hook: Option<Arc<dyn DeleteHook>>) -> Self {
        self.delete_hook = hook;
        self
    }

    /// Compute the delete, create and update sets for `posted` against
    /// `current`.
    ///
    /// Create versus update is decided only by whether an item carries a
    /// non-empty identifier. An identifier that is not among `current` is an
    /// error for that identifier, never a create.
    pub fn plan(&self, posted: Vec<PostedItem>, current: &[Record]) -> ReconcilePlan {
        let lookup: IndexMap<&RecordId, &Record> =
            current.iter().map(|record| (&record.id, record)).collect();

        let posted_ids: HashSet<RecordId> = posted
            .iter()
            .filter_map(|item| item.identifier(&self.identifier_field))
            .collect();

        let mut plan = ReconcilePlan {
            deletes: current
                .iter()
                .filter(|record| !posted_ids.contains(&record.id))
                .map(|record| record.id.clone())
                .collect(),
            ..Default::default()
        };

        let mut seen = HashSet::new();
        for mut item in posted {
            match item.take_identifier(&self.identifier_field) {
                Some(id) => {
                    if !seen.insert(id.clone()) {
                        plan.errors.push_update(
                            id.clone(),
                            non_field(format!(
                                "Duplicate item with {} '{}' in this submission.",
                                self.identifier_field, id
                            )),
                        );
                        continue;
                    }
                    let Some(&record) = lookup.get(&id) else {
                        plan.errors.push_update(
                            id.clone(),
                            non_field(format!(
                                "No record with {} '{}' exists in this collection.",
                                self.identifier_field, id
                            )),
                        );
                        continue;
                    };
                    let result = self.validator.validate(item, Some(record));
                    if result.is_valid() {
                        let mut updated = record.clone();
                        updated.values.extend(result.cleaned_data);
                        plan.updates.push(updated);
                    } else {
                        plan.errors.push_update(id, result.errors);
                    }
                }
                None => {
                    let result = self.validator.validate(item, None);
                    if result.is_valid() {
                        let mut values = result.cleaned_data;
                        values.extend(self.defaults.clone());
                        let record = match &self.create_hook {
                            Some(hook) => hook.new_record(self.parent.as_ref(), values),
                            None => NewRecord::new(values),
                        };
                        plan.creates.push(record);
                    } else {
                        plan.errors.push(format!(
                            "There was an error creating an item. {}",
                            summarize_errors(&result.errors)
                        ));
                    }
                }
            }
        }

        tracing::debug!(
            collection = %self.collection,
            deletes = plan.deletes.len(),
            creates = plan.creates.len(),
            updates = plan.updates.len(),
            errors = plan.errors.messages().len(),
            "planned reconciliation"
        );
        plan
    }

    /// Issue the plan's deletes, creates and updates inside `tx`.
    ///
    /// Each operation's failure is recorded as a non-field error and does
    /// not stop the operations after it.
    pub async fn apply(
        &self,
        plan: ReconcilePlan,
        tx: &mut dyn StoreTransaction,
    ) -> ReconcileOutcome {
        let ReconcilePlan {
            deletes,
            creates,
            updates,
            errors,
        } = plan;
        let mut outcome = ReconcileOutcome {
            errors,
            ..Default::default()
        };

        if !deletes.is_empty() {
            let deleted = match &self.delete_hook {
                Some(hook) => hook.delete(tx, &self.collection, &deletes).await,
                None => tx.delete(&self.collection, &deletes).await,
            };
            match deleted {
                Ok(count) => {
                    tracing::info!(collection = %self.collection, count, "deleted records");
                    outcome.deleted = deletes;
                }
                Err(e) => {
                    tracing::warn!(collection = %self.collection, error = %e, "delete failed");
                    outcome
                        .errors
                        .push(format!("There was an error deleting items: {}", e));
                }
            }
        }

        if !creates.is_empty() {
            match tx
                .bulk_create(&self.collection, creates, self.batch_size)
                .await
            {
                Ok(created) => {
                    tracing::info!(collection = %self.collection, count = created.len(), "created records");
                    outcome.created = created;
                }
                Err(e) => {
                    tracing::warn!(collection = %self.collection, error = %e, "bulk create failed");
                    outcome
                        .errors
                        .push(format!("There was an error creating new objects: {}", e));
                }
            }
        }

        if !updates.is_empty() {
            let fields = self.validator.declared_fields();
            match tx
                .bulk_update(&self.collection, updates.clone(), &fields, self.batch_size)
                .await
            {
                Ok(count) => {
                    tracing::info!(collection = %self.collection, count, "updated records");
                    outcome.updated = updates;
                }
                Err(e) => {
                    tracing::warn!(collection = %self.collection, error = %e, "bulk update failed");
                    outcome
                        .errors
                        .push(format!("There was an error updating existing objects: {}", e));
                }
            }
        }

        outcome
    }
}

fn non_field(message: String) -> ErrorMap {
    let mut errors = ErrorMap::new();
    errors.insert(NON_FIELD_ERRORS.to_string(), vec![message]);
    errors
}
