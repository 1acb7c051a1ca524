//! Array field lifecycle.
//!
//! An [`ArrayField`] edits the collection of records behind one array-kind
//! field of a form. Its state per request:
//!
//! - uninitialized: nothing fetched yet
//! - loaded: current records, the identifier lookup table and the initial
//!   rows shown to the front end
//!
//! `to_python` clears the cache, re-reads the records inside a transaction,
//! reconciles the posted items against them and clears the cache again, so a
//! later read always reflects what was committed.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::ArraySettings;
use crate::domain::{FieldDefinition, FieldKind, PostedItem, Record, RecordId};
use crate::forms::error::{ArrayErrors, ArrayValidationError, ConfigurationError, FieldError};
use crate::forms::hooks::{CreateHook, DeleteHook};
use crate::forms::reconcile::{ReconcileOutcome, Reconciler, DEFAULT_BATCH_SIZE};
use crate::forms::validator::{FormValidator, ItemValidator};
use crate::persistence::{LockPolicy, PersistenceError, RecordFilter, RecordStore};

/// Capability an array field needs from the form that owns it.
pub trait FormBinding: Send + Sync {
    /// Record the form is editing, if any.
    fn instance(&self) -> Option<&Record>;
}

/// Cached state of a loaded field
#[derive(Debug, Clone, Default)]
struct Loaded {
    records: Vec<Record>,
    lookup: IndexMap<RecordId, usize>,
    initial: Vec<Map<String, Value>>,
}

/// Builder for [`ArrayField`]
pub struct ArrayFieldBuilder {
    name: String,
    validator: Option<Arc<dyn ItemValidator>>,
    identifier_field: String,
    batch_size: usize,
    lock_policy: LockPolicy,
    rollback_on_error: bool,
    min_items: Option<usize>,
    max_items: Option<usize>,
    parent_link: Option<String>,
    new_item_defaults: Map<String, Value>,
    create_hook: Option<Arc<dyn CreateHook>>,
    delete_hook: Option<Arc<dyn DeleteHook>>,
}

impl ArrayFieldBuilder {
    /// Validator for the nested item form.
    pub fn validator(mut self, validator: Arc<dyn ItemValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn identifier_field(mut self, field: impl Into<String>) -> Self {
        self.identifier_field = field.into();
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    /// Roll the whole pass back when any error was recorded.
    pub fn rollback_on_error(mut self, rollback: bool) -> Self {
        self.rollback_on_error = rollback;
        self
    }

    pub fn min_items(mut self, min: Option<usize>) -> Self {
        self.min_items = min;
        self
    }

    pub fn max_items(mut self, max: Option<usize>) -> Self {
        self.max_items = max;
        self
    }

    /// Only edit records whose `link_field` holds the parent form's record
    /// identifier; created records get it set.
    pub fn filter_by_parent(mut self, link_field: impl Into<String>) -> Self {
        self.parent_link = Some(link_field.into());
        self
    }

    /// Extra values written into every created record.
    pub fn new_item_defaults(mut self, defaults: Map<String, Value>) -> Self {
        self.new_item_defaults = defaults;
        self
    }

    /// Build created records with `hook`; it receives the parent identifier
    /// and the cleaned values merged with the new-item defaults.
    pub fn create_with(mut self, hook: impl CreateHook + 'static) -> Self {
        self.create_hook = Some(Arc::new(hook));
        self
    }

    /// Hand unposted records to `hook` instead of deleting them.
    pub fn delete_with(mut self, hook: impl DeleteHook + 'static) -> Self {
        self.delete_hook = Some(Arc::new(hook));
        self
    }

    /// Apply batch size, lock policy and rollback behavior from settings.
    pub fn settings(self, settings: &ArraySettings) -> Self {
        self.batch_size(settings.batch_size)
            .lock_policy(settings.lock_policy)
            .rollback_on_error(settings.rollback_on_error)
    }

    pub fn build(self) -> Result<ArrayField, ConfigurationError> {
        let validator = self.validator.ok_or_else(|| ConfigurationError::MissingItemForm {
            field: self.name.clone(),
        })?;
        let form = validator.form();
        let Some(collection) = form.model.clone() else {
            return Err(ConfigurationError::NotRecordForm {
                field: self.name,
                form: form.name.clone(),
            });
        };
        if self.batch_size == 0 {
            return Err(ConfigurationError::InvalidBatchSize { field: self.name });
        }
        if self.identifier_field.trim().is_empty() {
            return Err(ConfigurationError::EmptyIdentifierField { field: self.name });
        }

        Ok(ArrayField {
            name: self.name,
            validator,
            collection,
            identifier_field: self.identifier_field,
            batch_size: self.batch_size,
            lock_policy: self.lock_policy,
            rollback_on_error: self.rollback_on_error,
            min_items: self.min_items,
            max_items: self.max_items,
            parent_link: self.parent_link,
            new_item_defaults: self.new_item_defaults,
            create_hook: self.create_hook,
            delete_hook: self.delete_hook,
            parent: None,
            state: None,
            errors: ArrayErrors::default(),
        })
    }
}

/// Stateful field reconciling posted items against a record collection.
pub struct ArrayField {
    name: String,
    validator: Arc<dyn ItemValidator>,
    collection: String,
    identifier_field: String,
    batch_size: usize,
    lock_policy: LockPolicy,
    rollback_on_error: bool,
    min_items: Option<usize>,
    max_items: Option<usize>,
    parent_link: Option<String>,
    new_item_defaults: Map<String, Value>,
    create_hook: Option<Arc<dyn CreateHook>>,
    delete_hook: Option<Arc<dyn DeleteHook>>,
    parent: Option<RecordId>,
    /// `None` while uninitialized
    state: Option<Loaded>,
    errors: ArrayErrors,
}

impl std::fmt::Debug for ArrayField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayField")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("identifier_field", &self.identifier_field)
            .field("loaded", &self.state.is_some())
            .field("errors", &self.errors)
            .finish()
    }
}

impl ArrayField {
    pub fn builder(name: impl Into<String>) -> ArrayFieldBuilder {
        let defaults = ArraySettings::default();
        ArrayFieldBuilder {
            name: name.into(),
            validator: None,
            identifier_field: defaults.identifier_field,
            batch_size: DEFAULT_BATCH_SIZE,
            lock_policy: defaults.lock_policy,
            rollback_on_error: defaults.rollback_on_error,
            min_items: None,
            max_items: None,
            parent_link: None,
            new_item_defaults: Map::new(),
            create_hook: None,
            delete_hook: None,
        }
    }

    /// Build the field for an array-kind field definition.
    pub fn from_definition(
        field: &FieldDefinition,
        settings: &ArraySettings,
    ) -> Result<Self, ConfigurationError> {
        let FieldKind::Array {
            form,
            identifier_field,
            min_items,
            max_items,
            ..
        } = &field.kind
        else {
            return Err(ConfigurationError::NotArrayField {
                field: field.name.clone(),
                kind: field.kind.tag().to_string(),
            });
        };

        Self::builder(&field.name)
            .validator(Arc::new(FormValidator::new((**form).clone())))
            .settings(settings)
            .identifier_field(identifier_field)
            .min_items(*min_items)
            .max_items(*max_items)
            .build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn identifier_field(&self) -> &str {
        &self.identifier_field
    }

    pub fn validator(&self) -> &Arc<dyn ItemValidator> {
        &self.validator
    }

    /// Attach the owning form; its record becomes the parent for
    /// `filter_by_parent`.
    pub fn bind(&mut self, form: &dyn FormBinding) {
        let parent = form.instance().map(|record| record.id.clone());
        if parent != self.parent {
            self.invalidate();
        }
        self.parent = parent;
    }

    pub fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    /// Drop the cached records.
    pub fn invalidate(&mut self) {
        self.state = None;
    }

    /// Errors recorded by the last `to_python` pass.
    pub fn errors(&self) -> &ArrayErrors {
        &self.errors
    }

    /// Filter selecting this field's records; `None` when the field follows
    /// a parent that does not exist yet.
    fn filter(&self) -> Option<RecordFilter> {
        let filter = RecordFilter::new(&self.collection);
        match (&self.parent_link, &self.parent) {
            (None, _) => Some(filter),
            (Some(link), Some(parent)) => Some(filter.eq(link, parent.to_value())),
            (Some(_), None) => None,
        }
    }

    fn load_from(&self, records: Vec<Record>) -> Loaded {
        let lookup = records
            .iter()
            .enumerate()
            .map(|(index, record)| (record.id.clone(), index))
            .collect();
        let initial = records
            .iter()
            .map(|record| {
                let mut row = self.validator.initial(record);
                row.insert(self.identifier_field.clone(), record.id.to_value());
                row
            })
            .collect();
        Loaded {
            records,
            lookup,
            initial,
        }
    }

    /// Fetch the current records and rebuild the cache.
    pub async fn refresh(&mut self, store: &dyn RecordStore) -> Result<(), PersistenceError> {
        let records = match self.filter() {
            Some(filter) => store.query(&filter).await?,
            None => Vec::new(),
        };
        tracing::debug!(field = %self.name, count = records.len(), "refreshed array field");
        self.state = Some(self.load_from(records));
        Ok(())
    }

    async fn loaded(&mut self, store: &dyn RecordStore) -> Result<&Loaded, PersistenceError> {
        if self.state.is_none() {
            self.refresh(store).await?;
        }
        Ok(self.state.get_or_insert_with(Loaded::default))
    }

    /// Current records, loading them on first access.
    pub async fn records(&mut self, store: &dyn RecordStore) -> Result<&[Record], PersistenceError> {
        Ok(self.loaded(store).await?.records.as_slice())
    }

    /// Record with the given identifier among the current records.
    pub async fn lookup(
        &mut self,
        store: &dyn RecordStore,
        id: &RecordId,
    ) -> Result<Option<&Record>, PersistenceError> {
        let loaded = self.loaded(store).await?;
        Ok(loaded.lookup.get(id).map(|&index| &loaded.records[index]))
    }

    /// Initial rows for the front end: one per current record, carrying its
    /// identifier.
    pub async fn initial(
        &mut self,
        store: &dyn RecordStore,
    ) -> Result<Vec<Map<String, Value>>, PersistenceError> {
        Ok(self.loaded(store).await?.initial.clone())
    }

    fn count_error(&self, count: usize) -> Option<String> {
        if let Some(min) = self.min_items.filter(|min| count < *min) {
            return Some(format!("Please submit at least {} items.", min));
        }
        if let Some(max) = self.max_items.filter(|max| count > *max) {
            return Some(format!("Please submit at most {} items.", max));
        }
        None
    }

    fn reconciler(&self) -> Reconciler {
        let mut defaults = self.new_item_defaults.clone();
        if let (Some(link), Some(parent)) = (&self.parent_link, &self.parent) {
            defaults.insert(link.clone(), parent.to_value());
        }
        Reconciler::new(self.validator.clone(), self.collection.clone())
            .identifier_field(self.identifier_field.clone())
            .batch_size(self.batch_size)
            .defaults(defaults)
            .parent(self.parent.clone())
            .create_hook(self.create_hook.clone())
            .delete_hook(self.delete_hook.clone())
    }

    /// Reconcile posted items against the store.
    ///
    /// `None` means the field was not posted and nothing happens. An empty
    /// list deletes every current record. Returns the outcome of the pass;
    /// recorded errors are also kept for [`validate`](Self::validate).
    pub async fn to_python(
        &mut self,
        store: &dyn RecordStore,
        items: Option<Vec<PostedItem>>,
    ) -> Result<Option<ReconcileOutcome>, FieldError> {
        self.errors = ArrayErrors::default();
        let Some(items) = items else {
            tracing::debug!(field = %self.name, "array field not posted, skipping");
            return Ok(None);
        };
        self.invalidate();

        if let Some(message) = self.count_error(items.len()) {
            self.errors.push(message);
            return Ok(Some(ReconcileOutcome {
                errors: self.errors.clone(),
                ..Default::default()
            }));
        }

        let filter = self.filter().ok_or_else(|| ConfigurationError::MissingParent {
            field: self.name.clone(),
        })?;

        let mut tx = store.begin().await?;
        let current = match tx.query(&filter, self.lock_policy).await {
            Ok(records) => records,
            Err(e) => {
                tx.rollback().await?;
                return Err(e.into());
            }
        };

        let reconciler = self.reconciler();
        let plan = reconciler.plan(items, &current);
        let mut outcome = reconciler.apply(plan, tx.as_mut()).await;

        if outcome.errors.is_empty() || !self.rollback_on_error {
            tx.commit().await?;
            outcome.committed = true;
            tracing::info!(field = %self.name, "committed array field");
        } else {
            tx.rollback().await?;
            outcome.deleted.clear();
            outcome.created.clear();
            outcome.updated.clear();
            tracing::warn!(
                field = %self.name,
                errors = outcome.errors.messages().len(),
                "rolled back array field"
            );
        }

        self.errors = outcome.errors.clone();
        self.invalidate();
        Ok(Some(outcome))
    }

    /// Raise every error recorded by the last pass.
    pub fn validate(&self) -> Result<(), ArrayValidationError> {
        if self.errors.is_empty() {
            return Ok(());
        }
        Err(ArrayValidationError {
            field: self.name.clone(),
            errors: self.errors.clone(),
        })
    }
}
