//! The parent form: scalar fields plus one [`ArrayField`] per array-kind
//! field, with the submit / initial data / render lifecycle around them.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::ArraySettings;
use crate::domain::{FormDefinition, Record};
use crate::forms::array_field::{ArrayField, FormBinding};
use crate::forms::decoder::{KeyPathDecoder, PostedData};
use crate::forms::error::{ConfigurationError, FieldError, FormError};
use crate::forms::reconcile::ReconcileOutcome;
use crate::forms::validator::FormValidator;
use crate::persistence::{PersistenceError, RecordStore};
use crate::schema::{form_schema, form_ui_schema, SchemaError};

/// Result of a successful submission
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormSubmission {
    /// Cleaned values of the scalar fields
    pub cleaned_data: Map<String, Value>,
    /// Outcome per posted array field
    pub arrays: IndexMap<String, ReconcileOutcome>,
}

/// A form bound to an optional record, owning its array fields.
#[derive(Debug)]
pub struct SilicaForm {
    definition: FormDefinition,
    instance: Option<Record>,
    validator: FormValidator,
    array_fields: IndexMap<String, ArrayField>,
    decoder: KeyPathDecoder,
}

impl FormBinding for SilicaForm {
    fn instance(&self) -> Option<&Record> {
        self.instance.as_ref()
    }
}

impl SilicaForm {
    /// Build the form and one array field per array-kind field.
    pub fn new(
        definition: FormDefinition,
        settings: &ArraySettings,
    ) -> Result<Self, ConfigurationError> {
        let mut array_fields = IndexMap::new();
        for field in definition.array_fields() {
            array_fields.insert(
                field.name.clone(),
                ArrayField::from_definition(field, settings)?,
            );
        }

        Ok(Self {
            validator: FormValidator::new(definition.clone()),
            definition,
            instance: None,
            array_fields,
            decoder: KeyPathDecoder::new(settings.key_delimiter.clone()),
        })
    }

    /// Bind the form to the record it edits.
    pub fn with_instance(mut self, instance: Record) -> Self {
        self.instance = Some(instance);
        self.bind_fields();
        self
    }

    /// Replace the generated array field of the same name, e.g. with one
    /// filtered by parent.
    pub fn with_array_field(mut self, field: ArrayField) -> Self {
        self.array_fields.insert(field.name().to_string(), field);
        self.bind_fields();
        self
    }

    fn bind_fields(&mut self) {
        let mut fields = std::mem::take(&mut self.array_fields);
        for field in fields.values_mut() {
            field.bind(&*self);
        }
        self.array_fields = fields;
    }

    pub fn definition(&self) -> &FormDefinition {
        &self.definition
    }

    pub fn array_field(&self, name: &str) -> Option<&ArrayField> {
        self.array_fields.get(name)
    }

    pub fn array_field_mut(&mut self, name: &str) -> Option<&mut ArrayField> {
        self.array_fields.get_mut(name)
    }

    pub fn data_schema(&self) -> Value {
        form_schema(&self.definition)
    }

    pub fn ui_schema(&self) -> Result<Value, SchemaError> {
        form_ui_schema(&self.definition)
    }

    /// Values the front end starts from: refreshed rows for array fields,
    /// else the bound record's value, else the field's initial value.
    pub async fn initial_data(
        &mut self,
        store: &dyn RecordStore,
    ) -> Result<Map<String, Value>, PersistenceError> {
        let mut data = Map::new();
        for field in &self.definition.fields {
            if let Some(array) = self.array_fields.get_mut(&field.name) {
                let rows = array.initial(store).await?;
                data.insert(
                    field.name.clone(),
                    Value::Array(rows.into_iter().map(Value::Object).collect()),
                );
                continue;
            }
            let value = self
                .instance
                .as_ref()
                .and_then(|record| record.values.get(&field.name).cloned())
                .or_else(|| field.initial.clone());
            if let Some(value) = value {
                data.insert(field.name.clone(), value);
            }
        }
        Ok(data)
    }

    /// `{schema, uischema, data}` bundle embedded by a page for the front-end
    /// renderer.
    pub async fn render_context(&mut self, store: &dyn RecordStore) -> Result<Value, FormError> {
        let uischema = self.ui_schema()?;
        let data = self
            .initial_data(store)
            .await
            .map_err(|e| FormError::Field(FieldError::Persistence(e)))?;
        Ok(json!({
            "schema": self.data_schema(),
            "uischema": uischema,
            "data": data,
        }))
    }

    /// Clean the scalar fields, reconcile every posted array field and
    /// report all errors together.
    pub async fn submit(
        &mut self,
        store: &dyn RecordStore,
        data: PostedData,
    ) -> Result<FormSubmission, FormError> {
        let decoded = self.decoder.decode(data);
        let scalars = self
            .validator
            .clean(|name| decoded.value(name).cloned(), self.instance.as_ref());

        // every array is decoded before any of them touches the store
        let mut posted = IndexMap::new();
        for name in self.array_fields.keys() {
            posted.insert(name.clone(), decoded.items(name)?);
        }

        let mut submission = FormSubmission::default();
        let mut array_errors = IndexMap::new();
        for (name, field) in self.array_fields.iter_mut() {
            let items = posted.swap_remove(name).flatten();
            if let Some(outcome) = field.to_python(store, items).await? {
                submission.arrays.insert(name.clone(), outcome);
            }
            if let Err(failure) = field.validate() {
                array_errors.insert(name.clone(), failure.errors);
            }
        }

        if !scalars.is_valid() || !array_errors.is_empty() {
            tracing::info!(
                form = %self.definition.name,
                field_errors = scalars.errors.len(),
                array_errors = array_errors.len(),
                "form submission rejected"
            );
            return Err(FormError::Invalid {
                form: self.definition.name.clone(),
                fields: scalars.errors,
                arrays: array_errors,
            });
        }

        submission.cleaned_data = scalars.cleaned_data;
        Ok(submission)
    }
}
