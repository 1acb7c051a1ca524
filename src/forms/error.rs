//! Error types for form binding, array fields and submission

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::domain::{summarize_errors, ErrorMap, RecordId};
use crate::persistence::PersistenceError;
use crate::schema::SchemaError;

/// Errors decoding a posted body into a `PostedData` snapshot
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Posted body must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("Invalid percent-encoding in posted body: {0}")]
    InvalidEncoding(String),

    #[error("Item {index} of array field '{field}' must be an object, got {found}")]
    MalformedItem {
        field: String,
        index: usize,
        found: &'static str,
    },
}

/// Setup failures detected while constructing an array field.
///
/// These are programming errors and are never recovered from.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Array field '{field}' has no item form; an item form is required")]
    MissingItemForm { field: String },

    #[error("Item form '{form}' of array field '{field}' must be bound to a record collection")]
    NotRecordForm { field: String, form: String },

    #[error("Field '{field}' is a {kind} field, not an array field")]
    NotArrayField { field: String, kind: String },

    #[error("Array field '{field}' needs a batch size greater than zero")]
    InvalidBatchSize { field: String },

    #[error("Array field '{field}' needs a non-empty identifier field")]
    EmptyIdentifierField { field: String },

    #[error("Array field '{field}' filters by parent but the form has no bound instance")]
    MissingParent { field: String },
}

/// Errors collected during one reconciliation pass of an array field.
///
/// Update errors are keyed by record identifier; errors that cannot be
/// attributed to an existing record (store failures, invalid new items) are
/// kept in `non_field`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArrayErrors {
    pub non_field: Vec<String>,
    pub update_errors: IndexMap<RecordId, Vec<ErrorMap>>,
}

impl ArrayErrors {
    pub fn is_empty(&self) -> bool {
        self.non_field.is_empty() && self.update_errors.is_empty()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.non_field.push(message.into());
    }

    pub fn push_update(&mut self, id: RecordId, errors: ErrorMap) {
        self.update_errors.entry(id).or_default().push(errors);
    }

    pub fn extend(&mut self, other: ArrayErrors) {
        self.non_field.extend(other.non_field);
        for (id, errors) in other.update_errors {
            self.update_errors.entry(id).or_default().extend(errors);
        }
    }

    /// Every message as one flat list, non-field errors first.
    pub fn messages(&self) -> Vec<String> {
        let mut messages = self.non_field.clone();
        for (id, errors) in &self.update_errors {
            for error in errors {
                messages.push(format!("Item {}: {}", id, summarize_errors(error)));
            }
        }
        messages
    }
}

/// Structured validation failure raised by an array field after a
/// reconciliation pass recorded errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct ArrayValidationError {
    pub field: String,
    pub errors: ArrayErrors,
}

impl fmt::Display for ArrayValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Field '{}' has errors: {}",
            self.field,
            self.errors.messages().join(" | ")
        )
    }
}

/// Fatal errors of an array field's `to_python` step
#[derive(Debug, Error)]
pub enum FieldError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Store error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Errors of a parent form submission
#[derive(Debug, Error)]
pub enum FormError {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Form '{form}' is invalid")]
    Invalid {
        form: String,
        /// Errors of plain fields
        fields: ErrorMap,
        /// Errors of array fields, by field name
        arrays: IndexMap<String, ArrayErrors>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_include_identifiers() {
        let mut errors = ArrayErrors::default();
        errors.push("There was an error creating new objects.");
        let mut item = ErrorMap::new();
        item.insert("email".into(), vec!["This field is required.".into()]);
        errors.push_update(RecordId::from("4"), item);

        assert_eq!(
            errors.messages(),
            vec![
                "There was an error creating new objects.".to_string(),
                "Item 4: email: This field is required.".to_string(),
            ]
        );

        let failure = ArrayValidationError {
            field: "members".into(),
            errors,
        };
        assert!(failure.to_string().starts_with("Field 'members' has errors"));
    }
}
