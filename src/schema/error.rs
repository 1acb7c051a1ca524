//! Schema generation error types

use thiserror::Error;

/// Errors raised while composing a data schema or UI schema
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A Categorization may only hold Category children
    #[error("Categorization elements may not have any non-Category direct children (found {found})")]
    InvalidCategorization { found: String },

    /// A layout control names a field the form does not declare
    #[error("Form '{form}' has no field named '{field}'")]
    UnknownField { form: String, field: String },

    /// No form definition with this name is known
    #[error("Unknown form: '{0}'")]
    UnknownForm(String),
}
