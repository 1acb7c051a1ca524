//! JSON Schema and UI Schema generation for form definitions.
//!
//! - `data_schema`: field kinds -> JSON Schema fragments
//! - `ui_schema`: layout tree and per-field controls
//! - `rules`: conditional show/hide/enable/disable rules
//! - `field_config`: per-field overrides of both documents

pub mod data_schema;
pub mod error;
pub mod field_config;
pub mod rules;
pub mod ui_schema;

pub use data_schema::{field_schema, form_properties, form_schema};
pub use error::SchemaError;
pub use field_config::FieldConfig;
pub use rules::{Combinator, Condition, Effect, Rule};
pub use ui_schema::{form_ui_schema, Control, UiElement, UiSchemaBuilder};
