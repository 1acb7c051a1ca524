//! # Silica - server-side forms with array fields
//!
//! Silica describes forms on the server, renders them as JSON Schema plus a
//! UI Schema for a JSON Forms front end, and reconciles posted lists of
//! related records ("array fields") against a record store inside one
//! transaction per field.
//!
//! ## Features
//!
//! - **Schemas**: JSON Schema and UI Schema generation with rules and per-field overrides
//! - **Array fields**: delete / create / update reconciliation with batched writes
//! - **Validation**: every item error is collected and reported at once
//! - **Stores**: SQLite, PostgreSQL and MySQL through sqlx, plus an in-memory store
//! - **Configuration**: TOML/YAML/JSON files, `SILICA__*` environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use silica::config::Settings;
//! use silica::forms::SilicaForm;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::new()?;
//!     if let Some(definition) = settings.form("organization") {
//!         let form = SilicaForm::new(definition.clone(), &settings.arrays)?;
//!         println!("{}", form.data_schema());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Domain**: form definitions, records and identifiers
//! - **Schema**: data schema and UI schema generation
//! - **Forms**: decoding, validation, reconciliation and the form lifecycle
//! - **Persistence**: record stores and migrations
//! - **Config**: configuration management

pub mod cli;
pub mod config;
pub mod domain;
pub mod forms;
pub mod persistence;
pub mod schema;
