//! Forms runtime: posted data decoding, item validation, array field
//! reconciliation and the parent form lifecycle.
//!
//! # Example
//!
//! ```rust,no_run
//! use silica::config::ArraySettings;
//! use silica::domain::{FieldDefinition, FieldKind, FormDefinition};
//! use silica::forms::{PostedData, SilicaForm};
//! use silica::persistence::InMemoryRecordStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let member = FormDefinition::new("member")
//!         .with_model("members")
//!         .with_field(FieldDefinition::text("email"));
//!     let definition = FormDefinition::new("organization")
//!         .with_field(FieldDefinition::text("title"))
//!         .with_field(FieldDefinition::new("members", FieldKind::array(member)));
//!
//!     let store = InMemoryRecordStore::new();
//!     let mut form = SilicaForm::new(definition, &ArraySettings::default())?;
//!     let posted = PostedData::from_pairs([
//!         ("title", "Acme"),
//!         ("members.0.email", "ada@acme.io"),
//!     ]);
//!     let submission = form.submit(&store, posted).await?;
//!     println!("{:?}", submission.arrays["members"].created);
//!     Ok(())
//! }
//! ```

pub mod array_field;
pub mod decoder;
pub mod error;
pub mod form;
pub mod hooks;
pub mod reconcile;
pub mod validator;

pub use array_field::{ArrayField, ArrayFieldBuilder, FormBinding};
pub use decoder::{DecodedData, KeyPathDecoder, PostedData};
pub use error::{
    ArrayErrors, ArrayValidationError, ConfigurationError, DecodeError, FieldError, FormError,
};
pub use form::{FormSubmission, SilicaForm};
pub use hooks::{CreateHook, DeleteHook, SoftDelete};
pub use reconcile::{ReconcileOutcome, ReconcilePlan, Reconciler, DEFAULT_BATCH_SIZE};
pub use validator::{FormValidator, ItemValidation, ItemValidator};
