use std::collections::HashMap;
use thiserror::Error;

use crate::config::{ArraySettings, Settings};
use crate::domain::{FieldKind, FormDefinition};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Cross-reference error: {0}")]
    CrossReference(String),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),
}

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(settings: &Settings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_arrays(&settings.arrays) {
            errors.extend(e);
        }

        if settings.persistence.url.is_empty() {
            errors.push(ValidationError::MissingField("persistence.url".to_string()));
        }
        if settings.persistence.max_connections == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "persistence.max_connections".to_string(),
                reason: "At least one connection is required".to_string(),
            });
        }

        let mut seen_names = HashMap::new();
        for (idx, form) in settings.forms.iter().enumerate() {
            if let Some(prev_idx) = seen_names.insert(&form.name, idx) {
                errors.push(ValidationError::Duplicate(format!(
                    "Form name '{}' appears at indices {} and {}",
                    form.name, prev_idx, idx
                )));
            }
            Self::validate_form(form, &format!("forms[{}]", idx), &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_arrays(arrays: &ArraySettings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if arrays.batch_size == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "arrays.batch_size".to_string(),
                reason: "Batch size must be greater than 0".to_string(),
            });
        }
        if arrays.identifier_field.trim().is_empty() {
            errors.push(ValidationError::MissingField(
                "arrays.identifier_field".to_string(),
            ));
        }
        if arrays.key_delimiter.is_empty() {
            errors.push(ValidationError::MissingField("arrays.key_delimiter".to_string()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Checks one form and, recursively, the forms nested in its fields.
    fn validate_form(form: &FormDefinition, path: &str, errors: &mut Vec<ValidationError>) {
        if form.name.is_empty() {
            errors.push(ValidationError::MissingField(format!("{}.name", path)));
        }

        let mut seen_fields = HashMap::new();
        for (idx, field) in form.fields.iter().enumerate() {
            if let Some(prev_idx) = seen_fields.insert(&field.name, idx) {
                errors.push(ValidationError::Duplicate(format!(
                    "Field name '{}' of form '{}' appears at indices {} and {}",
                    field.name, form.name, prev_idx, idx
                )));
            }
            if field.name.is_empty() {
                errors.push(ValidationError::MissingField(format!(
                    "{}.fields[{}].name",
                    path, idx
                )));
            }

            let field_path = format!("{}.fields[{}]", path, idx);
            match &field.kind {
                FieldKind::Array {
                    form: item_form,
                    identifier_field,
                    min_items,
                    max_items,
                    ..
                } => {
                    if item_form.model.is_none() {
                        errors.push(ValidationError::InvalidValue {
                            field: field_path.clone(),
                            reason: format!(
                                "Item form '{}' must be bound to a record collection",
                                item_form.name
                            ),
                        });
                    }
                    if identifier_field.trim().is_empty() {
                        errors.push(ValidationError::MissingField(format!(
                            "{}.kind.identifier_field",
                            field_path
                        )));
                    }
                    if let (Some(min), Some(max)) = (min_items, max_items) {
                        if min > max {
                            errors.push(ValidationError::InvalidValue {
                                field: field_path.clone(),
                                reason: format!("min_items {} exceeds max_items {}", min, max),
                            });
                        }
                    }
                    Self::validate_form(item_form, &format!("{}.kind.form", field_path), errors);
                }
                FieldKind::Object { form: nested } => {
                    Self::validate_form(nested, &format!("{}.kind.form", field_path), errors);
                }
                _ => {}
            }
        }

        for (name, rule) in &form.rules {
            if form.field(name).is_none() {
                errors.push(ValidationError::CrossReference(format!(
                    "Rule in form '{}' targets unknown field '{}'",
                    form.name, name
                )));
            }
            for referenced in rule.referenced_fields() {
                if form.field(&referenced).is_none() {
                    errors.push(ValidationError::CrossReference(format!(
                        "Rule for '{}' in form '{}' depends on unknown field '{}'",
                        name, form.name, referenced
                    )));
                }
            }
        }

        for name in form.field_config.keys() {
            if form.field(name).is_none() {
                errors.push(ValidationError::CrossReference(format!(
                    "Field config in form '{}' targets unknown field '{}'",
                    form.name, name
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FieldDefinition;
    use crate::schema::{FieldConfig, Rule};

    fn member_form() -> FormDefinition {
        FormDefinition::new("member")
            .with_model("members")
            .with_field(FieldDefinition::text("email"))
    }

    #[test]
    fn test_valid_config() {
        let settings = Settings {
            forms: vec![FormDefinition::new("organization")
                .with_field(FieldDefinition::text("title"))
                .with_field(FieldDefinition::new("members", FieldKind::array(member_form())))],
            ..Default::default()
        };
        assert!(ConfigValidator::validate(&settings).is_ok());
    }

    #[test]
    fn test_invalid_batch_size() {
        let mut settings = Settings::default();
        settings.arrays.batch_size = 0;
        let errors = ConfigValidator::validate(&settings).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_duplicate_form_names() {
        let settings = Settings {
            forms: vec![member_form(), member_form()],
            ..Default::default()
        };
        let errors = ConfigValidator::validate(&settings).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::Duplicate(_))));
    }

    #[test]
    fn test_item_form_without_collection() {
        let unbound = FormDefinition::new("member").with_field(FieldDefinition::text("email"));
        let settings = Settings {
            forms: vec![FormDefinition::new("organization")
                .with_field(FieldDefinition::new("members", FieldKind::array(unbound)))],
            ..Default::default()
        };
        let errors = ConfigValidator::validate(&settings).unwrap_err();
        assert!(matches!(&errors[0], ValidationError::InvalidValue { field, .. } if field == "forms[0].fields[0]"));
    }

    #[test]
    fn test_unknown_references() {
        let form = FormDefinition::new("organization")
            .with_field(FieldDefinition::text("title"))
            .with_rule("title", Rule::hide_if().eq("kind", "personal"))
            .with_field_config("subtitle", FieldConfig::default());
        let settings = Settings {
            forms: vec![form],
            ..Default::default()
        };
        let errors = ConfigValidator::validate(&settings).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, ValidationError::CrossReference(_))));
    }
}
