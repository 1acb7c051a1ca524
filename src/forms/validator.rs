//! Item validation: the nested record-editing form of an array field.
//!
//! The reconciliation engine never validates values itself; it hands each
//! posted item to an [`ItemValidator`]. [`FormValidator`] is the default
//! implementation, cleaning raw posted values according to the field kinds
//! of a [`FormDefinition`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Value};

use crate::domain::{
    ErrorMap, FieldDefinition, FieldKind, FormDefinition, PostedItem, Record,
};
use crate::schema::data_schema::stringify;

pub const REQUIRED: &str = "This field is required.";

/// Outcome of validating one item. Produced once per item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemValidation {
    pub cleaned_data: Map<String, Value>,
    pub errors: ErrorMap,
}

impl ItemValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }
}

/// Per-item validator injected into an array field.
pub trait ItemValidator: Send + Sync {
    /// The record-editing form behind this validator.
    fn form(&self) -> &FormDefinition;

    /// Validate one posted item, optionally bound to the record it updates.
    ///
    /// Consumes the item: one item, one validation pass.
    fn validate(&self, data: PostedItem, instance: Option<&Record>) -> ItemValidation;

    /// Fields written when updating records.
    fn declared_fields(&self) -> Vec<String> {
        self.form().value_fields().map(|f| f.name.clone()).collect()
    }

    /// Values the front end starts from for an existing record.
    fn initial(&self, instance: &Record) -> Map<String, Value> {
        self.form()
            .value_fields()
            .filter_map(|field| {
                instance
                    .values
                    .get(&field.name)
                    .cloned()
                    .or_else(|| field.initial.clone())
                    .map(|value| (field.name.clone(), value))
            })
            .collect()
    }
}

/// Validator that cleans values by field kind.
#[derive(Debug, Clone)]
pub struct FormValidator {
    form: FormDefinition,
}

impl FormValidator {
    pub fn new(form: FormDefinition) -> Self {
        Self { form }
    }

    /// Clean a whole map of raw values; array fields are skipped, they are
    /// reconciled by their own array field.
    pub fn clean(
        &self,
        mut lookup: impl FnMut(&str) -> Option<Value>,
        instance: Option<&Record>,
    ) -> ItemValidation {
        let mut result = ItemValidation::default();
        for field in self.form.value_fields() {
            // disabled fields keep the bound value whatever was posted
            let raw = if field.disabled {
                instance
                    .and_then(|r| r.values.get(&field.name).cloned())
                    .or_else(|| field.initial.clone())
            } else {
                lookup(&field.name)
            };
            match clean_field(field, raw) {
                Ok(value) => {
                    result.cleaned_data.insert(field.name.clone(), value);
                }
                Err(Cleaned::Invalid(message)) => result.error(&field.name, message),
                Err(Cleaned::Nested(errors)) => {
                    for (sub_field, messages) in errors {
                        let key = format!("{}.{}", field.name, sub_field);
                        for message in messages {
                            result.error(&key, message);
                        }
                    }
                }
            }
        }
        result
    }
}

impl ItemValidator for FormValidator {
    fn form(&self) -> &FormDefinition {
        &self.form
    }

    fn validate(&self, data: PostedItem, instance: Option<&Record>) -> ItemValidation {
        self.clean(|name| data.get(name).cloned(), instance)
    }
}

enum Cleaned {
    Invalid(String),
    Nested(ErrorMap),
}

fn is_empty(value: &Option<Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        _ => false,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Clean one raw value according to its field kind.
fn clean_field(field: &FieldDefinition, raw: Option<Value>) -> Result<Value, Cleaned> {
    let invalid = |message: String| -> Result<Value, Cleaned> { Err(Cleaned::Invalid(message)) };

    if let FieldKind::Boolean = field.kind {
        let checked = match &raw {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Some(other) => !matches!(
                as_text(other).to_lowercase().as_str(),
                "" | "false" | "0" | "off" | "no"
            ),
        };
        if field.required && !checked {
            return invalid(REQUIRED.to_string());
        }
        return Ok(Value::Bool(checked));
    }

    if is_empty(&raw) {
        if field.required {
            return invalid(REQUIRED.to_string());
        }
        return Ok(match field.kind {
            FieldKind::Text { .. } => Value::String(String::new()),
            _ => Value::Null,
        });
    }
    let Some(raw) = raw else {
        return Ok(Value::Null);
    };

    match &field.kind {
        FieldKind::Text { max_length } => {
            let text = as_text(&raw);
            match max_length {
                Some(max) if text.chars().count() > *max => invalid(format!(
                    "Ensure this value has at most {} characters (it has {}).",
                    max,
                    text.chars().count()
                )),
                _ => Ok(Value::String(text)),
            }
        }
        FieldKind::Integer {
            min_value,
            max_value,
        } => {
            let parsed = match &raw {
                Value::Number(n) => n.as_i64(),
                other => as_text(other).parse::<i64>().ok(),
            };
            let Some(n) = parsed else {
                return invalid("Enter a whole number.".to_string());
            };
            if let Some(min) = min_value.filter(|min| n < *min) {
                return invalid(format!(
                    "Ensure this value is greater than or equal to {}.",
                    min
                ));
            }
            if let Some(max) = max_value.filter(|max| n > *max) {
                return invalid(format!("Ensure this value is less than or equal to {}.", max));
            }
            Ok(Value::from(n))
        }
        FieldKind::Number {
            min_value,
            max_value,
        } => {
            let parsed = match &raw {
                Value::Number(n) => n.as_f64(),
                other => as_text(other).parse::<f64>().ok().filter(|f| f.is_finite()),
            };
            let Some(n) = parsed else {
                return invalid("Enter a number.".to_string());
            };
            if let Some(min) = min_value.filter(|min| n < *min) {
                return invalid(format!(
                    "Ensure this value is greater than or equal to {}.",
                    min
                ));
            }
            if let Some(max) = max_value.filter(|max| n > *max) {
                return invalid(format!("Ensure this value is less than or equal to {}.", max));
            }
            Ok(Value::from(n))
        }
        FieldKind::Date => match NaiveDate::parse_from_str(&as_text(&raw), "%Y-%m-%d") {
            Ok(date) => Ok(Value::String(date.format("%Y-%m-%d").to_string())),
            Err(_) => invalid("Enter a valid date.".to_string()),
        },
        FieldKind::DateTime => {
            let text = as_text(&raw);
            let parsed = DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.to_rfc3339())
                .or_else(|_| {
                    NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S")
                        .or_else(|_| NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M"))
                        .or_else(|_| NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S"))
                        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
                });
            match parsed {
                Ok(text) => Ok(Value::String(text)),
                Err(_) => invalid("Enter a valid date/time.".to_string()),
            }
        }
        FieldKind::Time => {
            let text = as_text(&raw);
            match NaiveTime::parse_from_str(&text, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(&text, "%H:%M"))
            {
                Ok(time) => Ok(Value::String(time.format("%H:%M:%S").to_string())),
                Err(_) => invalid("Enter a valid time.".to_string()),
            }
        }
        FieldKind::Choice { choices } => {
            let posted = stringify(&raw);
            match choices.iter().find(|c| stringify(&c.value) == posted) {
                Some(choice) => Ok(choice.value.clone()),
                None => invalid(format!(
                    "Select a valid choice. {} is not one of the available choices.",
                    posted
                )),
            }
        }
        FieldKind::Object { form } => {
            let Value::Object(map) = raw else {
                return invalid("Enter a valid object.".to_string());
            };
            let nested = FormValidator::new((**form).clone());
            let result = nested.clean(|name| map.get(name).cloned(), None);
            if result.is_valid() {
                Ok(Value::Object(result.cleaned_data))
            } else {
                Err(Cleaned::Nested(result.errors))
            }
        }
        // array fields never reach here, see `value_fields`
        FieldKind::Array { .. } => Ok(raw),
        FieldKind::Boolean => Ok(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn member_form() -> FormDefinition {
        FormDefinition::new("member")
            .with_model("members")
            .with_field(FieldDefinition::new("name", FieldKind::Text { max_length: Some(5) }))
            .with_field(
                FieldDefinition::new(
                    "age",
                    FieldKind::Integer {
                        min_value: Some(0),
                        max_value: None,
                    },
                )
                .optional(),
            )
            .with_field(
                FieldDefinition::new(
                    "role",
                    FieldKind::choice([("admin", "Admin"), ("user", "User")]),
                )
                .optional(),
            )
            .with_field(FieldDefinition::new("joined", FieldKind::Date).optional())
            .with_field(FieldDefinition::new("active", FieldKind::Boolean).optional())
    }

    fn item(pairs: &[(&str, Value)]) -> PostedItem {
        pairs.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    #[test]
    fn test_valid_item_is_cleaned() {
        let validator = FormValidator::new(member_form());
        let result = validator.validate(
            item(&[
                ("name", json!(" Ann ")),
                ("age", json!("31")),
                ("role", json!("admin")),
                ("joined", json!("2024-02-29")),
                ("active", json!("on")),
            ]),
            None,
        );
        assert!(result.is_valid(), "{:?}", result.errors);
        assert_eq!(result.cleaned_data["name"], "Ann");
        assert_eq!(result.cleaned_data["age"], 31);
        assert_eq!(result.cleaned_data["role"], "admin");
        assert_eq!(result.cleaned_data["joined"], "2024-02-29");
        assert_eq!(result.cleaned_data["active"], true);
    }

    #[test]
    fn test_errors_are_keyed_by_field() {
        let validator = FormValidator::new(member_form());
        let result = validator.validate(
            item(&[
                ("name", json!("")),
                ("age", json!("-2")),
                ("role", json!("owner")),
                ("joined", json!("2023-02-30")),
            ]),
            None,
        );
        assert!(!result.is_valid());
        assert_eq!(result.errors["name"], vec![REQUIRED.to_string()]);
        assert!(result.errors["age"][0].contains("greater than or equal to 0"));
        assert!(result.errors["role"][0].contains("owner"));
        assert_eq!(result.errors["joined"], vec!["Enter a valid date.".to_string()]);
    }

    #[test]
    fn test_max_length() {
        let validator = FormValidator::new(member_form());
        let result = validator.validate(item(&[("name", json!("Bartholomew"))]), None);
        assert!(result.errors["name"][0].starts_with("Ensure this value has at most 5"));
    }

    #[test]
    fn test_optional_blank_values() {
        let validator = FormValidator::new(member_form());
        let result = validator.validate(item(&[("name", json!("Bo")), ("age", json!(""))]), None);
        assert!(result.is_valid());
        assert_eq!(result.cleaned_data["age"], Value::Null);
        assert_eq!(result.cleaned_data["active"], false);
    }

    #[test]
    fn test_disabled_field_keeps_instance_value() {
        let form = FormDefinition::new("member")
            .with_model("members")
            .with_field(FieldDefinition::text("name"))
            .with_field(FieldDefinition::text("code").disabled());
        let validator = FormValidator::new(form);
        let mut values = Map::new();
        values.insert("code".into(), json!("K-1"));
        let record = Record::new("1", values);

        let result = validator.validate(
            item(&[("name", json!("Ann")), ("code", json!("HACKED"))]),
            Some(&record),
        );
        assert_eq!(result.cleaned_data["code"], "K-1");
        assert_eq!(validator.declared_fields(), vec!["name", "code"]);
        assert_eq!(validator.initial(&record).get("code"), Some(&json!("K-1")));
    }

    #[test]
    fn test_nested_object_errors_are_prefixed() {
        let address = FormDefinition::new("address")
            .with_field(FieldDefinition::text("city"))
            .with_field(FieldDefinition::integer("zip"));
        let form = FormDefinition::new("person").with_field(FieldDefinition::new(
            "address",
            FieldKind::Object {
                form: Box::new(address),
            },
        ));
        let validator = FormValidator::new(form);
        let result = validator.validate(
            item(&[("address", json!({"city": "Oslo", "zip": "abc"}))]),
            None,
        );
        assert_eq!(
            result.errors["address.zip"],
            vec!["Enter a whole number.".to_string()]
        );
    }

    #[test]
    fn test_empty_item_is_left_to_field_cleaning() {
        let validator = FormValidator::new(member_form());
        let result = validator.validate(PostedItem::new(), None);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors["name"], vec![REQUIRED.to_string()]);

        let optional = FormDefinition::new("member")
            .with_model("members")
            .with_field(FieldDefinition::text("nickname").optional());
        let result = FormValidator::new(optional).validate(PostedItem::new(), None);
        assert!(result.is_valid());
    }
}
