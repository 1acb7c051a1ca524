//! Data schema generation: form definition -> JSON Schema document.

use serde_json::{json, Map, Value};

use crate::domain::{Choice, FieldDefinition, FieldKind, FormDefinition, Widget};
use crate::schema::field_config::FieldConfig;

/// Type name and kind-specific keys for one field kind.
struct Fragment {
    type_name: Value,
    keys: Map<String, Value>,
}

impl Fragment {
    fn of(type_name: &str) -> Self {
        Self {
            type_name: Value::String(type_name.to_string()),
            keys: Map::new(),
        }
    }

    fn with(mut self, key: &str, value: Value) -> Self {
        self.keys.insert(key.to_string(), value);
        self
    }

    fn with_opt<T: Into<Value>>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.with(key, v.into()),
            None => self,
        }
    }
}

fn choice_type(choices: &[Choice]) -> &'static str {
    if !choices.is_empty() && choices.iter().all(|c| c.value.is_i64() || c.value.is_u64()) {
        "integer"
    } else if !choices.is_empty() && choices.iter().all(|c| c.value.is_number()) {
        "number"
    } else if !choices.is_empty() && choices.iter().all(|c| c.value.is_boolean()) {
        "boolean"
    } else {
        "string"
    }
}

/// Schema fragment for a field kind.
fn kind_fragment(kind: &FieldKind) -> Fragment {
    match kind {
        FieldKind::Text { max_length } => {
            Fragment::of("string").with_opt("maxLength", max_length.map(|n| n as u64))
        }
        FieldKind::Integer {
            min_value,
            max_value,
        } => Fragment::of("integer")
            .with_opt("minimum", *min_value)
            .with_opt("maximum", *max_value),
        FieldKind::Number {
            min_value,
            max_value,
        } => Fragment::of("number")
            .with_opt("minimum", *min_value)
            .with_opt("maximum", *max_value),
        FieldKind::Boolean => Fragment::of("boolean"),
        FieldKind::Date => Fragment::of("string").with("format", json!("date")),
        FieldKind::DateTime => Fragment::of("string").with("format", json!("date-time")),
        FieldKind::Time => Fragment::of("string").with("format", json!("time")),
        FieldKind::Choice { choices } => Fragment::of(choice_type(choices)),
        FieldKind::Array {
            form,
            identifier_field,
            identifier_type,
            ..
        } => {
            let mut items = form_schema(form);
            if let Some(Value::Object(properties)) = items.get_mut("properties") {
                properties.insert(
                    identifier_field.clone(),
                    json!({ "type": identifier_type.as_str(), "hidden": true }),
                );
            }
            Fragment::of("array").with("items", items)
        }
        FieldKind::Object { form } => {
            Fragment::of("object").with("properties", Value::Object(form_properties(form)))
        }
    }
}

/// Data schema entry for one field.
pub fn field_schema(field: &FieldDefinition, config: Option<&FieldConfig>) -> Value {
    let Fragment {
        mut type_name,
        mut keys,
    } = kind_fragment(&field.kind);

    if let FieldKind::Choice { choices } = &field.kind {
        let one_of: Vec<Value> = choices
            .iter()
            .map(|c| json!({ "const": c.value, "title": c.title }))
            .collect();
        keys.insert("oneOf".into(), Value::Array(one_of));
    }
    if field.widget == Widget::Hidden {
        keys.insert("hidden".into(), Value::Bool(true));
    }
    if field.disabled {
        keys.insert("readOnly".into(), Value::Bool(true));
    }
    if field.widget == Widget::RadioSelect {
        // radio values always travel as strings and are converted on clean
        type_name = json!("string");
        if let FieldKind::Choice { choices } = &field.kind {
            let one_of: Vec<Value> = choices
                .iter()
                .map(|c| json!({ "const": stringify(&c.value), "title": c.title }))
                .collect();
            keys.insert("oneOf".into(), Value::Array(one_of));
        }
    }
    if let Some(config) = config {
        for (key, value) in config.schema() {
            if key == "type" {
                type_name = value;
            } else {
                keys.insert(key, value);
            }
        }
    }
    if let FieldKind::Array {
        min_items,
        max_items,
        ..
    } = &field.kind
    {
        if let Some(min) = min_items.filter(|n| *n > 0) {
            keys.insert("minItems".into(), json!(min));
        }
        if let Some(max) = max_items.filter(|n| *n > 0) {
            keys.insert("maxItems".into(), json!(max));
        }
    }
    if !field.required {
        type_name = json!([type_name, "null"]);
        keys.insert("minLength".into(), json!(0));
    }

    let mut schema = Map::new();
    schema.insert("type".into(), type_name);
    schema.extend(keys);
    Value::Object(schema)
}

/// Stringified form of a choice value, as a radio select posts it.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `properties` map of a form's data schema.
pub fn form_properties(form: &FormDefinition) -> Map<String, Value> {
    form.fields
        .iter()
        .map(|field| {
            let config = form.field_config.get(&field.name);
            (field.name.clone(), field_schema(field, config))
        })
        .collect()
}

/// Full data schema of a form.
pub fn form_schema(form: &FormDefinition) -> Value {
    json!({
        "type": "object",
        "properties": form_properties(form),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IdentifierType;

    fn member_form() -> FormDefinition {
        FormDefinition::new("member")
            .with_model("members")
            .with_field(FieldDefinition::text("email"))
            .with_field(FieldDefinition::integer("age").optional())
    }

    #[test]
    fn test_scalar_kinds() {
        let form = FormDefinition::new("f")
            .with_field(FieldDefinition::text("name"))
            .with_field(FieldDefinition::integer("count"))
            .with_field(FieldDefinition::new("born", FieldKind::Date))
            .with_field(FieldDefinition::new("at", FieldKind::DateTime))
            .with_field(FieldDefinition::new("active", FieldKind::Boolean));
        let schema = form_schema(&form);
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["name"], json!({"type": "string"}));
        assert_eq!(schema["properties"]["count"], json!({"type": "integer"}));
        assert_eq!(
            schema["properties"]["born"],
            json!({"type": "string", "format": "date"})
        );
        assert_eq!(schema["properties"]["at"]["format"], "date-time");
        assert_eq!(schema["properties"]["active"], json!({"type": "boolean"}));
    }

    #[test]
    fn test_optional_field_allows_null_and_blank() {
        let field = FieldDefinition::text("nickname").optional();
        assert_eq!(
            field_schema(&field, None),
            json!({"type": ["string", "null"], "minLength": 0})
        );
    }

    #[test]
    fn test_choice_hidden_and_readonly() {
        let field = FieldDefinition::new(
            "status",
            FieldKind::choice([("open", "Open"), ("closed", "Closed")]),
        )
        .widget(Widget::Hidden)
        .disabled();
        assert_eq!(
            field_schema(&field, None),
            json!({
                "type": "string",
                "oneOf": [
                    {"const": "open", "title": "Open"},
                    {"const": "closed", "title": "Closed"}
                ],
                "hidden": true,
                "readOnly": true
            })
        );
    }

    #[test]
    fn test_radio_select_stringifies_choices() {
        let field = FieldDefinition::new("level", FieldKind::choice([(1, "Low"), (2, "High")]))
            .widget(Widget::RadioSelect);
        let schema = field_schema(&field, None);
        assert_eq!(schema["type"], "string");
        assert_eq!(schema["oneOf"][0], json!({"const": "1", "title": "Low"}));
    }

    #[test]
    fn test_array_items_carry_hidden_identifier() {
        let field = FieldDefinition::new(
            "members",
            FieldKind::Array {
                form: Box::new(member_form()),
                identifier_field: "pk".into(),
                identifier_type: IdentifierType::Number,
                min_items: Some(1),
                max_items: Some(5),
            },
        );
        let schema = field_schema(&field, None);
        assert_eq!(schema["type"], "array");
        assert_eq!(schema["minItems"], 1);
        assert_eq!(schema["maxItems"], 5);
        assert_eq!(
            schema["items"]["properties"]["pk"],
            json!({"type": "number", "hidden": true})
        );
        assert_eq!(
            schema["items"]["properties"]["age"]["type"],
            json!(["integer", "null"])
        );
    }

    #[test]
    fn test_nested_object() {
        let address = FormDefinition::new("address").with_field(FieldDefinition::text("city"));
        let field = FieldDefinition::new(
            "address",
            FieldKind::Object {
                form: Box::new(address),
            },
        );
        assert_eq!(
            field_schema(&field, None),
            json!({"type": "object", "properties": {"city": {"type": "string"}}})
        );
    }

    #[test]
    fn test_config_overrides() {
        let config = FieldConfig {
            schema_type: Some(json!("number")),
            description: Some("How many".into()),
            ..Default::default()
        };
        let field = FieldDefinition::integer("count").optional();
        assert_eq!(
            field_schema(&field, Some(&config)),
            json!({"type": ["number", "null"], "description": "How many", "minLength": 0})
        );
    }
}
