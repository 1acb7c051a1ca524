//! Per-field overrides for the generated schema and UI schema.
//!
//! Every key is optional: a form always generates enough for a functional
//! render on its own, and a `FieldConfig` only refines it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::rules::Rule;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub rule: Option<Rule>,

    // data schema keys
    pub maximum: Option<Value>,
    pub minimum: Option<Value>,
    pub default: Option<Value>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub schema_type: Option<Value>,
    pub schema_format: Option<String>,
    pub multiple_of: Option<Value>,
    pub examples: Option<Vec<Value>>,
    pub title: Option<String>,
    pub error_message: Option<Value>,

    // ui schema keys
    pub label: Option<Value>,
    pub scope: Option<String>,
    pub detail: Option<Value>,
    pub show_sort_buttons: Option<bool>,
    pub element_label_prop: Option<String>,
    pub ui_format: Option<String>,
    pub readonly: Option<bool>,
    pub display_delete: bool,
    pub enable_add: bool,
    pub no_data_msg: Option<String>,
    pub static_title: Option<String>,
    pub add_text: Option<String>,
    pub max_item_text: Option<String>,
    pub css_classes: Option<String>,
    pub wrapper_css_classes: Option<String>,
    /// Free-form options merged over the generated ones
    pub ui_options: Option<Map<String, Value>>,
}

fn put<T: Serialize>(map: &mut Map<String, Value>, key: &str, value: &Option<T>) {
    if let Some(value) = value {
        if let Ok(value) = serde_json::to_value(value) {
            map.insert(key.to_string(), value);
        }
    }
}

impl FieldConfig {
    /// Keys merged into the field's data schema entry.
    pub fn schema(&self) -> Map<String, Value> {
        let mut schema = Map::new();
        put(&mut schema, "maximum", &self.maximum);
        put(&mut schema, "minimum", &self.minimum);
        put(&mut schema, "default", &self.default);
        put(&mut schema, "minLength", &self.min_length);
        put(&mut schema, "maxLength", &self.max_length);
        put(&mut schema, "description", &self.description);
        put(&mut schema, "type", &self.schema_type);
        put(&mut schema, "format", &self.schema_format);
        put(&mut schema, "multipleOf", &self.multiple_of);
        put(&mut schema, "examples", &self.examples);
        put(&mut schema, "title", &self.title);
        put(&mut schema, "errorMessage", &self.error_message);
        schema
    }

    /// Keys merged into the field's UI schema control. Always carries an
    /// `options` object.
    pub fn uischema(&self) -> Map<String, Value> {
        let mut options = Map::new();
        put(&mut options, "detail", &self.detail);
        put(&mut options, "showSortButtons", &self.show_sort_buttons);
        put(&mut options, "elementLabelProp", &self.element_label_prop);
        put(&mut options, "format", &self.ui_format);
        put(&mut options, "readOnly", &self.readonly);
        options.insert("displayDelete".into(), Value::Bool(self.display_delete));
        options.insert("enableAddButton".into(), Value::Bool(self.enable_add));
        put(&mut options, "noDataMsg", &self.no_data_msg);
        put(&mut options, "staticTitle", &self.static_title);
        put(&mut options, "addText", &self.add_text);
        put(&mut options, "maxItemText", &self.max_item_text);
        put(&mut options, "overrideCss", &self.css_classes);
        put(&mut options, "wrapperOverrideCss", &self.wrapper_css_classes);
        if let Some(extra) = &self.ui_options {
            options.extend(extra.clone());
        }

        let mut uischema = Map::new();
        put(&mut uischema, "label", &self.label);
        put(&mut uischema, "scope", &self.scope);
        uischema.insert("options".into(), Value::Object(options));
        uischema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unset_keys_are_omitted() {
        let config = FieldConfig {
            maximum: Some(json!(10)),
            min_length: Some(2),
            title: Some("Title".into()),
            ..Default::default()
        };
        assert_eq!(
            Value::Object(config.schema()),
            json!({"maximum": 10, "minLength": 2, "title": "Title"})
        );
    }

    #[test]
    fn test_uischema_options() {
        let mut extra = Map::new();
        extra.insert("detail".into(), json!("REGISTERED"));
        let config = FieldConfig {
            label: Some(json!("Members")),
            show_sort_buttons: Some(true),
            enable_add: true,
            ui_options: Some(extra),
            ..Default::default()
        };
        assert_eq!(
            Value::Object(config.uischema()),
            json!({
                "label": "Members",
                "options": {
                    "showSortButtons": true,
                    "displayDelete": false,
                    "enableAddButton": true,
                    "detail": "REGISTERED"
                }
            })
        );
    }

    #[test]
    fn test_from_yaml() {
        let config: FieldConfig = serde_yaml::from_str(
            r#"
maximum: 5
ui_format: radio
rule:
  effect: SHOW
  values: { kind: member }
"#,
        )
        .unwrap();
        assert_eq!(config.maximum, Some(json!(5)));
        assert_eq!(config.ui_format.as_deref(), Some("radio"));
        assert!(config.rule.is_some());
    }
}
