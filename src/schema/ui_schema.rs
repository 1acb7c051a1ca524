//! UI schema generation: layout tree + per-field controls.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::{FieldDefinition, FormDefinition, Widget};
use crate::schema::error::SchemaError;

/// A control bound to one field of the form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

impl Control {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Default::default()
        }
    }

    pub fn default_scope(field: &str) -> String {
        format!("#/properties/{}", field.to_lowercase())
    }
}

/// Node of a UI schema layout tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UiElement {
    HorizontalLayout {
        elements: Vec<UiElement>,
    },
    VerticalLayout {
        elements: Vec<UiElement>,
    },
    Group {
        label: String,
        elements: Vec<UiElement>,
    },
    Category {
        label: String,
        elements: Vec<UiElement>,
    },
    /// Tabbed layout; every direct child must be a `Category`
    Categorization {
        elements: Vec<UiElement>,
    },
    Control(Control),
    /// Shorthand for several plain controls, flattened into the parent
    Controls {
        fields: Vec<String>,
    },
    /// Raw markup rendered by the front end as-is
    #[serde(rename = "HTML")]
    Html {
        html: String,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        options: Map<String, Value>,
    },
}

impl UiElement {
    pub fn vertical(elements: Vec<UiElement>) -> Self {
        Self::VerticalLayout { elements }
    }

    pub fn horizontal(elements: Vec<UiElement>) -> Self {
        Self::HorizontalLayout { elements }
    }

    pub fn group(label: impl Into<String>, elements: Vec<UiElement>) -> Self {
        Self::Group {
            label: label.into(),
            elements,
        }
    }

    pub fn category(label: impl Into<String>, elements: Vec<UiElement>) -> Self {
        Self::Category {
            label: label.into(),
            elements,
        }
    }

    pub fn categorization(elements: Vec<UiElement>) -> Self {
        Self::Categorization { elements }
    }

    pub fn control(field: impl Into<String>) -> Self {
        Self::Control(Control::new(field))
    }

    pub fn controls<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Controls {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::HorizontalLayout { .. } => "HorizontalLayout",
            Self::VerticalLayout { .. } => "VerticalLayout",
            Self::Group { .. } => "Group",
            Self::Category { .. } => "Category",
            Self::Categorization { .. } => "Categorization",
            Self::Control(_) => "Control",
            Self::Controls { .. } => "Controls",
            Self::Html { .. } => "HTML",
        }
    }
}

/// Renders UI schema documents for one form.
pub struct UiSchemaBuilder<'a> {
    form: &'a FormDefinition,
}

impl<'a> UiSchemaBuilder<'a> {
    pub fn new(form: &'a FormDefinition) -> Self {
        Self { form }
    }

    /// UI schema of the whole form: the custom layout if one is defined,
    /// otherwise a vertical layout with one control per field.
    pub fn build(&self) -> Result<Value, SchemaError> {
        if let Some(layout) = &self.form.layout {
            let mut rendered = self.render(layout)?;
            return match rendered.len() {
                1 => Ok(rendered.remove(0)),
                _ => Ok(json!({ "type": "VerticalLayout", "elements": rendered })),
            };
        }

        let mut elements = Vec::with_capacity(self.form.fields.len());
        for field in &self.form.fields {
            match self.form.custom_ui_schema.get(&field.name) {
                Some(custom) => elements.push(custom.clone()),
                None => elements.push(self.field_control(field, &Control::new(&field.name))),
            }
        }
        Ok(json!({ "type": "VerticalLayout", "elements": elements }))
    }

    /// Render one layout node. `Controls` expands to several siblings.
    pub fn render(&self, element: &UiElement) -> Result<Vec<Value>, SchemaError> {
        let layout = |type_name: &str, label: Option<&str>, children: &[UiElement]| {
            let mut schema = Map::new();
            schema.insert("type".into(), json!(type_name));
            if let Some(label) = label {
                schema.insert("label".into(), json!(label));
            }
            schema.insert("elements".into(), Value::Array(self.render_all(children)?));
            Ok::<_, SchemaError>(vec![Value::Object(schema)])
        };

        match element {
            UiElement::HorizontalLayout { elements } => {
                layout("HorizontalLayout", None, elements.as_slice())
            }
            UiElement::VerticalLayout { elements } => {
                layout("VerticalLayout", None, elements.as_slice())
            }
            UiElement::Group { label, elements } => {
                layout("Group", Some(label.as_str()), elements.as_slice())
            }
            UiElement::Category { label, elements } => {
                layout("Category", Some(label.as_str()), elements.as_slice())
            }
            UiElement::Categorization { elements } => {
                if let Some(bad) = elements
                    .iter()
                    .find(|e| !matches!(e, UiElement::Category { .. }))
                {
                    return Err(SchemaError::InvalidCategorization {
                        found: bad.type_name().to_string(),
                    });
                }
                layout("Categorization", None, elements.as_slice())
            }
            UiElement::Control(control) => Ok(vec![self.control(control)?]),
            UiElement::Controls { fields } => fields
                .iter()
                .map(|field| self.control(&Control::new(field)))
                .collect(),
            UiElement::Html { html, options } => {
                let mut schema = json!({ "type": "HTML", "html": html });
                if !options.is_empty() {
                    schema["options"] = Value::Object(options.clone());
                }
                Ok(vec![schema])
            }
        }
    }

    fn render_all(&self, elements: &[UiElement]) -> Result<Vec<Value>, SchemaError> {
        let mut rendered = Vec::new();
        for element in elements {
            rendered.extend(self.render(element)?);
        }
        Ok(rendered)
    }

    fn control(&self, control: &Control) -> Result<Value, SchemaError> {
        match self.form.field(&control.field) {
            Some(field) => Ok(self.field_control(field, control)),
            // an explicit scope may point anywhere in the data schema
            None if control.scope.is_some() => Ok(self.bare_control(control)),
            None => Err(SchemaError::UnknownField {
                form: self.form.name.clone(),
                field: control.field.clone(),
            }),
        }
    }

    fn bare_control(&self, control: &Control) -> Value {
        let mut schema = Map::new();
        schema.insert("type".into(), json!("Control"));
        schema.insert(
            "scope".into(),
            json!(control
                .scope
                .clone()
                .unwrap_or_else(|| Control::default_scope(&control.field))),
        );
        if let Some(label) = &control.label {
            schema.insert("label".into(), json!(label));
        }
        schema.insert("options".into(), Value::Object(control.options.clone()));
        if let Some(rule) = self.form.rules.get(&control.field) {
            schema.insert("rule".into(), rule.to_schema());
        }
        Value::Object(schema)
    }

    /// Control generated from a field's widget and configuration, refined by
    /// the layout's control node.
    fn field_control(&self, field: &FieldDefinition, control: &Control) -> Value {
        let mut options = Map::new();
        let mut schema = Map::new();
        schema.insert("type".into(), json!("Control"));
        schema.insert(
            "scope".into(),
            json!(control
                .scope
                .clone()
                .unwrap_or_else(|| Control::default_scope(&field.name))),
        );

        if let Some(label) = control.label.as_ref().or(field.label.as_ref()) {
            schema.insert("label".into(), json!(label));
        }
        if field.disabled {
            schema.insert("readonly".into(), Value::Bool(true));
        }
        match &field.widget {
            Widget::Textarea => {
                options.insert("multi".into(), Value::Bool(true));
            }
            Widget::Custom { component } => {
                options.insert("customComponentName".into(), json!(component));
            }
            Widget::RadioSelect => {
                options.insert("format".into(), json!("radio"));
            }
            Widget::Default | Widget::Hidden => {}
        }

        if let Some(config) = self.form.field_config.get(&field.name) {
            if let Some(rule) = &config.rule {
                schema.insert("rule".into(), rule.to_schema());
            }
            for (key, value) in config.uischema() {
                if key == "options" {
                    if let Value::Object(extra) = value {
                        options.extend(extra);
                    }
                } else {
                    schema.insert(key, value);
                }
            }
        }
        options.extend(control.options.clone());
        schema.insert("options".into(), Value::Object(options));

        if let Some(rule) = self.form.rules.get(&field.name) {
            schema.insert("rule".into(), rule.to_schema());
        }
        Value::Object(schema)
    }
}

/// UI schema of a form.
pub fn form_ui_schema(form: &FormDefinition) -> Result<Value, SchemaError> {
    UiSchemaBuilder::new(form).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field_config::FieldConfig;
    use crate::schema::rules::Rule;

    fn form() -> FormDefinition {
        FormDefinition::new("profile")
            .with_field(FieldDefinition::text("Name").label("Full name"))
            .with_field(FieldDefinition::text("bio").widget(Widget::Textarea))
            .with_field(
                FieldDefinition::text("avatar").widget(Widget::Custom {
                    component: "avatar-picker".into(),
                }),
            )
            .with_field(FieldDefinition::text("code").disabled())
    }

    #[test]
    fn test_default_layout() {
        let schema = form_ui_schema(&form()).unwrap();
        assert_eq!(schema["type"], "VerticalLayout");
        let elements = schema["elements"].as_array().unwrap();
        assert_eq!(elements.len(), 4);
        assert_eq!(
            elements[0],
            json!({"type": "Control", "scope": "#/properties/name", "label": "Full name", "options": {}})
        );
        assert_eq!(elements[1]["options"], json!({"multi": true}));
        assert_eq!(
            elements[2]["options"],
            json!({"customComponentName": "avatar-picker"})
        );
        assert_eq!(elements[3]["readonly"], true);
    }

    #[test]
    fn test_rules_and_field_config() {
        let mut form = form()
            .with_rule("bio", Rule::show_if().eq("Name", "x"))
            .with_field_config(
                "code",
                FieldConfig {
                    label: Some(json!("Code")),
                    add_text: Some("Add".into()),
                    ..Default::default()
                },
            );
        form.custom_ui_schema
            .insert("avatar".into(), json!({"type": "Control", "scope": "#/properties/img"}));

        let schema = form_ui_schema(&form).unwrap();
        let elements = schema["elements"].as_array().unwrap();
        assert_eq!(elements[1]["rule"]["effect"], "SHOW");
        assert_eq!(elements[2], json!({"type": "Control", "scope": "#/properties/img"}));
        assert_eq!(elements[3]["label"], "Code");
        assert_eq!(elements[3]["options"]["addText"], "Add");
        assert_eq!(elements[3]["options"]["displayDelete"], false);
    }

    #[test]
    fn test_custom_layout_flattens_controls() {
        let form = form().with_layout(UiElement::vertical(vec![
            UiElement::group(
                "About",
                vec![UiElement::horizontal(vec![UiElement::controls(["Name", "bio"])])],
            ),
            UiElement::Html {
                html: "<hr/>".into(),
                options: Map::new(),
            },
        ]));
        let schema = form_ui_schema(&form).unwrap();
        assert_eq!(schema["type"], "VerticalLayout");
        assert_eq!(schema["elements"][0]["type"], "Group");
        assert_eq!(schema["elements"][0]["label"], "About");
        let row = &schema["elements"][0]["elements"][0];
        assert_eq!(row["type"], "HorizontalLayout");
        assert_eq!(row["elements"].as_array().unwrap().len(), 2);
        assert_eq!(schema["elements"][1], json!({"type": "HTML", "html": "<hr/>"}));
    }

    #[test]
    fn test_categorization_rejects_non_category_children() {
        let form = form().with_layout(UiElement::categorization(vec![
            UiElement::category("One", vec![UiElement::control("Name")]),
            UiElement::control("bio"),
        ]));
        match form_ui_schema(&form) {
            Err(SchemaError::InvalidCategorization { found }) => assert_eq!(found, "Control"),
            other => panic!("expected categorization error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_field_in_layout() {
        let form = form().with_layout(UiElement::vertical(vec![UiElement::control("missing")]));
        assert!(matches!(
            form_ui_schema(&form),
            Err(SchemaError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_layout_from_yaml() {
        let layout: UiElement = serde_yaml::from_str(
            r#"
type: Categorization
elements:
  - type: Category
    label: General
    elements:
      - type: Control
        field: Name
      - type: Controls
        fields: [bio, code]
"#,
        )
        .unwrap();
        let form = form().with_layout(layout);
        let schema = form_ui_schema(&form).unwrap();
        assert_eq!(schema["type"], "Categorization");
        assert_eq!(
            schema["elements"][0]["elements"].as_array().unwrap().len(),
            3
        );
    }
}
