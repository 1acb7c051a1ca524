//! Declarative form definitions.
//!
//! A form definition is the server-side description of a form: its ordered
//! fields, their kinds, and the presentation hints used when generating the
//! data schema and UI schema. Definitions can be written in Rust or loaded
//! from JSON/YAML files.
//!
//! ```yaml
//! name: organization
//! fields:
//!   - name: title
//!     kind: { type: text, max_length: 80 }
//!   - name: members
//!     kind:
//!       type: array
//!       form:
//!         name: member
//!         model: members
//!         fields:
//!           - name: email
//!             kind: { type: text }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::field_config::FieldConfig;
use crate::schema::rules::Rule;
use crate::schema::ui_schema::UiElement;

fn default_required() -> bool {
    true
}

fn default_identifier_field() -> String {
    "pk".to_string()
}

/// A complete form definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormDefinition {
    /// Unique name of the form
    pub name: String,
    /// Record collection edited by this form. Forms used as array items
    /// must be bound to a collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Ordered field list
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    /// Conditional rules applied to controls, keyed by field name
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub rules: IndexMap<String, Rule>,
    /// Custom layout used instead of one control per field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<UiElement>,
    /// Hand-written UI schema elements replacing generated controls
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub custom_ui_schema: IndexMap<String, Value>,
    /// Per-field schema / UI schema overrides
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub field_config: IndexMap<String, FieldConfig>,
}

impl FormDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Bind the form to a record collection.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_rule(mut self, field: impl Into<String>, rule: Rule) -> Self {
        self.rules.insert(field.into(), rule);
        self
    }

    pub fn with_layout(mut self, layout: UiElement) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn with_field_config(mut self, field: impl Into<String>, config: FieldConfig) -> Self {
        self.field_config.insert(field.into(), config);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields that hold plain values, i.e. everything except nested arrays.
    pub fn value_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| !f.kind.is_array())
    }

    /// Fields backed by an array of related records.
    pub fn array_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.kind.is_array())
    }
}

/// One field of a form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub widget: Widget,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            label: None,
            widget: Widget::Default,
            disabled: false,
            initial: None,
            help_text: None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text { max_length: None })
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Integer {
                min_value: None,
                max_value: None,
            },
        )
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn widget(mut self, widget: Widget) -> Self {
        self.widget = widget;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn initial(mut self, value: impl Into<Value>) -> Self {
        self.initial = Some(value.into());
        self
    }
}

/// JSON type used for the hidden identifier property of array items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierType {
    #[default]
    Number,
    String,
}

impl IdentifierType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::String => "string",
        }
    }
}

/// Closed set of field kinds. Schema generation and value cleaning dispatch
/// on this tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
    },
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_value: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_value: Option<i64>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_value: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_value: Option<f64>,
    },
    Boolean,
    Date,
    DateTime,
    Time,
    Choice { choices: Vec<Choice> },
    /// Collection of related records edited through a nested form
    Array {
        form: Box<FormDefinition>,
        #[serde(default = "default_identifier_field")]
        identifier_field: String,
        #[serde(default)]
        identifier_type: IdentifierType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_items: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
    /// Nested object described by a sub-form
    Object { form: Box<FormDefinition> },
}

impl FieldKind {
    pub fn array(form: FormDefinition) -> Self {
        Self::Array {
            form: Box::new(form),
            identifier_field: default_identifier_field(),
            identifier_type: IdentifierType::default(),
            min_items: None,
            max_items: None,
        }
    }

    pub fn choice<I, V, T>(choices: I) -> Self
    where
        I: IntoIterator<Item = (V, T)>,
        V: Into<Value>,
        T: Into<String>,
    {
        Self::Choice {
            choices: choices
                .into_iter()
                .map(|(value, title)| Choice {
                    value: value.into(),
                    title: title.into(),
                })
                .collect(),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array { .. })
    }

    /// Tag name, used in log lines and error messages.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Integer { .. } => "integer",
            Self::Number { .. } => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "date_time",
            Self::Time => "time",
            Self::Choice { .. } => "choice",
            Self::Array { .. } => "array",
            Self::Object { .. } => "object",
        }
    }
}

/// One option of a choice field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub value: Value,
    pub title: String,
}

/// Rendering hint attached to a field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Widget {
    #[default]
    Default,
    Hidden,
    Textarea,
    RadioSelect,
    /// Rendered by a custom front-end component
    Custom { component: String },
}
