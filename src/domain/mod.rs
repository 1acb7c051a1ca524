//! Core value types shared by the schema generators, the array reconciliation
//! engine and the record stores.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub mod form;

pub use form::{Choice, FieldDefinition, FieldKind, FormDefinition, IdentifierType, Widget};

/// Key under which errors that do not belong to a single field are reported.
pub const NON_FIELD_ERRORS: &str = "__all__";

/// Errors produced by validating one item: field name -> messages.
pub type ErrorMap = BTreeMap<String, Vec<String>>;

/// Render an error map as a single human readable line.
pub fn summarize_errors(errors: &ErrorMap) -> String {
    errors
        .iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Identifier of a persisted record.
///
/// Identifiers are kept in their string form so that posted values
/// (`"12"`) and stored values (`12`) compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Read an identifier out of a posted or stored value.
    ///
    /// Returns `None` for `null`, empty strings and anything that is not a
    /// scalar, which is how "no identifier" (create intent) is expressed.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self(s.trim().to_string())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// JSON form of the identifier: numeric identifiers are emitted as numbers.
    pub fn to_value(&self) -> Value {
        match self.0.parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::String(self.0.clone()),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// A persisted entity owned by a record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub values: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>, values: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            values,
        }
    }

    /// Look up an attribute, treating `identifier_field` as the record id.
    pub fn get(&self, field: &str, identifier_field: &str) -> Option<Value> {
        if field == identifier_field {
            return Some(self.id.to_value());
        }
        self.values.get(field).cloned()
    }
}

/// A record staged for creation; the store assigns its identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub values: Map<String, Value>,
}

impl NewRecord {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

/// One row of an array field as posted by the client: sub-field -> raw value.
///
/// A non-empty identifier field means "update this record"; anything else
/// means "create a new record".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostedItem(IndexMap<String, Value>);

impl PostedItem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Identifier carried by this item, if any.
    pub fn identifier(&self, identifier_field: &str) -> Option<RecordId> {
        self.0.get(identifier_field).and_then(RecordId::from_value)
    }

    /// Remove the identifier field from the payload and return its value.
    pub fn take_identifier(&mut self, identifier_field: &str) -> Option<RecordId> {
        self.0
            .shift_remove(identifier_field)
            .as_ref()
            .and_then(RecordId::from_value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for PostedItem {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<Map<String, Value>> for PostedItem {
    fn from(map: Map<String, Value>) -> Self {
        Self(map.into_iter().collect())
    }
}
