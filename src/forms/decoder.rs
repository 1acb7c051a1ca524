//! Key-path decoding of posted form data.
//!
//! Array fields are posted as flat keys of the form
//! `<array_field>.<index>.<sub_field>`; this module groups them back into
//! one list of items per array field.

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use crate::domain::PostedItem;
use crate::forms::error::DecodeError;

/// Immutable snapshot of posted data: flat key -> raw value.
///
/// Repeated keys are last-write-wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostedData {
    values: IndexMap<String, Value>,
}

impl PostedData {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut values = IndexMap::new();
        for (key, value) in pairs {
            values.insert(key.into(), value.into());
        }
        Self { values }
    }

    /// Build from a JSON object body.
    pub fn from_json(body: &Value) -> Result<Self, DecodeError> {
        match body {
            Value::Object(map) => Ok(Self::from_pairs(
                map.iter().map(|(k, v)| (k.clone(), v.clone())),
            )),
            other => Err(DecodeError::NotAnObject(json_type(other))),
        }
    }

    /// Build from an `application/x-www-form-urlencoded` body.
    pub fn from_urlencoded(body: &str) -> Result<Self, DecodeError> {
        let mut pairs = Vec::new();
        for pair in body.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            pairs.push((decode_component(key)?, decode_component(value)?));
        }
        Ok(Self::from_pairs(pairs))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn decode_component(raw: &str) -> Result<String, DecodeError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .map_err(|e| DecodeError::InvalidEncoding(e.to_string()))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Result of decoding a posted snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedData {
    /// The posted values, untouched
    pub values: PostedData,
    /// Keys recognised as array-encoded
    pub array_keys: IndexSet<String>,
    /// Array field name -> items, in first-seen index order
    pub arrays: IndexMap<String, Vec<PostedItem>>,
}

impl DecodedData {
    /// Items posted for an array field.
    ///
    /// Dotted keys take precedence over a JSON array posted under the plain
    /// field name. `None` means the field was not posted at all; an explicit
    /// empty list (`[]` or `"[]"`) yields `Some(vec![])`. A JSON array with
    /// any row that is not an object is rejected as a whole.
    pub fn items(&self, field: &str) -> Result<Option<Vec<PostedItem>>, DecodeError> {
        if let Some(items) = self.arrays.get(field) {
            return Ok(Some(items.clone()));
        }
        match self.values.get(field) {
            Some(Value::Array(rows)) => rows
                .iter()
                .enumerate()
                .map(|(index, row)| match row {
                    Value::Object(map) => Ok(PostedItem::from(map.clone())),
                    other => Err(DecodeError::MalformedItem {
                        field: field.to_string(),
                        index,
                        found: json_type(other),
                    }),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(Value::String(s)) if s.trim() == "[]" => Ok(Some(Vec::new())),
            _ => Ok(None),
        }
    }

    pub fn value(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }
}

/// Groups `<array_field><d><index><d><sub_field>` keys into item lists.
#[derive(Debug, Clone)]
pub struct KeyPathDecoder {
    delimiter: String,
}

impl Default for KeyPathDecoder {
    fn default() -> Self {
        Self::new(".")
    }
}

impl KeyPathDecoder {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Split a key into `(array_field, index, sub_field)`.
    ///
    /// Keys with fewer than three segments are not array data. Everything
    /// after the second delimiter is the sub-field name.
    pub fn split_key<'k>(&self, key: &'k str) -> Option<(&'k str, &'k str, &'k str)> {
        if self.delimiter.is_empty() {
            return None;
        }
        let mut parts = key.splitn(3, self.delimiter.as_str());
        match (parts.next(), parts.next(), parts.next()) {
            (Some(field), Some(index), Some(sub_field)) => Some((field, index, sub_field)),
            _ => None,
        }
    }

    pub fn decode(&self, data: PostedData) -> DecodedData {
        // field -> index token -> item; index tokens are opaque and keep
        // first-insertion order
        let mut grouped: IndexMap<String, IndexMap<String, PostedItem>> = IndexMap::new();
        let mut array_keys = IndexSet::new();

        for (key, value) in data.iter() {
            let Some((field, index, sub_field)) = self.split_key(key) else {
                continue;
            };
            grouped
                .entry(field.to_string())
                .or_default()
                .entry(index.to_string())
                .or_default()
                .insert(sub_field, value.clone());
            array_keys.insert(key.clone());
        }

        let arrays = grouped
            .into_iter()
            .map(|(field, by_index)| (field, by_index.into_values().collect()))
            .collect();

        tracing::debug!(
            array_keys = array_keys.len(),
            "decoded posted data into array items"
        );

        DecodedData {
            values: data,
            array_keys,
            arrays,
        }
    }
}
