//! Conditional UI rules encoded as JSON Schema conditions.
//!
//! A condition is either a composition of other conditions or a set of
//! direct `field = value` assignments (or both):
//!
//! - `Or(key1 = 1, key2 = 2)` holds when `key1 == 1` *and* `key2 == 2`
//!   (assignments inside one condition form a single object schema);
//! - `Or(And(key1 = 1, key2 = 1), key2 = 3)` holds when
//!   `(key1 == 1 and key2 == 1) or key2 == 3`.
//!
//! Lists assign "any of these values" (`enum`), anything else assigns an
//! exact value (`const`).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Encode a single assigned value as a JSON Schema fragment.
pub fn value_as_jsonschema(value: &Value) -> Value {
    match value {
        Value::Array(_) => json!({ "enum": value }),
        _ => json!({ "const": value }),
    }
}

/// Effect applied to a control when its rule's condition holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    Show,
    Hide,
    Disable,
    Enable,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Show => "SHOW",
            Self::Hide => "HIDE",
            Self::Disable => "DISABLE",
            Self::Enable => "ENABLE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    Or,
    And,
    Not,
}

impl Combinator {
    fn schema_key(&self) -> &'static str {
        match self {
            Self::Or => "anyOf",
            Self::And => "allOf",
            Self::Not => "not",
        }
    }
}

/// Composable condition over sibling field values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub combinator: Combinator,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub values: IndexMap<String, Value>,
}

impl Condition {
    fn new(combinator: Combinator) -> Self {
        Self {
            combinator,
            conditions: Vec::new(),
            values: IndexMap::new(),
        }
    }

    pub fn or() -> Self {
        Self::new(Combinator::Or)
    }

    pub fn and() -> Self {
        Self::new(Combinator::And)
    }

    pub fn not() -> Self {
        Self::new(Combinator::Not)
    }

    /// Add a nested condition.
    pub fn with(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add a direct `field = value` assignment.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    fn values_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .values
            .iter()
            .map(|(key, value)| (key.clone(), value_as_jsonschema(value)))
            .collect();
        json!({
            "type": "object",
            "properties": properties,
        })
    }

    pub fn to_schema(&self) -> Value {
        let key = self.combinator.schema_key();
        match self.combinator {
            // `not` takes a single schema, so everything is merged into one object
            Combinator::Not => {
                let mut schema = Map::new();
                if !self.values.is_empty() {
                    if let Value::Object(values) = self.values_schema() {
                        schema.extend(values);
                    }
                }
                for condition in &self.conditions {
                    if let Value::Object(nested) = condition.to_schema() {
                        schema.extend(nested);
                    }
                }
                json!({ key: schema })
            }
            Combinator::Or | Combinator::And => {
                let mut schemas: Vec<Value> =
                    self.conditions.iter().map(Condition::to_schema).collect();
                if !self.values.is_empty() {
                    schemas.push(self.values_schema());
                }
                json!({ key: schemas })
            }
        }
    }
}

/// A rule attached to a control.
///
/// Any number of conditions may be given; direct assignments are treated as
/// a single `And`. Everything is wrapped in an `Or`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub effect: Effect,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub values: IndexMap<String, Value>,
}

impl Rule {
    pub fn new(effect: Effect) -> Self {
        Self {
            effect,
            conditions: Vec::new(),
            values: IndexMap::new(),
        }
    }

    pub fn show_if() -> Self {
        Self::new(Effect::Show)
    }

    pub fn hide_if() -> Self {
        Self::new(Effect::Hide)
    }

    pub fn disable_if() -> Self {
        Self::new(Effect::Disable)
    }

    pub fn enable_if() -> Self {
        Self::new(Effect::Enable)
    }

    pub fn with(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Field names referenced anywhere in this rule.
    pub fn referenced_fields(&self) -> Vec<String> {
        fn collect(condition: &Condition, out: &mut Vec<String>) {
            out.extend(condition.values.keys().cloned());
            for nested in &condition.conditions {
                collect(nested, out);
            }
        }
        let mut fields: Vec<String> = self.values.keys().cloned().collect();
        for condition in &self.conditions {
            collect(condition, &mut fields);
        }
        fields
    }

    pub fn to_schema(&self) -> Value {
        let mut combined = Condition::or();
        combined.conditions.extend(self.conditions.iter().cloned());
        if !self.values.is_empty() {
            let mut and = Condition::and();
            and.values = self.values.clone();
            combined.conditions.push(and);
        }
        json!({
            "effect": self.effect.as_str(),
            "condition": {
                "scope": "#",
                "schema": combined.to_schema(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_single_key_single_value() {
        let or = Condition::or().eq("key1", 1);
        assert_eq!(
            or.to_schema(),
            json!({"anyOf": [{"type": "object", "properties": {"key1": {"const": 1}}}]})
        );
    }

    #[test]
    fn test_or_multiple_values_uses_enum() {
        let or = Condition::or().eq("key1", json!([1, 2, 3])).eq("key2", "x");
        assert_eq!(
            or.to_schema(),
            json!({"anyOf": [{
                "type": "object",
                "properties": {"key1": {"enum": [1, 2, 3]}, "key2": {"const": "x"}}
            }]})
        );
    }

    #[test]
    fn test_not_composable() {
        let not = Condition::not().with(Condition::or().eq("key1", 1).eq("key2", 1));
        assert_eq!(
            not.to_schema(),
            json!({"not": {"anyOf": [{
                "type": "object",
                "properties": {"key1": {"const": 1}, "key2": {"const": 1}}
            }]}})
        );

        let plain = Condition::not().eq("key1", 1);
        assert_eq!(
            plain.to_schema(),
            json!({"not": {"type": "object", "properties": {"key1": {"const": 1}}}})
        );
    }

    #[test]
    fn test_rule_wraps_assignments_in_and() {
        let rule = Rule::show_if().eq("key1", 1);
        assert_eq!(
            rule.to_schema(),
            json!({
                "effect": "SHOW",
                "condition": {
                    "scope": "#",
                    "schema": {"anyOf": [{"allOf": [
                        {"type": "object", "properties": {"key1": {"const": 1}}}
                    ]}]}
                }
            })
        );
    }

    #[test]
    fn test_rule_with_conditions_and_assignments() {
        let rule = Rule::hide_if()
            .with(Condition::or().eq("key1", 1))
            .with(Condition::and().eq("key1", 2).eq("key2", 3))
            .eq("key3", "z");
        let schema = rule.to_schema();
        assert_eq!(schema["effect"], "HIDE");
        let any_of = schema["condition"]["schema"]["anyOf"].as_array().unwrap();
        assert_eq!(any_of.len(), 3);
        assert!(any_of[0].get("anyOf").is_some());
        assert!(any_of[1].get("allOf").is_some());
        assert_eq!(
            any_of[2],
            json!({"allOf": [{"type": "object", "properties": {"key3": {"const": "z"}}}]})
        );
        assert_eq!(rule.referenced_fields(), vec!["key3", "key1", "key1", "key2"]);
    }

    #[test]
    fn test_rule_from_yaml() {
        let yaml = r#"
effect: DISABLE
values:
  status: [closed, archived]
"#;
        let rule: Rule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.effect, Effect::Disable);
        assert_eq!(rule.values["status"], json!(["closed", "archived"]));
    }
}
