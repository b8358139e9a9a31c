//! Schema representation shims.
//!
//! OpenAPI versions disagree on how numeric bounds and nullability are
//! written. Rules talk to a [`SchemaShape`]; one adapter per physical
//! representation translates:
//!
//! | Concern | Swagger 2.0 | OpenAPI 3.0 | OpenAPI 3.1 |
//! |---------|-------------|-------------|-------------|
//! | exclusive minimum | `minimum` + `exclusiveMinimum: true` | same as 2.0 | `exclusiveMinimum: <number>` |
//! | nullable | `x-nullable` | `nullable` | `"null"` in the `type` array |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A numeric bound with its exclusivity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub value: f64,
    pub exclusive: bool,
}

impl Bound {
    pub fn inclusive(value: f64) -> Self {
        Self {
            value,
            exclusive: false,
        }
    }

    pub fn exclusive(value: f64) -> Self {
        Self {
            value,
            exclusive: true,
        }
    }

    /// True when `self` admits fewer values than `other` as a lower bound.
    pub fn is_tighter_minimum_than(&self, other: &Bound) -> bool {
        self.value > other.value
            || (self.value == other.value && self.exclusive && !other.exclusive)
    }

    /// True when `self` admits fewer values than `other` as an upper bound.
    pub fn is_tighter_maximum_than(&self, other: &Bound) -> bool {
        self.value < other.value
            || (self.value == other.value && self.exclusive && !other.exclusive)
    }
}

/// Physical schema representation of the target document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaDialect {
    #[serde(rename = "2.0")]
    Swagger2,
    #[serde(rename = "3.0")]
    OpenApi30,
    #[serde(rename = "3.1")]
    OpenApi31,
}

impl SchemaDialect {
    /// Parse a dialect name as accepted on the command line.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "2.0" | "swagger" => Some(SchemaDialect::Swagger2),
            "3.0" => Some(SchemaDialect::OpenApi30),
            "3.1" => Some(SchemaDialect::OpenApi31),
            _ => None,
        }
    }

    /// Detect the dialect from a document's `openapi` / `swagger` field.
    pub fn detect(document: &Value) -> Option<Self> {
        if let Some(version) = document.get("openapi").and_then(Value::as_str) {
            if version.starts_with("3.0") {
                return Some(SchemaDialect::OpenApi30);
            }
            if version.starts_with("3.") {
                return Some(SchemaDialect::OpenApi31);
            }
            return None;
        }
        document
            .get("swagger")
            .and_then(Value::as_str)
            .filter(|v| v.starts_with('2'))
            .map(|_| SchemaDialect::Swagger2)
    }

    pub fn shape(self) -> &'static dyn SchemaShape {
        match self {
            SchemaDialect::Swagger2 => &Swagger2,
            SchemaDialect::OpenApi30 => &OpenApi30,
            SchemaDialect::OpenApi31 => &OpenApi31,
        }
    }
}

/// Representation-agnostic access to the parts of a schema object that
/// differ between dialects.
pub trait SchemaShape: Send + Sync {
    fn dialect(&self) -> SchemaDialect;

    fn minimum(&self, schema: &Map<String, Value>) -> Option<Bound>;
    fn set_minimum(&self, schema: &mut Map<String, Value>, bound: Bound);
    fn maximum(&self, schema: &Map<String, Value>) -> Option<Bound>;
    fn set_maximum(&self, schema: &mut Map<String, Value>, bound: Bound);

    fn is_nullable(&self, schema: &Map<String, Value>) -> bool;
    fn set_nullable(&self, schema: &mut Map<String, Value>, nullable: bool);

    fn property<'a>(&self, schema: &'a mut Map<String, Value>, key: &str) -> Option<&'a mut Value> {
        schema
            .get_mut("properties")
            .and_then(Value::as_object_mut)
            .and_then(|props| props.get_mut(key))
    }

    fn items<'a>(&self, schema: &'a mut Map<String, Value>) -> Option<&'a mut Value> {
        schema.get_mut("items").filter(|items| items.is_object())
    }

    /// The `allOf` list, created when missing.
    fn all_of<'a>(&self, schema: &'a mut Map<String, Value>) -> &'a mut Vec<Value> {
        let entry = schema
            .entry("allOf")
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            *entry = Value::Array(Vec::new());
        }
        match entry {
            Value::Array(items) => items,
            _ => unreachable!("allOf was just normalized to an array"),
        }
    }
}

/// Converts a bound to a JSON number, keeping integral values integral.
pub(crate) fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.007_199_254_740_992e15 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Bounds stored as a number plus a boolean exclusivity flag.
fn flagged_bound(schema: &Map<String, Value>, value_key: &str, flag_key: &str) -> Option<Bound> {
    let value = schema.get(value_key).and_then(Value::as_f64)?;
    let exclusive = schema
        .get(flag_key)
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Some(Bound { value, exclusive })
}

fn set_flagged_bound(
    schema: &mut Map<String, Value>,
    value_key: &str,
    flag_key: &str,
    bound: Bound,
) {
    schema.insert(value_key.to_string(), number_value(bound.value));
    if bound.exclusive {
        schema.insert(flag_key.to_string(), Value::Bool(true));
    } else {
        schema.remove(flag_key);
    }
}

/// Swagger 2.0: boolean exclusivity, `x-nullable` vendor extension.
#[derive(Debug, Clone, Copy)]
pub struct Swagger2;

impl SchemaShape for Swagger2 {
    fn dialect(&self) -> SchemaDialect {
        SchemaDialect::Swagger2
    }

    fn minimum(&self, schema: &Map<String, Value>) -> Option<Bound> {
        flagged_bound(schema, "minimum", "exclusiveMinimum")
    }

    fn set_minimum(&self, schema: &mut Map<String, Value>, bound: Bound) {
        set_flagged_bound(schema, "minimum", "exclusiveMinimum", bound)
    }

    fn maximum(&self, schema: &Map<String, Value>) -> Option<Bound> {
        flagged_bound(schema, "maximum", "exclusiveMaximum")
    }

    fn set_maximum(&self, schema: &mut Map<String, Value>, bound: Bound) {
        set_flagged_bound(schema, "maximum", "exclusiveMaximum", bound)
    }

    fn is_nullable(&self, schema: &Map<String, Value>) -> bool {
        schema.get("x-nullable").and_then(Value::as_bool) == Some(true)
    }

    fn set_nullable(&self, schema: &mut Map<String, Value>, nullable: bool) {
        schema.insert("x-nullable".to_string(), Value::Bool(nullable));
    }
}

/// OpenAPI 3.0: boolean exclusivity, `nullable` keyword.
#[derive(Debug, Clone, Copy)]
pub struct OpenApi30;

impl SchemaShape for OpenApi30 {
    fn dialect(&self) -> SchemaDialect {
        SchemaDialect::OpenApi30
    }

    fn minimum(&self, schema: &Map<String, Value>) -> Option<Bound> {
        flagged_bound(schema, "minimum", "exclusiveMinimum")
    }

    fn set_minimum(&self, schema: &mut Map<String, Value>, bound: Bound) {
        set_flagged_bound(schema, "minimum", "exclusiveMinimum", bound)
    }

    fn maximum(&self, schema: &Map<String, Value>) -> Option<Bound> {
        flagged_bound(schema, "maximum", "exclusiveMaximum")
    }

    fn set_maximum(&self, schema: &mut Map<String, Value>, bound: Bound) {
        set_flagged_bound(schema, "maximum", "exclusiveMaximum", bound)
    }

    fn is_nullable(&self, schema: &Map<String, Value>) -> bool {
        schema.get("nullable").and_then(Value::as_bool) == Some(true)
    }

    fn set_nullable(&self, schema: &mut Map<String, Value>, nullable: bool) {
        schema.insert("nullable".to_string(), Value::Bool(nullable));
    }
}

/// OpenAPI 3.1 / JSON Schema 2020-12: numeric exclusive bounds, `"null"`
/// as a member of the `type` union.
#[derive(Debug, Clone, Copy)]
pub struct OpenApi31;

impl OpenApi31 {
    fn bound(
        schema: &Map<String, Value>,
        inclusive_key: &str,
        exclusive_key: &str,
        tighter: fn(&Bound, &Bound) -> bool,
    ) -> Option<Bound> {
        let inclusive = schema
            .get(inclusive_key)
            .and_then(Value::as_f64)
            .map(Bound::inclusive);
        let exclusive = schema
            .get(exclusive_key)
            .and_then(Value::as_f64)
            .map(Bound::exclusive);
        match (inclusive, exclusive) {
            (Some(i), Some(e)) => Some(if tighter(&e, &i) { e } else { i }),
            (i, e) => i.or(e),
        }
    }

    fn set_bound(
        schema: &mut Map<String, Value>,
        inclusive_key: &str,
        exclusive_key: &str,
        bound: Bound,
    ) {
        let (set, clear) = if bound.exclusive {
            (exclusive_key, inclusive_key)
        } else {
            (inclusive_key, exclusive_key)
        };
        schema.insert(set.to_string(), number_value(bound.value));
        schema.remove(clear);
    }
}

fn is_null_branch(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("null")
}

impl SchemaShape for OpenApi31 {
    fn dialect(&self) -> SchemaDialect {
        SchemaDialect::OpenApi31
    }

    fn minimum(&self, schema: &Map<String, Value>) -> Option<Bound> {
        Self::bound(schema, "minimum", "exclusiveMinimum", Bound::is_tighter_minimum_than)
    }

    fn set_minimum(&self, schema: &mut Map<String, Value>, bound: Bound) {
        Self::set_bound(schema, "minimum", "exclusiveMinimum", bound)
    }

    fn maximum(&self, schema: &Map<String, Value>) -> Option<Bound> {
        Self::bound(schema, "maximum", "exclusiveMaximum", Bound::is_tighter_maximum_than)
    }

    fn set_maximum(&self, schema: &mut Map<String, Value>, bound: Bound) {
        Self::set_bound(schema, "maximum", "exclusiveMaximum", bound)
    }

    fn is_nullable(&self, schema: &Map<String, Value>) -> bool {
        let in_type = match schema.get("type") {
            Some(Value::Array(types)) => types.iter().any(|t| t == "null"),
            Some(Value::String(t)) => t == "null",
            _ => false,
        };
        let in_union = ["anyOf", "oneOf"].iter().any(|key| {
            schema
                .get(*key)
                .and_then(Value::as_array)
                .is_some_and(|branches| branches.iter().any(is_null_branch))
        });
        in_type || in_union
    }

    fn set_nullable(&self, schema: &mut Map<String, Value>, nullable: bool) {
        schema.remove("nullable");
        let updated = match schema.get("type").cloned() {
            Some(Value::Array(mut types)) if nullable => {
                if !types.iter().any(|t| t == "null") {
                    types.push(Value::from("null"));
                }
                Some(Value::Array(types))
            }
            Some(Value::String(t)) if nullable && t != "null" => {
                Some(Value::Array(vec![Value::String(t), Value::from("null")]))
            }
            Some(Value::Array(mut types)) if !nullable => {
                types.retain(|t| t != "null");
                if types.len() == 1 {
                    Some(types.remove(0))
                } else {
                    Some(Value::Array(types))
                }
            }
            _ => None,
        };
        if let Some(updated) = updated {
            schema.insert("type".to_string(), updated);
        }
        if nullable {
            return;
        }

        for key in ["anyOf", "oneOf"] {
            if let Some(Value::Array(branches)) = schema.get_mut(key) {
                branches.retain(|branch| !is_null_branch(branch));
            }
        }
    }
}
