//! Schemas the rules write into, and where they come from.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::dialect::{Bound, SchemaShape};
use crate::error::RuleError;
use crate::history::RuleHistory;
use crate::types::json_type_name;

/// Merge an upper bound, keeping the smaller one.
pub fn tighten_max(current: Option<u64>, new: u64) -> u64 {
    current.map_or(new, |c| c.min(new))
}

/// Merge a lower bound, keeping the larger one.
pub fn tighten_min(current: Option<u64>, new: u64) -> u64 {
    current.map_or(new, |c| c.max(new))
}

/// An object schema together with the rules already applied to it.
///
/// The history lives and dies with the schema, so a regenerated schema
/// starts with a clean slate.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    value: Map<String, Value>,
    history: RuleHistory,
}

impl Schema {
    pub fn new(value: Map<String, Value>) -> Self {
        Self {
            value,
            history: RuleHistory::default(),
        }
    }

    /// Returns `None` when `value` is not a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self::new(map)),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.value
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.value
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.value.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.value)
    }

    pub fn history(&self) -> &RuleHistory {
        &self.history
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut Map<String, Value>, &mut RuleHistory) {
        (&mut self.value, &mut self.history)
    }

    /// Keys of `properties`, in document order.
    pub fn property_names(&self) -> Vec<String> {
        self.value
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Typed, dialect-aware access to one schema object.
pub struct SchemaView<'a> {
    map: &'a mut Map<String, Value>,
    shape: &'a dyn SchemaShape,
}

impl<'a> SchemaView<'a> {
    pub fn new(map: &'a mut Map<String, Value>, shape: &'a dyn SchemaShape) -> Self {
        Self { map, shape }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &*self.map
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut *self.map
    }

    pub fn shape(&self) -> &dyn SchemaShape {
        self.shape
    }

    /// A shorter-lived view of the same schema.
    pub fn reborrow(&mut self) -> SchemaView<'_> {
        SchemaView {
            map: &mut *self.map,
            shape: self.shape,
        }
    }

    /// Sub-schema of a named property.
    pub fn property(&mut self, key: &str) -> Result<SchemaView<'_>, RuleError> {
        self.reborrow().into_property(key)
    }

    pub fn into_property(self, key: &str) -> Result<SchemaView<'a>, RuleError> {
        let shape = self.shape;
        let value = shape
            .property(self.map, key)
            .ok_or_else(|| RuleError::PropertyNotFound {
                key: key.to_string(),
            })?;
        object_view(value, key, shape)
    }

    /// Element schema of an array schema; `key` names the owning property.
    pub fn items(&mut self, key: &str) -> Result<SchemaView<'_>, RuleError> {
        self.reborrow().into_items(key)
    }

    pub fn into_items(self, key: &str) -> Result<SchemaView<'a>, RuleError> {
        let shape = self.shape;
        let value = shape
            .items(self.map)
            .ok_or_else(|| RuleError::ItemsNotFound {
                key: key.to_string(),
            })?;
        object_view(value, key, shape)
    }

    /// True when `type` is `name` or a union containing it.
    pub fn has_type(&self, name: &str) -> bool {
        match self.map.get("type") {
            Some(Value::String(t)) => t == name,
            Some(Value::Array(types)) => types.iter().any(|t| t == name),
            _ => false,
        }
    }

    pub fn is_array(&self) -> bool {
        self.has_type("array")
    }

    /// No `type` keyword (e.g. a `$ref` or composed schema).
    pub fn is_untyped(&self) -> bool {
        !self.map.contains_key("type")
    }

    fn get_u64(&self, key: &str) -> Option<u64> {
        self.map.get(key).and_then(Value::as_u64)
    }

    fn set_u64(&mut self, key: &str, value: u64) {
        self.map.insert(key.to_string(), Value::from(value));
    }

    pub fn min_length(&self) -> Option<u64> {
        self.get_u64("minLength")
    }

    pub fn max_length(&self) -> Option<u64> {
        self.get_u64("maxLength")
    }

    pub fn min_items(&self) -> Option<u64> {
        self.get_u64("minItems")
    }

    pub fn max_items(&self) -> Option<u64> {
        self.get_u64("maxItems")
    }

    pub fn tighten_min_length(&mut self, min: u64) {
        let merged = tighten_min(self.min_length(), min);
        self.set_u64("minLength", merged);
    }

    pub fn tighten_max_length(&mut self, max: u64) {
        let merged = tighten_max(self.max_length(), max);
        self.set_u64("maxLength", merged);
    }

    pub fn tighten_min_items(&mut self, min: u64) {
        let merged = tighten_min(self.min_items(), min);
        self.set_u64("minItems", merged);
    }

    pub fn tighten_max_items(&mut self, max: u64) {
        let merged = tighten_max(self.max_items(), max);
        self.set_u64("maxItems", merged);
    }

    pub fn minimum(&self) -> Option<Bound> {
        self.shape.minimum(&*self.map)
    }

    pub fn maximum(&self) -> Option<Bound> {
        self.shape.maximum(&*self.map)
    }

    /// Set the minimum unless an existing one is already tighter.
    pub fn tighten_minimum(&mut self, bound: Bound) {
        match self.minimum() {
            Some(current) if !bound.is_tighter_minimum_than(&current) => {}
            _ => self.shape.set_minimum(self.map, bound),
        }
    }

    /// Set the maximum unless an existing one is already tighter.
    pub fn tighten_maximum(&mut self, bound: Bound) {
        match self.maximum() {
            Some(current) if !bound.is_tighter_maximum_than(&current) => {}
            _ => self.shape.set_maximum(self.map, bound),
        }
    }

    pub fn pattern(&self) -> Option<&str> {
        self.map.get("pattern").and_then(Value::as_str)
    }

    pub fn set_pattern(&mut self, pattern: &str) {
        self.map.insert("pattern".to_string(), Value::from(pattern));
    }

    pub fn take_pattern(&mut self) -> Option<String> {
        match self.map.remove("pattern") {
            Some(Value::String(p)) => Some(p),
            _ => None,
        }
    }

    pub fn all_of_mut(&mut self) -> &mut Vec<Value> {
        self.shape.all_of(self.map)
    }

    /// Patterns already carried by `allOf` entries.
    pub fn all_of_patterns(&self) -> Vec<&str> {
        self.map
            .get("allOf")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.get("pattern").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn format(&self) -> Option<&str> {
        self.map.get("format").and_then(Value::as_str)
    }

    pub fn set_format(&mut self, format: &str) {
        self.map.insert("format".to_string(), Value::from(format));
    }

    pub fn is_nullable(&self) -> bool {
        self.shape.is_nullable(&*self.map)
    }

    pub fn set_not_nullable(&mut self) {
        self.shape.set_nullable(self.map, false);
    }

    pub fn required(&self) -> Vec<&str> {
        self.map
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Add `name` to the `required` list if missing.
    pub fn add_required(&mut self, name: &str) {
        let entry = self
            .map
            .entry("required")
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            *entry = Value::Array(Vec::new());
        }
        if let Value::Array(names) = entry {
            if !names.iter().any(|n| n == name) {
                names.push(Value::from(name));
            }
        }
    }
}

impl fmt::Debug for SchemaView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaView")
            .field("dialect", &self.shape.dialect())
            .field("schema", &self.map)
            .finish()
    }
}

fn object_view<'v>(
    value: &'v mut Value,
    key: &str,
    shape: &'v dyn SchemaShape,
) -> Result<SchemaView<'v>, RuleError> {
    let actual = json_type_name(value);
    match value {
        Value::Object(map) => Ok(SchemaView::new(map, shape)),
        _ => Err(RuleError::NotAnObject {
            key: key.to_string(),
            actual: actual.to_string(),
        }),
    }
}

/// Source of the mutable schema for a type.
///
/// Implementations must return the same schema for repeated lookups of one
/// type, otherwise duplicate rule applications cannot be detected.
pub trait SchemaProvider {
    fn schema_for_type(&mut self, type_name: &str) -> Option<&mut Schema>;
}

type SchemaGenerator = Box<dyn FnMut(&str) -> Option<Value> + Send>;

/// Memoizing in-memory [`SchemaProvider`].
///
/// Missing types are produced by an optional generator and cached.
#[derive(Default)]
pub struct SchemaRepository {
    schemas: BTreeMap<String, Schema>,
    generator: Option<SchemaGenerator>,
}

impl SchemaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate schemas for types not yet in the repository.
    pub fn with_generator(
        mut self,
        generator: impl FnMut(&str) -> Option<Value> + Send + 'static,
    ) -> Self {
        self.generator = Some(Box::new(generator));
        self
    }

    pub fn insert(&mut self, type_name: impl Into<String>, schema: Schema) {
        self.schemas.insert(type_name.into(), schema);
    }

    pub fn get(&self, type_name: &str) -> Option<&Schema> {
        self.schemas.get(type_name)
    }

    pub fn type_names(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn into_schemas(self) -> impl Iterator<Item = (String, Schema)> {
        self.schemas.into_iter()
    }
}

impl SchemaProvider for SchemaRepository {
    fn schema_for_type(&mut self, type_name: &str) -> Option<&mut Schema> {
        if !self.schemas.contains_key(type_name) {
            let generator = self.generator.as_mut()?;
            let generated = generator(type_name)?;
            let schema = Schema::from_value(generated)?;
            self.schemas.insert(type_name.to_string(), schema);
        }
        self.schemas.get_mut(type_name)
    }
}

impl fmt::Debug for SchemaRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRepository")
            .field("schemas", &self.schemas)
            .field("generator", &self.generator.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{OpenApi30, OpenApi31};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn length_bounds_tighten() {
        let mut schema = map(json!({ "type": "string", "maxLength": 10, "minLength": 2 }));
        let mut view = SchemaView::new(&mut schema, &OpenApi30);

        view.tighten_max_length(5);
        view.tighten_max_length(20);
        view.tighten_min_length(1);
        view.tighten_min_length(3);

        assert_eq!(view.max_length(), Some(5));
        assert_eq!(view.min_length(), Some(3));
    }

    #[test]
    fn numeric_bounds_tighten_and_prefer_exclusive() {
        let mut schema = map(json!({ "type": "integer" }));
        let mut view = SchemaView::new(&mut schema, &OpenApi30);

        view.tighten_minimum(Bound::inclusive(10.0));
        view.tighten_minimum(Bound::inclusive(5.0));
        assert_eq!(view.minimum(), Some(Bound::inclusive(10.0)));

        view.tighten_minimum(Bound::exclusive(10.0));
        assert_eq!(view.minimum(), Some(Bound::exclusive(10.0)));

        view.tighten_minimum(Bound::inclusive(10.0));
        assert_eq!(view.minimum(), Some(Bound::exclusive(10.0)));
    }

    #[test]
    fn property_lookup_errors() {
        let mut schema = map(json!({
            "type": "object",
            "properties": { "name": { "type": "string" }, "broken": true }
        }));
        let mut view = SchemaView::new(&mut schema, &OpenApi31);

        assert!(view.property("name").is_ok());
        assert!(matches!(
            view.property("missing"),
            Err(RuleError::PropertyNotFound { .. })
        ));
        assert!(matches!(
            view.property("broken"),
            Err(RuleError::NotAnObject { actual, .. }) if actual == "boolean"
        ));
    }

    #[test]
    fn add_required_is_idempotent() {
        let mut schema = map(json!({ "type": "object" }));
        let mut view = SchemaView::new(&mut schema, &OpenApi30);
        view.add_required("name");
        view.add_required("name");
        view.add_required("age");
        assert_eq!(view.required(), vec!["name", "age"]);
    }

    #[test]
    fn repository_memoizes_generated_schemas() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut repo = SchemaRepository::new().with_generator(move |name| {
            counter.fetch_add(1, Ordering::SeqCst);
            (name == "Address").then(|| json!({ "type": "object" }))
        });

        repo.schema_for_type("Address")
            .unwrap()
            .as_map_mut()
            .insert("title".into(), json!("Address"));
        let again = repo.schema_for_type("Address").unwrap();
        assert_eq!(again.as_map()["title"], json!("Address"));
        assert!(repo.schema_for_type("Unknown").is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn items_view_edits_element_schema() {
        let mut schema = map(json!({ "properties": {
            "emails": { "type": "array", "items": { "type": "string" } },
            "name": { "type": "string" }
        } }));
        let mut view = SchemaView::new(&mut schema, &OpenApi30);

        let mut emails = view.property("emails").unwrap();
        let mut element = emails.items("emails").unwrap();
        assert_eq!(element.format(), None);
        element.set_format("email");
        assert_eq!(element.format(), Some("email"));

        let mut name = view.property("name").unwrap();
        assert!(matches!(name.items("name"), Err(RuleError::ItemsNotFound { .. })));
        assert_eq!(schema["properties"]["emails"]["items"]["format"], json!("email"));
    }

    #[test]
    fn repository_lists_type_names_sorted() {
        let mut repo = SchemaRepository::new();
        repo.insert("Person", Schema::from_value(json!({})).unwrap());
        repo.insert("Address", Schema::from_value(json!({})).unwrap());
        assert_eq!(repo.type_names(), vec!["Address", "Person"]);
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn property_names_follow_document_order() {
        let schema = Schema::from_value(json!({
            "properties": { "b": {}, "a": {} }
        }))
        .unwrap();
        assert_eq!(schema.property_names(), vec!["b", "a"]);
    }
}
