//! Core types: generation options, naming policies and the type hierarchy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dialect::SchemaDialect;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Derived-to-base relation between validated type names.
///
/// Used for base-type validator fallback and to decide whether an included
/// validator validates the current schema's type or a different one.
#[derive(Debug, Clone, Default)]
pub struct TypeHierarchy {
    bases: HashMap<String, String>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `base` as the base type of `derived`.
    pub fn with_base(mut self, derived: impl Into<String>, base: impl Into<String>) -> Self {
        self.insert(derived, base);
        self
    }

    pub fn insert(&mut self, derived: impl Into<String>, base: impl Into<String>) {
        self.bases.insert(derived.into(), base.into());
    }

    /// Direct base type of `type_name`, if declared.
    pub fn base_of(&self, type_name: &str) -> Option<&str> {
        self.bases.get(type_name).map(String::as_str)
    }

    /// Base types of `type_name`, nearest first.
    ///
    /// Stops after visiting every declared edge once, so a malformed
    /// hierarchy with a cycle still terminates.
    pub fn ancestors<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let mut current = type_name;
        let mut remaining = self.bases.len();
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            let base = self.base_of(current)?;
            current = base;
            Some(base)
        })
    }

    /// True when a value of `source` type can be handled as `target`
    /// (same type, or `target` is one of its base types).
    pub fn is_assignable(&self, target: &str, source: &str) -> bool {
        target == source || self.ancestors(source).any(|base| base == target)
    }

    /// Returns a type whose base chain leads back to itself.
    pub fn find_cycle(&self) -> Option<&str> {
        let mut names: Vec<&String> = self.bases.keys().collect();
        names.sort();
        names
            .into_iter()
            .find(|name| self.ancestors(name.as_str()).any(|base| base == name.as_str()))
            .map(String::as_str)
    }
}

/// Translates a member's declared name into the name used by the schema.
pub trait NameResolver: Send + Sync {
    fn property_name(&self, member: &str) -> String;
}

/// Built-in JSON naming policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NamingPolicy {
    /// Member names are used unchanged.
    #[default]
    #[serde(rename = "as-is")]
    AsIs,
    #[serde(rename = "camel")]
    CamelCase,
    #[serde(rename = "snake")]
    SnakeCase,
    #[serde(rename = "kebab")]
    KebabCase,
}

impl NamingPolicy {
    /// Parse a policy name as accepted on the command line.
    ///
    /// Returns `None` for unknown values (caller should error).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "as-is" => Some(NamingPolicy::AsIs),
            "camel" => Some(NamingPolicy::CamelCase),
            "snake" => Some(NamingPolicy::SnakeCase),
            "kebab" => Some(NamingPolicy::KebabCase),
            _ => None,
        }
    }
}

impl NameResolver for NamingPolicy {
    fn property_name(&self, member: &str) -> String {
        match self {
            NamingPolicy::AsIs => member.to_string(),
            NamingPolicy::CamelCase => to_camel_case(member),
            NamingPolicy::SnakeCase => split_words(member).join("_"),
            NamingPolicy::KebabCase => split_words(member).join("-"),
        }
    }
}

/// Lowercases the leading run of capitals, keeping the last capital of a run
/// that starts the next word ("URLValue" -> "urlValue").
fn to_camel_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len());
    let mut leading = true;
    for (i, c) in chars.iter().enumerate() {
        if leading && c.is_uppercase() {
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if i > 0 && next_is_lower {
                leading = false;
                out.push(*c);
            } else {
                out.extend(c.to_lowercase());
            }
        } else {
            leading = false;
            out.push(*c);
        }
    }
    out
}

/// Lowercase words split at case boundaries, underscores and dashes.
fn split_words(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut words = Vec::new();
    let mut word = String::new();
    for (i, c) in chars.iter().enumerate() {
        if *c == '_' || *c == '-' || c.is_whitespace() {
            if !word.is_empty() {
                words.push(std::mem::take(&mut word));
            }
            continue;
        }
        if c.is_uppercase() && !word.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower)
            {
                words.push(std::mem::take(&mut word));
            }
        }
        word.extend(c.to_lowercase());
    }
    if !word.is_empty() {
        words.push(word);
    }
    words
}

/// How many validators are collected for one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidatorSearchMode {
    /// Stop at the first registered validator.
    #[default]
    OneForType,
    /// Collect every registered validator.
    ManyForType,
}

/// Validator lookup strategy used by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidatorSearch {
    pub mode: ValidatorSearchMode,
    /// Fall back to the base type's validators when a type has none.
    pub search_base_types: bool,
}

impl Default for ValidatorSearch {
    fn default() -> Self {
        Self {
            mode: ValidatorSearchMode::OneForType,
            search_base_types: true,
        }
    }
}

/// Options for schema generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchemaGenerationOptions {
    /// Mark a property non-nullable when a rule forces its minimum length above zero.
    pub set_not_nullable_if_min_length_greater_than_zero: bool,
    /// Compose repeated patterns as `allOf` entries instead of overwriting `pattern`.
    pub use_all_of_for_multiple_rules: bool,
    pub validator_search: ValidatorSearch,
    pub naming_policy: NamingPolicy,
    /// Physical schema shape. `None` detects it from the document version.
    pub dialect: Option<SchemaDialect>,
}

impl Default for SchemaGenerationOptions {
    fn default() -> Self {
        Self {
            set_not_nullable_if_min_length_greater_than_zero: true,
            use_all_of_for_multiple_rules: true,
            validator_search: ValidatorSearch::default(),
            naming_policy: NamingPolicy::AsIs,
            dialect: None,
        }
    }
}

impl SchemaGenerationOptions {
    pub fn set_not_nullable_if_min_length_greater_than_zero(mut self, value: bool) -> Self {
        self.set_not_nullable_if_min_length_greater_than_zero = value;
        self
    }

    pub fn use_all_of_for_multiple_rules(mut self, value: bool) -> Self {
        self.use_all_of_for_multiple_rules = value;
        self
    }

    pub fn validator_search(mut self, search: ValidatorSearch) -> Self {
        self.validator_search = search;
        self
    }

    pub fn naming_policy(mut self, policy: NamingPolicy) -> Self {
        self.naming_policy = policy;
        self
    }

    pub fn dialect(mut self, dialect: SchemaDialect) -> Self {
        self.dialect = Some(dialect);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hierarchy_assignability() {
        let types = TypeHierarchy::new()
            .with_base("Dog", "Animal")
            .with_base("Puppy", "Dog");

        assert!(types.is_assignable("Animal", "Puppy"));
        assert!(types.is_assignable("Dog", "Dog"));
        assert!(!types.is_assignable("Puppy", "Animal"));
        assert_eq!(types.ancestors("Puppy").collect::<Vec<_>>(), ["Dog", "Animal"]);
    }

    #[test]
    fn hierarchy_cycle_terminates() {
        let types = TypeHierarchy::new().with_base("A", "B").with_base("B", "A");
        assert_eq!(types.find_cycle(), Some("A"));
        assert!(!types.is_assignable("C", "A"));
    }

    #[test]
    fn naming_policies() {
        assert_eq!(NamingPolicy::AsIs.property_name("FirstName"), "FirstName");
        assert_eq!(NamingPolicy::CamelCase.property_name("FirstName"), "firstName");
        assert_eq!(NamingPolicy::CamelCase.property_name("URLValue"), "urlValue");
        assert_eq!(NamingPolicy::CamelCase.property_name("ID"), "id");
        assert_eq!(NamingPolicy::SnakeCase.property_name("FirstName"), "first_name");
        assert_eq!(NamingPolicy::SnakeCase.property_name("URLValue"), "url_value");
        assert_eq!(NamingPolicy::KebabCase.property_name("PostCode2"), "post-code2");
    }

    #[test]
    fn naming_policy_parse() {
        assert_eq!(NamingPolicy::parse("camel"), Some(NamingPolicy::CamelCase));
        assert_eq!(NamingPolicy::parse("pascal"), None);
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: SchemaGenerationOptions = serde_json::from_value(json!({
            "useAllOfForMultipleRules": false,
            "namingPolicy": "camel",
            "validatorSearch": { "mode": "manyForType" }
        }))
        .unwrap();

        assert!(!options.use_all_of_for_multiple_rules);
        assert!(options.set_not_nullable_if_min_length_greater_than_zero);
        assert_eq!(options.naming_policy, NamingPolicy::CamelCase);
        assert_eq!(options.validator_search.mode, ValidatorSearchMode::ManyForType);
        assert!(options.validator_search.search_base_types);
    }
}
