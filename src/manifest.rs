//! Declarative validator manifests.
//!
//! A manifest is a JSON file describing validators the way they would be
//! declared in code, plus the type hierarchy and generation options. It is
//! how the command-line tool gets its validators.
//!
//! ```json
//! {
//!   "options": { "useAllOfForMultipleRules": false },
//!   "types": { "Dog": { "base": "Animal" } },
//!   "validators": [
//!     {
//!       "type": "Person",
//!       "rules": [
//!         { "property": "Name", "checks": [ { "kind": "notEmpty" }, { "kind": "maxLength", "max": 50 } ] },
//!         { "property": "Address", "checks": [ { "kind": "validator", "validator": "AddressValidator" } ] }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Validator references are resolved by name after every validator is
//! built, so validators may refer to each other in any order (including
//! cycles). The name `"self"` refers to the owning validator.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::builder::SchemaBuilder;
use crate::error::ManifestError;
use crate::registry::StaticValidatorRegistry;
use crate::rules::RuleSet;
use crate::types::{SchemaGenerationOptions, TypeHierarchy};
use crate::validation::{
    ChildValidatorAdapter, ComparisonOp, ComparisonValue, DeferredValidator, EmailMode,
    LengthCheck, PropertyCheck, RuleComponent, RuleCondition, ValidationRule, Validator,
};

/// Reference to the validator that owns the rule.
pub const SELF_REFERENCE: &str = "self";

/// A loaded manifest.
#[derive(Debug)]
pub struct Manifest {
    pub options: SchemaGenerationOptions,
    pub types: Arc<TypeHierarchy>,
    pub registry: StaticValidatorRegistry,
    validators: Vec<Arc<Validator>>,
}

impl Manifest {
    /// Every declared validator, in declaration order.
    pub fn validators(&self) -> &[Arc<Validator>] {
        &self.validators
    }

    pub fn validator(&self, name: &str) -> Option<&Arc<Validator>> {
        self.validators.iter().find(|v| v.name() == name)
    }

    /// A builder with the default rules, this manifest's options and its
    /// type hierarchy.
    pub fn schema_builder(&self) -> SchemaBuilder {
        SchemaBuilder::new(RuleSet::defaults(), self.options.clone()).with_types(self.types.clone())
    }
}

/// Load a manifest from a file path.
///
/// # Errors
///
/// Returns `ManifestError::FileNotFound` if the file doesn't exist,
/// `ManifestError::InvalidJson` if it isn't a valid manifest, or one of
/// the reference errors if validators or types don't line up.
pub fn load_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    if !path.exists() {
        return Err(ManifestError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_manifest_str(&content)
}

/// Load a manifest from a JSON string.
pub fn load_manifest_str(content: &str) -> Result<Manifest, ManifestError> {
    let file: ManifestFile =
        serde_json::from_str(content).map_err(|source| ManifestError::InvalidJson { source })?;
    file.build()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestFile {
    #[serde(default)]
    options: SchemaGenerationOptions,
    #[serde(default)]
    types: BTreeMap<String, TypeEntry>,
    #[serde(default)]
    validators: Vec<ValidatorEntry>,
    /// Names to register; every validator when absent.
    register: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TypeEntry {
    base: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidatorEntry {
    name: Option<String>,
    #[serde(rename = "type")]
    validated_type: String,
    #[serde(default)]
    include_conditional_rules: bool,
    #[serde(default)]
    rules: Vec<RuleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleEntry {
    property: Option<String>,
    #[serde(default)]
    for_each: bool,
    condition: Option<RuleCondition>,
    #[serde(default)]
    include_conditional: bool,
    /// Whole-object include of another validator.
    include: Option<String>,
    #[serde(default)]
    checks: Vec<CheckEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckEntry {
    #[serde(flatten)]
    check: CheckSpec,
    condition: Option<RuleCondition>,
    #[serde(default)]
    include_conditional: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum CheckSpec {
    NotNull,
    NotEmpty,
    Length { min: Option<u64>, max: Option<u64> },
    MinLength { min: u64 },
    MaxLength { max: u64 },
    ExactLength { length: u64 },
    Matches { pattern: String },
    GreaterThan { value: Operand },
    GreaterThanOrEqual { value: Operand },
    LessThan { value: Operand },
    LessThanOrEqual { value: Operand },
    InclusiveBetween { from: Operand, to: Operand },
    ExclusiveBetween { from: Operand, to: Operand },
    Email {
        #[serde(default)]
        mode: EmailMode,
    },
    Custom { name: String },
    Validator { validator: String },
    Polymorphic { validators: Vec<String> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Operand {
    Number(f64),
    Member { member: String },
    Other(String),
}

impl From<&Operand> for ComparisonValue {
    fn from(operand: &Operand) -> Self {
        match operand {
            Operand::Number(n) => ComparisonValue::Number(*n),
            Operand::Member { member } => ComparisonValue::Member(member.clone()),
            Operand::Other(s) => ComparisonValue::Other(s.clone()),
        }
    }
}

type Slots = HashMap<String, (ChildValidatorAdapter, DeferredValidator)>;

impl ManifestFile {
    fn build(self) -> Result<Manifest, ManifestError> {
        let mut types = TypeHierarchy::new();
        for (name, entry) in &self.types {
            if let Some(base) = &entry.base {
                types.insert(name.clone(), base.clone());
            }
        }
        if let Some(type_name) = types.find_cycle() {
            return Err(ManifestError::InheritanceCycle {
                type_name: type_name.to_string(),
            });
        }
        let types = Arc::new(types);

        // One deferred slot per name, filled once everything is built.
        let mut slots = Slots::new();
        for entry in &self.validators {
            let name = entry.name();
            if name == SELF_REFERENCE || slots.contains_key(&name) {
                return Err(ManifestError::DuplicateValidator { name });
            }
            slots.insert(name, ChildValidatorAdapter::deferred());
        }

        let validators = self
            .validators
            .iter()
            .map(|entry| entry.build(&slots))
            .collect::<Result<Vec<_>, _>>()?;

        for validator in &validators {
            if let Some((_, slot)) = slots.get(validator.name()) {
                // names are unique, so each slot is filled exactly once
                let _ = slot.set(validator.clone());
            }
        }

        let mut registry =
            StaticValidatorRegistry::new(types.clone(), self.options.validator_search);
        match &self.register {
            Some(names) => {
                for name in names {
                    let validator = validators
                        .iter()
                        .find(|v| v.name() == name)
                        .ok_or_else(|| ManifestError::UnknownValidator {
                            name: name.clone(),
                            referenced_by: "register".to_string(),
                        })?;
                    registry.register(validator.clone());
                }
            }
            None => {
                for validator in &validators {
                    registry.register(validator.clone());
                }
            }
        }

        Ok(Manifest {
            options: self.options,
            types,
            registry,
            validators,
        })
    }
}

impl ValidatorEntry {
    fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}Validator", self.validated_type))
    }

    fn build(&self, slots: &Slots) -> Result<Arc<Validator>, ManifestError> {
        let name = self.name();
        let mut builder = Validator::builder(&self.validated_type)
            .name(&name)
            .include_conditional_rules(self.include_conditional_rules);
        for rule in &self.rules {
            builder = builder.rule(rule.build(&name, slots)?);
        }
        Ok(builder.build())
    }
}

impl RuleEntry {
    fn build(&self, owner: &str, slots: &Slots) -> Result<ValidationRule, ManifestError> {
        let mut components = Vec::with_capacity(self.checks.len() + 1);
        if let Some(include) = &self.include {
            let adapter = lookup(include, owner, slots)?;
            components.push(RuleComponent::new(PropertyCheck::ChildValidator(adapter)));
        }

        for entry in &self.checks {
            let check = entry.check.build(owner, slots)?;
            if self.property.is_none() && check.child_adapters().is_empty() {
                return Err(ManifestError::InvalidCheck {
                    validator: owner.to_string(),
                    message: format!("'{}' check needs a property", check.kind_name()),
                });
            }
            components.push(RuleComponent {
                check,
                condition: entry.condition,
                include_conditional: entry.include_conditional,
            });
        }

        Ok(ValidationRule {
            property: self.property.clone(),
            components,
            condition: self.condition,
            for_each: self.for_each,
            include_conditional: self.include_conditional,
        })
    }
}

impl CheckSpec {
    fn build(&self, owner: &str, slots: &Slots) -> Result<PropertyCheck, ManifestError> {
        let invalid = |message: String| ManifestError::InvalidCheck {
            validator: owner.to_string(),
            message,
        };

        let check = match self {
            CheckSpec::NotNull => PropertyCheck::NotNull,
            CheckSpec::NotEmpty => PropertyCheck::NotEmpty,
            CheckSpec::Length { min, max } => {
                let length = match (*min, *max) {
                    (Some(min), Some(max)) if min > max => {
                        return Err(invalid(format!("length min {} exceeds max {}", min, max)))
                    }
                    (Some(min), Some(max)) => LengthCheck::between(min, max),
                    (Some(min), None) => LengthCheck::minimum(min),
                    (None, Some(max)) => LengthCheck::maximum(max),
                    (None, None) => return Err(invalid("length needs min or max".to_string())),
                };
                PropertyCheck::Length(length)
            }
            CheckSpec::MinLength { min } => PropertyCheck::Length(LengthCheck::minimum(*min)),
            CheckSpec::MaxLength { max } => PropertyCheck::Length(LengthCheck::maximum(*max)),
            CheckSpec::ExactLength { length } => PropertyCheck::Length(LengthCheck::exact(*length)),
            CheckSpec::Matches { pattern } => PropertyCheck::Pattern {
                expression: pattern.clone(),
            },
            CheckSpec::GreaterThan { value } => comparison(ComparisonOp::GreaterThan, value),
            CheckSpec::GreaterThanOrEqual { value } => {
                comparison(ComparisonOp::GreaterThanOrEqual, value)
            }
            CheckSpec::LessThan { value } => comparison(ComparisonOp::LessThan, value),
            CheckSpec::LessThanOrEqual { value } => {
                comparison(ComparisonOp::LessThanOrEqual, value)
            }
            CheckSpec::InclusiveBetween { from, to } => between(from, to, false).map_err(invalid)?,
            CheckSpec::ExclusiveBetween { from, to } => between(from, to, true).map_err(invalid)?,
            CheckSpec::Email { mode } => PropertyCheck::Email(*mode),
            CheckSpec::Custom { name } => PropertyCheck::Custom { name: name.clone() },
            CheckSpec::Validator { validator } => {
                PropertyCheck::ChildValidator(lookup(validator, owner, slots)?)
            }
            CheckSpec::Polymorphic { validators } => PropertyCheck::Polymorphic(
                validators
                    .iter()
                    .map(|name| lookup(name, owner, slots))
                    .collect::<Result<_, _>>()?,
            ),
        };
        Ok(check)
    }
}

fn comparison(op: ComparisonOp, value: &Operand) -> PropertyCheck {
    PropertyCheck::Comparison {
        op,
        value: value.into(),
    }
}

fn between(from: &Operand, to: &Operand, exclusive: bool) -> Result<PropertyCheck, String> {
    if let (Operand::Number(from), Operand::Number(to)) = (from, to) {
        if from > to {
            return Err(format!("between bounds are reversed: {} > {}", from, to));
        }
    }
    Ok(PropertyCheck::Between {
        from: from.into(),
        to: to.into(),
        exclusive,
    })
}

fn lookup(name: &str, owner: &str, slots: &Slots) -> Result<ChildValidatorAdapter, ManifestError> {
    if name == SELF_REFERENCE {
        return Ok(ChildValidatorAdapter::self_reference());
    }
    slots
        .get(name)
        .map(|(adapter, _)| adapter.clone())
        .ok_or_else(|| ManifestError::UnknownValidator {
            name: name.to_string(),
            referenced_by: owner.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ValidatorRegistry;
    use crate::types::ValidatorSearchMode;
    use crate::validation::LengthKind;
    use serde_json::json;

    fn load(manifest: serde_json::Value) -> Result<Manifest, ManifestError> {
        load_manifest_str(&manifest.to_string())
    }

    #[test]
    fn loads_checks_and_options() {
        let manifest = load(json!({
            "options": {
                "useAllOfForMultipleRules": false,
                "namingPolicy": "camel",
                "validatorSearch": { "mode": "manyForType" }
            },
            "validators": [{
                "type": "Person",
                "rules": [
                    { "property": "Name", "checks": [
                        { "kind": "notEmpty" },
                        { "kind": "length", "min": 2, "max": 50 }
                    ]},
                    { "property": "Age", "checks": [
                        { "kind": "inclusiveBetween", "from": 18, "to": 150 },
                        { "kind": "greaterThan", "value": { "member": "MinAge" } }
                    ]},
                    { "property": "Email", "checks": [
                        { "kind": "email", "mode": "net4xRegex", "condition": "when" }
                    ]}
                ]
            }]
        }))
        .unwrap();

        assert!(!manifest.options.use_all_of_for_multiple_rules);
        assert_eq!(manifest.options.validator_search.mode, ValidatorSearchMode::ManyForType);

        assert_eq!(manifest.validators().len(), 1);
        let builder = manifest.schema_builder();
        assert!(!builder.options().use_all_of_for_multiple_rules);
        assert_eq!(builder.rules().len(), RuleSet::defaults().len());

        let person = manifest.validator("PersonValidator").unwrap();
        let rules = person.rules();
        assert_eq!(rules.len(), 3);
        assert_eq!(
            rules[0].components[1].check.length().map(|l| l.kind),
            Some(LengthKind::Between)
        );
        assert_eq!(rules[1].components[0].check.numeric_between(), Some((18.0, 150.0, false)));
        assert_eq!(rules[1].components[1].check.numeric_comparison(), None);
        assert_eq!(rules[2].components[0].condition, Some(RuleCondition::When));
        assert!(matches!(
            rules[2].components[0].check,
            PropertyCheck::Email(EmailMode::Net4xRegex)
        ));
    }

    #[test]
    fn references_resolve_in_any_order() {
        let manifest = load(json!({
            "validators": [
                { "type": "Person", "rules": [
                    { "property": "Address", "checks": [{ "kind": "validator", "validator": "AddressValidator" }] }
                ]},
                { "type": "Address", "rules": [
                    { "property": "Resident", "checks": [{ "kind": "validator", "validator": "PersonValidator" }] }
                ]}
            ]
        }))
        .unwrap();

        let person = manifest.validator("PersonValidator").unwrap();
        let address = manifest.validator("AddressValidator").unwrap();
        let adapter = &person.rules()[0].components[0].check.child_adapters()[0];
        assert!(Arc::ptr_eq(&adapter.resolve(person).unwrap(), address));

        let back = &address.rules()[0].components[0].check.child_adapters()[0];
        assert!(Arc::ptr_eq(&back.resolve(address).unwrap(), person));
    }

    #[test]
    fn self_reference() {
        let manifest = load(json!({
            "validators": [{ "type": "Node", "rules": [
                { "property": "Children", "forEach": true, "checks": [{ "kind": "validator", "validator": "self" }] }
            ]}]
        }))
        .unwrap();

        let node = manifest.validator("NodeValidator").unwrap();
        let adapter = &node.rules()[0].components[0].check.child_adapters()[0];
        assert!(adapter.is_self_reference());
        assert!(node.rules()[0].for_each);
    }

    #[test]
    fn include_rule_has_no_property() {
        let manifest = load(json!({
            "validators": [
                { "name": "Base", "type": "Person", "rules": [
                    { "property": "Name", "checks": [{ "kind": "notNull" }] }
                ]},
                { "type": "Person", "rules": [{ "include": "Base" }] }
            ],
            "register": ["PersonValidator"]
        }))
        .unwrap();

        let person = manifest.registry.validator("Person").unwrap();
        assert_eq!(person.name(), "PersonValidator");
        assert_eq!(person.rules()[0].property, None);
        assert_eq!(person.rules()[0].components[0].check.child_adapters().len(), 1);
    }

    #[test]
    fn type_hierarchy_feeds_registry() {
        let manifest = load(json!({
            "types": { "Dog": { "base": "Animal" } },
            "validators": [{ "type": "Animal", "rules": [] }]
        }))
        .unwrap();

        assert!(manifest.types.is_assignable("Animal", "Dog"));
        assert_eq!(manifest.registry.validator("Dog").unwrap().name(), "AnimalValidator");
    }

    #[test]
    fn reference_errors() {
        let err = load(json!({
            "validators": [{ "type": "Person", "rules": [
                { "property": "Address", "checks": [{ "kind": "validator", "validator": "Nope" }] }
            ]}]
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ManifestError::UnknownValidator { ref name, ref referenced_by }
                if name == "Nope" && referenced_by == "PersonValidator"
        ));

        let err = load(json!({
            "validators": [{ "type": "Person" }, { "type": "Person" }]
        }))
        .unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateValidator { .. }));

        let err = load(json!({
            "validators": [{ "type": "Person" }],
            "register": ["Ghost"]
        }))
        .unwrap_err();
        assert!(matches!(err, ManifestError::UnknownValidator { .. }));
    }

    #[test]
    fn inheritance_cycle_is_rejected() {
        let err = load(json!({
            "types": { "A": { "base": "B" }, "B": { "base": "A" } }
        }))
        .unwrap_err();
        assert!(matches!(err, ManifestError::InheritanceCycle { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn invalid_checks() {
        let err = load(json!({
            "validators": [{ "type": "Person", "rules": [
                { "property": "Name", "checks": [{ "kind": "length" }] }
            ]}]
        }))
        .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidCheck { .. }));

        let err = load(json!({
            "validators": [{ "type": "Person", "rules": [
                { "property": "Age", "checks": [{ "kind": "inclusiveBetween", "from": 10, "to": 1 }] }
            ]}]
        }))
        .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidCheck { .. }));

        let err = load(json!({
            "validators": [{ "type": "Person", "rules": [{ "checks": [{ "kind": "notNull" }] }] }]
        }))
        .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidCheck { .. }));
    }

    #[test]
    fn unknown_check_kind_is_invalid_json() {
        let err = load(json!({
            "validators": [{ "type": "Person", "rules": [
                { "property": "Name", "checks": [{ "kind": "sparkly" }] }
            ]}]
        }))
        .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidJson { .. }));
    }

    #[test]
    fn missing_file() {
        let err = load_manifest(Path::new("/nonexistent/validators.json")).unwrap_err();
        assert!(matches!(err, ManifestError::FileNotFound { .. }));
        assert_eq!(err.exit_code(), 3);
    }
}
