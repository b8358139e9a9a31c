//! Validation-rule model consumed by the schema builder.
//!
//! A [`Validator`] holds ordered [`ValidationRule`]s for one validated type.
//! Each rule targets a property (or the whole object) and carries atomic
//! [`PropertyCheck`]s. Nested validators are reached through
//! [`ChildValidatorAdapter`], which exposes the child explicitly instead of
//! requiring runtime introspection.
//!
//! # Example
//!
//! ```
//! use schema_rules::Validator;
//!
//! let person = Validator::builder("Person")
//!     .rule_for("Name", |r| r.not_empty().maximum_length(50))
//!     .rule_for("Age", |r| r.inclusive_between(18, 150))
//!     .build();
//!
//! assert_eq!(person.rules().len(), 2);
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use serde::Deserialize;

use crate::error::AdapterError;

/// Pattern carried by the regex-based email check.
pub const NET4X_EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

/// Runtime condition guarding a rule or a single check.
///
/// Conditions cannot be evaluated while generating a schema, so guarded
/// rules are skipped unless explicitly opted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleCondition {
    When,
    Unless,
    WhenAsync,
    UnlessAsync,
}

/// Which length-validator variant produced a [`LengthCheck`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LengthKind {
    Between,
    Minimum,
    Maximum,
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LengthCheck {
    pub kind: LengthKind,
    pub min: u64,
    /// `None` means unbounded.
    pub max: Option<u64>,
}

impl LengthCheck {
    pub fn between(min: u64, max: u64) -> Self {
        Self {
            kind: LengthKind::Between,
            min,
            max: Some(max),
        }
    }

    pub fn minimum(min: u64) -> Self {
        Self {
            kind: LengthKind::Minimum,
            min,
            max: None,
        }
    }

    pub fn maximum(max: u64) -> Self {
        Self {
            kind: LengthKind::Maximum,
            min: 0,
            max: Some(max),
        }
    }

    pub fn exact(length: u64) -> Self {
        Self {
            kind: LengthKind::Exact,
            min: length,
            max: Some(length),
        }
    }

    /// True for the variants whose minimum is a deliberate lower bound.
    pub fn is_lower_bound(&self) -> bool {
        matches!(self.kind, LengthKind::Minimum | LengthKind::Exact)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl ComparisonOp {
    /// True when the comparison constrains the minimum.
    pub fn is_lower_bound(&self) -> bool {
        matches!(self, ComparisonOp::GreaterThan | ComparisonOp::GreaterThanOrEqual)
    }

    /// True for strict comparisons.
    pub fn is_exclusive(&self) -> bool {
        matches!(self, ComparisonOp::GreaterThan | ComparisonOp::LessThan)
    }
}

/// Right-hand side of a comparison check.
#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonValue {
    Number(f64),
    /// Compared against another member of the same object.
    Member(String),
    /// A non-numeric constant (dates, strings).
    Other(String),
}

impl ComparisonValue {
    /// The operand as a schema bound. NaN and infinities are not bounds.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ComparisonValue::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }
}

macro_rules! comparison_value_from {
    ($($t:ty),*) => {
        $(impl From<$t> for ComparisonValue {
            fn from(value: $t) -> Self {
                ComparisonValue::Number(value as f64)
            }
        })*
    };
}

comparison_value_from!(i32, i64, u32, u64, f32, f64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EmailMode {
    /// Checks only for a single `@`; produces `format: email`.
    #[default]
    AspNetCoreCompatible,
    /// Regex-based check; also exposes [`NET4X_EMAIL_PATTERN`].
    Net4xRegex,
}

/// One atomic validation predicate.
#[derive(Debug, Clone)]
pub enum PropertyCheck {
    NotNull,
    NotEmpty,
    Length(LengthCheck),
    Pattern {
        expression: String,
    },
    Comparison {
        op: ComparisonOp,
        value: ComparisonValue,
    },
    Between {
        from: ComparisonValue,
        to: ComparisonValue,
        exclusive: bool,
    },
    Email(EmailMode),
    /// A check with no schema projection unless a custom rule matches it by name.
    Custom {
        name: String,
    },
    ChildValidator(ChildValidatorAdapter),
    /// Inheritance dispatch: one child validator per derived type.
    Polymorphic(Vec<ChildValidatorAdapter>),
}

impl PropertyCheck {
    /// Short kind name for diagnostics.
    pub fn kind_name(&self) -> &str {
        match self {
            PropertyCheck::NotNull => "NotNull",
            PropertyCheck::NotEmpty => "NotEmpty",
            PropertyCheck::Length(_) => "Length",
            PropertyCheck::Pattern { .. } => "Pattern",
            PropertyCheck::Comparison { .. } => "Comparison",
            PropertyCheck::Between { .. } => "Between",
            PropertyCheck::Email(_) => "Email",
            PropertyCheck::Custom { name } => name,
            PropertyCheck::ChildValidator(_) => "ChildValidator",
            PropertyCheck::Polymorphic(_) => "Polymorphic",
        }
    }

    pub fn is_not_null(&self) -> bool {
        matches!(self, PropertyCheck::NotNull)
    }

    pub fn is_not_empty(&self) -> bool {
        matches!(self, PropertyCheck::NotEmpty)
    }

    pub fn is_email(&self) -> bool {
        matches!(self, PropertyCheck::Email(_))
    }

    pub fn length(&self) -> Option<&LengthCheck> {
        match self {
            PropertyCheck::Length(length) => Some(length),
            _ => None,
        }
    }

    /// Regular expression enforced by this check, if any.
    pub fn regex_pattern(&self) -> Option<&str> {
        match self {
            PropertyCheck::Pattern { expression } => Some(expression),
            PropertyCheck::Email(EmailMode::Net4xRegex) => Some(NET4X_EMAIL_PATTERN),
            _ => None,
        }
    }

    /// Comparison operator and value when the compared value is numeric.
    pub fn numeric_comparison(&self) -> Option<(ComparisonOp, f64)> {
        match self {
            PropertyCheck::Comparison { op, value } => value.as_number().map(|n| (*op, n)),
            _ => None,
        }
    }

    /// `(from, to, exclusive)` when both bounds are numeric.
    pub fn numeric_between(&self) -> Option<(f64, f64, bool)> {
        match self {
            PropertyCheck::Between {
                from,
                to,
                exclusive,
            } => Some((from.as_number()?, to.as_number()?, *exclusive)),
            _ => None,
        }
    }

    /// Child-validator adapters wrapped by this check.
    pub fn child_adapters(&self) -> &[ChildValidatorAdapter] {
        match self {
            PropertyCheck::ChildValidator(adapter) => std::slice::from_ref(adapter),
            PropertyCheck::Polymorphic(adapters) => adapters,
            _ => &[],
        }
    }
}

#[derive(Clone)]
enum ChildSource {
    Instance(Arc<Validator>),
    SelfReference,
    Deferred(Arc<OnceLock<Weak<Validator>>>),
}

/// Explicit access to a nested validator.
#[derive(Clone)]
pub struct ChildValidatorAdapter {
    source: ChildSource,
}

impl ChildValidatorAdapter {
    pub fn new(validator: Arc<Validator>) -> Self {
        Self {
            source: ChildSource::Instance(validator),
        }
    }

    /// Refers to the validator that owns the rule (recursive structures).
    pub fn self_reference() -> Self {
        Self {
            source: ChildSource::SelfReference,
        }
    }

    /// An adapter whose validator is supplied after construction.
    ///
    /// Needed for validators that reach each other through more than one hop.
    /// The target is held weakly so cyclic graphs can be freed. The caller
    /// keeps the validator alive, as [`crate::Manifest`] does.
    pub fn deferred() -> (Self, DeferredValidator) {
        let slot = Arc::new(OnceLock::new());
        let adapter = Self {
            source: ChildSource::Deferred(slot.clone()),
        };
        (adapter, DeferredValidator { slot })
    }

    pub fn is_self_reference(&self) -> bool {
        matches!(self.source, ChildSource::SelfReference)
    }

    /// Resolve the nested validator; `owner` is the validator holding the rule.
    pub fn resolve(&self, owner: &Arc<Validator>) -> Result<Arc<Validator>, AdapterError> {
        match &self.source {
            ChildSource::Instance(validator) => Ok(validator.clone()),
            ChildSource::SelfReference => Ok(owner.clone()),
            ChildSource::Deferred(slot) => slot
                .get()
                .ok_or(AdapterError::Uninitialized)?
                .upgrade()
                .ok_or(AdapterError::Dropped),
        }
    }
}

impl fmt::Debug for ChildValidatorAdapter {
    // Validator graphs may be cyclic, so only the target type is printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ChildSource::Instance(v) => write!(f, "ChildValidator({})", v.validated_type()),
            ChildSource::SelfReference => f.write_str("ChildValidator(self)"),
            ChildSource::Deferred(slot) => match slot.get().map(Weak::upgrade) {
                Some(Some(v)) => write!(f, "ChildValidator(deferred {})", v.validated_type()),
                Some(None) => f.write_str("ChildValidator(deferred, dropped)"),
                None => f.write_str("ChildValidator(deferred, unset)"),
            },
        }
    }
}

/// Write side of [`ChildValidatorAdapter::deferred`].
#[derive(Debug, Clone)]
pub struct DeferredValidator {
    slot: Arc<OnceLock<Weak<Validator>>>,
}

impl DeferredValidator {
    /// Fill the slot. Returns the validator back if it was already set.
    pub fn set(&self, validator: Arc<Validator>) -> Result<(), Arc<Validator>> {
        self.slot
            .set(Arc::downgrade(&validator))
            .map_err(|_| validator)
    }
}

/// A check inside a rule, with its own optional condition.
#[derive(Debug, Clone)]
pub struct RuleComponent {
    pub check: PropertyCheck,
    pub condition: Option<RuleCondition>,
    /// Opt this check in even when conditional.
    pub include_conditional: bool,
}

impl RuleComponent {
    pub fn new(check: PropertyCheck) -> Self {
        Self {
            check,
            condition: None,
            include_conditional: false,
        }
    }
}

/// One declared constraint on a property, or on the whole object.
#[derive(Debug, Clone, Default)]
pub struct ValidationRule {
    /// `None` for whole-object rules such as includes.
    pub property: Option<String>,
    pub components: Vec<RuleComponent>,
    pub condition: Option<RuleCondition>,
    /// Rule applies to every element of a collection property.
    pub for_each: bool,
    pub include_conditional: bool,
}

impl ValidationRule {
    pub fn for_property(property: impl Into<String>) -> Self {
        Self {
            property: Some(property.into()),
            ..Self::default()
        }
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }
}

/// A set of rules for one validated type.
#[derive(Debug)]
pub struct Validator {
    name: String,
    validated_type: String,
    rules: Vec<ValidationRule>,
    include_conditional_rules: bool,
}

impl Validator {
    pub fn builder(validated_type: impl Into<String>) -> ValidatorBuilder {
        let validated_type = validated_type.into();
        ValidatorBuilder {
            name: format!("{validated_type}Validator"),
            validated_type,
            rules: Vec::new(),
            include_conditional_rules: false,
            condition: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn validated_type(&self) -> &str {
        &self.validated_type
    }

    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    /// Conditional rules of this validator are projected onto the schema.
    pub fn include_conditional_rules(&self) -> bool {
        self.include_conditional_rules
    }
}

/// Fluent construction of a [`Validator`].
#[derive(Debug)]
pub struct ValidatorBuilder {
    name: String,
    validated_type: String,
    rules: Vec<ValidationRule>,
    include_conditional_rules: bool,
    condition: Option<RuleCondition>,
}

impl ValidatorBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn include_conditional_rules(mut self, include: bool) -> Self {
        self.include_conditional_rules = include;
        self
    }

    /// Declare checks on a property.
    pub fn rule_for(
        self,
        property: impl Into<String>,
        build: impl FnOnce(ValidationRuleBuilder) -> ValidationRuleBuilder,
    ) -> Self {
        let rule = ValidationRule::for_property(property);
        self.push(build(ValidationRuleBuilder { rule }).rule)
    }

    /// Declare checks on every element of a collection property.
    pub fn rule_for_each(
        self,
        property: impl Into<String>,
        build: impl FnOnce(ValidationRuleBuilder) -> ValidationRuleBuilder,
    ) -> Self {
        let mut rule = ValidationRule::for_property(property);
        rule.for_each = true;
        self.push(build(ValidationRuleBuilder { rule }).rule)
    }

    /// Include all rules of another validator of this type (or a base type).
    pub fn include(self, validator: Arc<Validator>) -> Self {
        self.include_adapter(ChildValidatorAdapter::new(validator))
    }

    pub fn include_adapter(self, adapter: ChildValidatorAdapter) -> Self {
        let rule = ValidationRule {
            components: vec![RuleComponent::new(PropertyCheck::ChildValidator(adapter))],
            ..ValidationRule::default()
        };
        self.push(rule)
    }

    /// Add an already-built rule.
    pub fn rule(self, rule: ValidationRule) -> Self {
        self.push(rule)
    }

    /// Rules declared inside `build` carry `condition`.
    pub fn conditional(
        mut self,
        condition: RuleCondition,
        build: impl FnOnce(Self) -> Self,
    ) -> Self {
        let outer = self.condition.replace(condition);
        self = build(self);
        self.condition = outer;
        self
    }

    pub fn when(self, build: impl FnOnce(Self) -> Self) -> Self {
        self.conditional(RuleCondition::When, build)
    }

    pub fn unless(self, build: impl FnOnce(Self) -> Self) -> Self {
        self.conditional(RuleCondition::Unless, build)
    }

    pub fn build(self) -> Arc<Validator> {
        Arc::new(Validator {
            name: self.name,
            validated_type: self.validated_type,
            rules: self.rules,
            include_conditional_rules: self.include_conditional_rules,
        })
    }

    fn push(mut self, mut rule: ValidationRule) -> Self {
        if rule.condition.is_none() {
            rule.condition = self.condition;
        }
        self.rules.push(rule);
        self
    }
}

/// Fluent construction of one [`ValidationRule`].
#[derive(Debug)]
pub struct ValidationRuleBuilder {
    rule: ValidationRule,
}

impl ValidationRuleBuilder {
    pub fn check(mut self, check: PropertyCheck) -> Self {
        self.rule.components.push(RuleComponent::new(check));
        self
    }

    pub fn not_null(self) -> Self {
        self.check(PropertyCheck::NotNull)
    }

    pub fn not_empty(self) -> Self {
        self.check(PropertyCheck::NotEmpty)
    }

    pub fn length(self, min: u64, max: u64) -> Self {
        self.check(PropertyCheck::Length(LengthCheck::between(min, max)))
    }

    pub fn minimum_length(self, min: u64) -> Self {
        self.check(PropertyCheck::Length(LengthCheck::minimum(min)))
    }

    pub fn maximum_length(self, max: u64) -> Self {
        self.check(PropertyCheck::Length(LengthCheck::maximum(max)))
    }

    pub fn exact_length(self, length: u64) -> Self {
        self.check(PropertyCheck::Length(LengthCheck::exact(length)))
    }

    pub fn matches(self, expression: impl Into<String>) -> Self {
        self.check(PropertyCheck::Pattern {
            expression: expression.into(),
        })
    }

    pub fn greater_than(self, value: impl Into<ComparisonValue>) -> Self {
        self.compare(ComparisonOp::GreaterThan, value.into())
    }

    pub fn greater_than_or_equal_to(self, value: impl Into<ComparisonValue>) -> Self {
        self.compare(ComparisonOp::GreaterThanOrEqual, value.into())
    }

    pub fn less_than(self, value: impl Into<ComparisonValue>) -> Self {
        self.compare(ComparisonOp::LessThan, value.into())
    }

    pub fn less_than_or_equal_to(self, value: impl Into<ComparisonValue>) -> Self {
        self.compare(ComparisonOp::LessThanOrEqual, value.into())
    }

    pub fn compare(self, op: ComparisonOp, value: ComparisonValue) -> Self {
        self.check(PropertyCheck::Comparison { op, value })
    }

    pub fn inclusive_between(
        self,
        from: impl Into<ComparisonValue>,
        to: impl Into<ComparisonValue>,
    ) -> Self {
        self.check(PropertyCheck::Between {
            from: from.into(),
            to: to.into(),
            exclusive: false,
        })
    }

    pub fn exclusive_between(
        self,
        from: impl Into<ComparisonValue>,
        to: impl Into<ComparisonValue>,
    ) -> Self {
        self.check(PropertyCheck::Between {
            from: from.into(),
            to: to.into(),
            exclusive: true,
        })
    }

    pub fn email(self) -> Self {
        self.check(PropertyCheck::Email(EmailMode::AspNetCoreCompatible))
    }

    pub fn email_with_mode(self, mode: EmailMode) -> Self {
        self.check(PropertyCheck::Email(mode))
    }

    pub fn custom(self, name: impl Into<String>) -> Self {
        self.check(PropertyCheck::Custom { name: name.into() })
    }

    pub fn set_validator(self, validator: Arc<Validator>) -> Self {
        self.set_validator_adapter(ChildValidatorAdapter::new(validator))
    }

    /// Validate the property with the validator that owns this rule.
    pub fn set_self_validator(self) -> Self {
        self.set_validator_adapter(ChildValidatorAdapter::self_reference())
    }

    pub fn set_validator_adapter(self, adapter: ChildValidatorAdapter) -> Self {
        self.check(PropertyCheck::ChildValidator(adapter))
    }

    pub fn set_inheritance_validator(self, derived: Vec<Arc<Validator>>) -> Self {
        let adapters = derived.into_iter().map(ChildValidatorAdapter::new).collect();
        self.check(PropertyCheck::Polymorphic(adapters))
    }

    /// Guard every check declared so far with `condition`.
    pub fn condition(mut self, condition: RuleCondition) -> Self {
        for component in &mut self.rule.components {
            component.condition = Some(condition);
        }
        self
    }

    pub fn when(self) -> Self {
        self.condition(RuleCondition::When)
    }

    pub fn unless(self) -> Self {
        self.condition(RuleCondition::Unless)
    }

    pub fn when_async(self) -> Self {
        self.condition(RuleCondition::WhenAsync)
    }

    pub fn unless_async(self) -> Self {
        self.condition(RuleCondition::UnlessAsync)
    }

    /// Project this rule onto the schema even when it is conditional.
    pub fn include_conditional(mut self) -> Self {
        self.rule.include_conditional = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_rules_in_order() {
        let validator = Validator::builder("Person")
            .rule_for("Name", |r| r.not_empty().maximum_length(50))
            .rule_for_each("Emails", |r| r.email())
            .build();

        assert_eq!(validator.name(), "PersonValidator");
        let rules = validator.rules();
        assert_eq!(rules[0].property.as_deref(), Some("Name"));
        assert_eq!(rules[0].components.len(), 2);
        assert!(!rules[0].for_each);
        assert!(rules[1].for_each);
    }

    #[test]
    fn block_condition_applies_to_nested_rules_only() {
        let validator = Validator::builder("Order")
            .when(|b| b.rule_for("Coupon", |r| r.not_empty()))
            .rule_for("Id", |r| r.not_null())
            .build();

        assert_eq!(validator.rules()[0].condition, Some(RuleCondition::When));
        assert_eq!(validator.rules()[1].condition, None);
    }

    #[test]
    fn component_condition_covers_preceding_checks() {
        let validator = Validator::builder("Order")
            .rule_for("Coupon", |r| r.not_empty().maximum_length(8).unless().email())
            .build();

        let components = &validator.rules()[0].components;
        assert_eq!(components[0].condition, Some(RuleCondition::Unless));
        assert_eq!(components[1].condition, Some(RuleCondition::Unless));
        assert_eq!(components[2].condition, None);
    }

    #[test]
    fn capabilities() {
        let check = PropertyCheck::Email(EmailMode::Net4xRegex);
        assert!(check.is_email());
        assert_eq!(check.regex_pattern(), Some(NET4X_EMAIL_PATTERN));
        assert_eq!(PropertyCheck::Email(EmailMode::default()).regex_pattern(), None);

        let check = PropertyCheck::Comparison {
            op: ComparisonOp::GreaterThan,
            value: ComparisonValue::Member("MinAge".into()),
        };
        assert_eq!(check.numeric_comparison(), None);

        let check = PropertyCheck::Between {
            from: 1.into(),
            to: 10.into(),
            exclusive: true,
        };
        assert_eq!(check.numeric_between(), Some((1.0, 10.0, true)));
    }

    #[test]
    fn deferred_adapter_resolves_after_set() {
        let owner = Validator::builder("A").build();
        let (adapter, slot) = ChildValidatorAdapter::deferred();
        assert!(matches!(adapter.resolve(&owner), Err(AdapterError::Uninitialized)));

        let target = Validator::builder("B").build();
        slot.set(target.clone()).unwrap();
        assert!(Arc::ptr_eq(&adapter.resolve(&owner).unwrap(), &target));
        assert!(slot.set(target.clone()).is_err());
    }

    #[test]
    fn deferred_cycle_is_freed() {
        let (to_a, a_slot) = ChildValidatorAdapter::deferred();
        let b = Validator::builder("B")
            .rule_for("A", |r| r.set_validator_adapter(to_a.clone()))
            .build();
        let a = Validator::builder("A")
            .rule_for("B", |r| r.set_validator(b))
            .build();
        a_slot.set(a.clone()).unwrap();
        let weak = Arc::downgrade(&a);

        drop(a);
        assert!(weak.upgrade().is_none());
        let other = Validator::builder("C").build();
        assert!(matches!(to_a.resolve(&other), Err(AdapterError::Dropped)));
    }

    #[test]
    fn self_reference_resolves_to_owner() {
        let owner = Validator::builder("Node").build();
        let adapter = ChildValidatorAdapter::self_reference();
        assert!(adapter.is_self_reference());
        assert!(Arc::ptr_eq(&adapter.resolve(&owner).unwrap(), &owner));
    }
}
