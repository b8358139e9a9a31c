//! Schema rules: named transformations from validation checks to schema
//! keywords.
//!
//! | Rule | Matches | Effect |
//! |------|---------|--------|
//! | `Required` | not-null, not-empty | adds the property to `required`, clears nullability |
//! | `NotNull` | not-null | clears nullability |
//! | `NotEmpty` | not-empty | `minLength`/`minItems` at least 1 |
//! | `Length` | length checks | tightens `maxLength`/`minLength` (or `*Items` on arrays) |
//! | `Pattern` | regex checks | `pattern`, or `allOf` entries for multiple patterns |
//! | `Comparison` | numeric `>`, `>=`, `<`, `<=` | tightens `minimum`/`maximum` |
//! | `Between` | numeric inclusive/exclusive between | tightens both bounds |
//! | `Email` | email checks | `format: email` |
//!
//! Rules run in registration order when several match one check.

use std::fmt;
use std::sync::Arc;

use serde_json::json;

use crate::dialect::Bound;
use crate::error::RuleError;
use crate::history::PropertyTarget;
use crate::schema::SchemaView;
use crate::types::SchemaGenerationOptions;
use crate::validation::PropertyCheck;

pub const REQUIRED: &str = "Required";
pub const NOT_NULL: &str = "NotNull";
pub const NOT_EMPTY: &str = "NotEmpty";
pub const LENGTH: &str = "Length";
pub const PATTERN: &str = "Pattern";
pub const COMPARISON: &str = "Comparison";
pub const BETWEEN: &str = "Between";
pub const EMAIL: &str = "Email";

type Condition = Arc<dyn Fn(&PropertyCheck) -> bool + Send + Sync>;
type ApplyFn = Arc<dyn Fn(&mut RuleContext<'_>) -> Result<(), RuleError> + Send + Sync>;

/// A named matcher plus the schema update it performs.
///
/// A check matches when every condition holds; a rule without conditions
/// matches every check. A rule without an apply action never mutates.
#[derive(Clone)]
pub struct Rule {
    name: String,
    conditions: Vec<Condition>,
    apply: Option<ApplyFn>,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conditions: Vec::new(),
            apply: None,
        }
    }

    /// Add a condition the check must satisfy.
    pub fn matches_check(
        mut self,
        condition: impl Fn(&PropertyCheck) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.conditions.push(Arc::new(condition));
        self
    }

    pub fn with_apply(
        mut self,
        apply: impl Fn(&mut RuleContext<'_>) -> Result<(), RuleError> + Send + Sync + 'static,
    ) -> Self {
        self.apply = Some(Arc::new(apply));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_match(&self, check: &PropertyCheck) -> bool {
        self.conditions.iter().all(|condition| condition(check))
    }

    pub fn is_inert(&self) -> bool {
        self.apply.is_none()
    }

    pub(crate) fn run(&self, context: &mut RuleContext<'_>) -> Result<(), RuleError> {
        match &self.apply {
            Some(apply) => apply(context),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("conditions", &self.conditions.len())
            .field("inert", &self.is_inert())
            .finish()
    }
}

/// Everything one rule application can see and change.
#[derive(Debug)]
pub struct RuleContext<'a> {
    schema_type: &'a str,
    property_key: &'a str,
    check: &'a PropertyCheck,
    target: PropertyTarget,
    schema: SchemaView<'a>,
    options: &'a SchemaGenerationOptions,
}

impl<'a> RuleContext<'a> {
    pub fn new(
        schema_type: &'a str,
        property_key: &'a str,
        check: &'a PropertyCheck,
        target: PropertyTarget,
        schema: SchemaView<'a>,
        options: &'a SchemaGenerationOptions,
    ) -> Self {
        Self {
            schema_type,
            property_key,
            check,
            target,
            schema,
            options,
        }
    }

    pub fn schema_type(&self) -> &'a str {
        self.schema_type
    }

    /// Key of the property in the owning schema's `properties`.
    pub fn property_key(&self) -> &'a str {
        self.property_key
    }

    pub fn check(&self) -> &'a PropertyCheck {
        self.check
    }

    /// True for per-element rules, whose property view is the items schema.
    pub fn is_collection_rule(&self) -> bool {
        self.target == PropertyTarget::Items
    }

    pub fn options(&self) -> &'a SchemaGenerationOptions {
        self.options
    }

    /// The schema of the owning type.
    pub fn schema(&mut self) -> &mut SchemaView<'a> {
        &mut self.schema
    }

    /// The schema the rule should constrain: the property itself, or its
    /// items schema for per-element rules.
    pub fn property(&mut self) -> Result<SchemaView<'_>, RuleError> {
        let key = self.property_key;
        let property = self.schema.reborrow().into_property(key)?;
        match self.target {
            PropertyTarget::Property => Ok(property),
            PropertyTarget::Items => property.into_items(key),
        }
    }
}

/// Ordered rule list.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::defaults()
    }
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The built-in rules, in evaluation order.
    pub fn defaults() -> Self {
        Self::new(vec![
            required_rule(),
            not_null_rule(),
            not_empty_rule(),
            length_rule(),
            pattern_rule(),
            comparison_rule(),
            between_rule(),
            email_rule(),
        ])
    }

    /// Replace rules by name; unknown names are appended.
    ///
    /// Replacements keep the position of the rule they replace.
    pub fn override_rules(mut self, overrides: impl IntoIterator<Item = Rule>) -> Self {
        for rule in overrides {
            match self.rules.iter_mut().find(|r| r.name == rule.name) {
                Some(existing) => *existing = rule,
                None => self.rules.push(rule),
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(Rule::name).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn required_rule() -> Rule {
    Rule::new(REQUIRED)
        .matches_check(|check| check.is_not_null() || check.is_not_empty())
        .with_apply(|ctx| {
            ctx.property()?.set_not_nullable();
            // elements have no name to require
            if !ctx.is_collection_rule() {
                let key = ctx.property_key();
                ctx.schema().add_required(key);
            }
            Ok(())
        })
}

fn not_null_rule() -> Rule {
    Rule::new(NOT_NULL)
        .matches_check(PropertyCheck::is_not_null)
        .with_apply(|ctx| {
            ctx.property()?.set_not_nullable();
            Ok(())
        })
}

fn not_empty_rule() -> Rule {
    Rule::new(NOT_EMPTY)
        .matches_check(PropertyCheck::is_not_empty)
        .with_apply(|ctx| {
            let not_nullable = ctx.options().set_not_nullable_if_min_length_greater_than_zero;
            let mut property = ctx.property()?;
            if property.is_array() {
                property.tighten_min_items(1);
            } else if property.has_type("string") || property.is_untyped() {
                property.tighten_min_length(1);
            }
            if not_nullable {
                property.set_not_nullable();
            }
            Ok(())
        })
}

fn length_rule() -> Rule {
    Rule::new(LENGTH)
        .matches_check(|check| check.length().is_some())
        .with_apply(|ctx| {
            let Some(length) = ctx.check().length().copied() else {
                return Ok(());
            };
            let not_nullable = ctx.options().set_not_nullable_if_min_length_greater_than_zero;
            let mut property = ctx.property()?;

            if property.is_array() {
                if let Some(max) = length.max {
                    property.tighten_max_items(max);
                }
                if length.min > 0 && (length.is_lower_bound() || property.min_items().is_none()) {
                    property.tighten_min_items(length.min);
                }
                return Ok(());
            }

            if let Some(max) = length.max {
                property.tighten_max_length(max);
            }
            if length.min > 0 && (length.is_lower_bound() || property.min_length().is_none()) {
                property.tighten_min_length(length.min);
            }
            if length.min > 0 && not_nullable {
                property.set_not_nullable();
            }
            Ok(())
        })
}

fn pattern_rule() -> Rule {
    Rule::new(PATTERN)
        .matches_check(|check| check.regex_pattern().is_some())
        .with_apply(|ctx| {
            let Some(pattern) = ctx.check().regex_pattern() else {
                return Ok(());
            };
            let use_all_of = ctx.options().use_all_of_for_multiple_rules;
            let mut property = ctx.property()?;

            let has_patterns =
                property.pattern().is_some() || !property.all_of_patterns().is_empty();
            if !use_all_of || !has_patterns {
                property.set_pattern(pattern);
                return Ok(());
            }
            if property.pattern() == Some(pattern) || property.all_of_patterns().contains(&pattern)
            {
                return Ok(());
            }

            // move the first pattern into allOf so every pattern is enforced
            if let Some(first) = property.take_pattern() {
                if !property.all_of_patterns().contains(&first.as_str()) {
                    property.all_of_mut().push(json!({ "pattern": first }));
                }
            }
            property.all_of_mut().push(json!({ "pattern": pattern }));
            Ok(())
        })
}

fn comparison_rule() -> Rule {
    Rule::new(COMPARISON)
        .matches_check(|check| check.numeric_comparison().is_some())
        .with_apply(|ctx| {
            let Some((op, value)) = ctx.check().numeric_comparison() else {
                return Ok(());
            };
            let bound = Bound {
                value,
                exclusive: op.is_exclusive(),
            };
            let mut property = ctx.property()?;
            if op.is_lower_bound() {
                property.tighten_minimum(bound);
            } else {
                property.tighten_maximum(bound);
            }
            Ok(())
        })
}

fn between_rule() -> Rule {
    Rule::new(BETWEEN)
        .matches_check(|check| check.numeric_between().is_some())
        .with_apply(|ctx| {
            let Some((from, to, exclusive)) = ctx.check().numeric_between() else {
                return Ok(());
            };
            let mut property = ctx.property()?;
            property.tighten_minimum(Bound {
                value: from,
                exclusive,
            });
            property.tighten_maximum(Bound {
                value: to,
                exclusive,
            });
            Ok(())
        })
}

fn email_rule() -> Rule {
    Rule::new(EMAIL)
        .matches_check(PropertyCheck::is_email)
        .with_apply(|ctx| {
            ctx.property()?.set_format("email");
            Ok(())
        })
}
