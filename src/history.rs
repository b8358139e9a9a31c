//! Rule-application history.
//!
//! A validator can be reached through several inclusion paths. The history
//! remembers which (type, property, check, rule) combinations were already
//! applied to a schema so that repeated paths have no further effect.
//! Checks are compared by value: two `Length(1, 10)` checks from different
//! validator instances are the same logical check.

use std::collections::HashSet;

use crate::validation::{ComparisonOp, ComparisonValue, LengthCheck, PropertyCheck};

/// Case fold shared by property matching and history keys.
pub(crate) fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

/// True when `a` and `b` name the same member, ignoring case.
pub(crate) fn same_name(a: &str, b: &str) -> bool {
    a == b || fold_name(a) == fold_name(b)
}

/// Hashable comparison operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperandKey {
    Number(u64),
    Member(String),
    Other(String),
}

impl From<&ComparisonValue> for OperandKey {
    fn from(value: &ComparisonValue) -> Self {
        match value {
            // -0.0 and 0.0 are the same bound
            ComparisonValue::Number(n) if *n == 0.0 => OperandKey::Number(0),
            ComparisonValue::Number(n) => OperandKey::Number(n.to_bits()),
            ComparisonValue::Member(m) => OperandKey::Member(m.clone()),
            ComparisonValue::Other(o) => OperandKey::Other(o.clone()),
        }
    }
}

/// Value identity of a [`PropertyCheck`].
///
/// Stateless checks (not-null, not-empty, email, nested validators) are
/// equivalent to every other check of the same kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CheckFingerprint {
    NotNull,
    NotEmpty,
    Length(LengthCheck),
    Pattern(String),
    Comparison {
        op: ComparisonOp,
        operand: OperandKey,
    },
    Between {
        from: OperandKey,
        to: OperandKey,
        exclusive: bool,
    },
    Email,
    Custom(String),
    Nested,
}

impl From<&PropertyCheck> for CheckFingerprint {
    fn from(check: &PropertyCheck) -> Self {
        match check {
            PropertyCheck::NotNull => CheckFingerprint::NotNull,
            PropertyCheck::NotEmpty => CheckFingerprint::NotEmpty,
            PropertyCheck::Length(length) => CheckFingerprint::Length(*length),
            PropertyCheck::Pattern { expression } => CheckFingerprint::Pattern(expression.clone()),
            PropertyCheck::Comparison { op, value } => CheckFingerprint::Comparison {
                op: *op,
                operand: value.into(),
            },
            PropertyCheck::Between {
                from,
                to,
                exclusive,
            } => CheckFingerprint::Between {
                from: from.into(),
                to: to.into(),
                exclusive: *exclusive,
            },
            PropertyCheck::Email(_) => CheckFingerprint::Email,
            PropertyCheck::Custom { name } => CheckFingerprint::Custom(name.clone()),
            PropertyCheck::ChildValidator(_) | PropertyCheck::Polymorphic(_) => {
                CheckFingerprint::Nested
            }
        }
    }
}

/// Which slot of a property a rule wrote to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyTarget {
    /// The property schema itself.
    Property,
    /// The element schema of a collection property.
    Items,
}

/// Key of one rule application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleHistoryItem {
    schema_type: String,
    property: String,
    target: PropertyTarget,
    check: CheckFingerprint,
    rule: String,
}

impl RuleHistoryItem {
    /// Type and property names are compared case-insensitively.
    pub fn new(
        schema_type: &str,
        property: &str,
        target: PropertyTarget,
        check: &PropertyCheck,
        rule: &str,
    ) -> Self {
        Self {
            schema_type: fold_name(schema_type),
            property: fold_name(property),
            target,
            check: check.into(),
            rule: rule.to_string(),
        }
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }
}

/// History attached to one schema.
#[derive(Debug, Clone, Default)]
pub struct RuleHistory {
    items: HashSet<RuleHistoryItem>,
}

impl RuleHistory {
    /// Record an application. Returns false if it was already recorded.
    pub fn add(&mut self, item: RuleHistoryItem) -> bool {
        self.items.insert(item)
    }

    pub fn contains(&self, item: &RuleHistoryItem) -> bool {
        self.items.contains(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
