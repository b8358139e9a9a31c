//! Applies schema rules for validators to schemas.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::dialect::{SchemaDialect, SchemaShape};
use crate::history::{same_name, PropertyTarget, RuleHistoryItem};
use crate::registry::ValidatorRegistry;
use crate::rules::{RuleContext, RuleSet};
use crate::schema::{Schema, SchemaProvider, SchemaView};
use crate::types::{NameResolver, SchemaGenerationOptions, TypeHierarchy};
use crate::validation::{RuleComponent, ValidationRule, Validator};

/// Identity of a validator instance.
fn identity(validator: &Arc<Validator>) -> usize {
    Arc::as_ptr(validator) as *const () as usize
}

/// The rule-matching engine.
///
/// Built once from a rule set and options, then shared by every schema
/// generation run. All mutation goes to the schemas handed in.
pub struct SchemaBuilder {
    rules: RuleSet,
    options: SchemaGenerationOptions,
    types: Arc<TypeHierarchy>,
    name_resolver: Arc<dyn NameResolver>,
    shape: &'static dyn SchemaShape,
}

impl SchemaBuilder {
    /// The dialect defaults to OpenAPI 3.0 when the options leave it open.
    pub fn new(rules: RuleSet, options: SchemaGenerationOptions) -> Self {
        let shape = options.dialect.unwrap_or(SchemaDialect::OpenApi30).shape();
        let name_resolver = Arc::new(options.naming_policy);
        Self {
            rules,
            options,
            types: Arc::new(TypeHierarchy::default()),
            name_resolver,
            shape,
        }
    }

    pub fn with_types(mut self, types: Arc<TypeHierarchy>) -> Self {
        self.types = types;
        self
    }

    /// Replace the naming policy from the options with a custom resolver.
    pub fn with_name_resolver(mut self, resolver: impl NameResolver + 'static) -> Self {
        self.name_resolver = Arc::new(resolver);
        self
    }

    pub fn with_dialect(mut self, dialect: SchemaDialect) -> Self {
        self.options.dialect = Some(dialect);
        self.shape = dialect.shape();
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn options(&self) -> &SchemaGenerationOptions {
        &self.options
    }

    pub fn dialect(&self) -> SchemaDialect {
        self.shape.dialect()
    }

    /// Apply every validator the registry has for `schema_type`, including
    /// the validators they reach.
    pub fn apply_validators(
        &self,
        schemas: &mut dyn SchemaProvider,
        schema_type: &str,
        registry: &dyn ValidatorRegistry,
    ) {
        for validator in registry.validators(schema_type) {
            self.apply_rules_to_schema(schemas, schema_type, None, &validator);
            self.add_rules_from_included_validators(schemas, schema_type, &validator);
        }
    }

    /// Apply `validator`'s property rules to the schema of `schema_type`.
    ///
    /// `property_names` defaults to every property of the schema. Does
    /// nothing when the provider has no schema for the type.
    pub fn apply_rules_to_schema(
        &self,
        schemas: &mut dyn SchemaProvider,
        schema_type: &str,
        property_names: Option<&[String]>,
        validator: &Validator,
    ) {
        let Some(schema) = schemas.schema_for_type(schema_type) else {
            debug!(schema_type = %schema_type, "no schema for type");
            return;
        };
        self.apply_rules(schema, schema_type, property_names, validator);
    }

    /// Apply `validator`'s property rules to a schema the caller holds.
    pub fn apply_rules(
        &self,
        schema: &mut Schema,
        schema_type: &str,
        property_names: Option<&[String]>,
        validator: &Validator,
    ) {
        let keys = match property_names {
            Some(names) => names.to_vec(),
            None => schema.property_names(),
        };
        let (map, history) = schema.parts_mut();

        for key in &keys {
            for rule in self.rules_for_property(validator, key) {
                let target = if rule.for_each {
                    PropertyTarget::Items
                } else {
                    PropertyTarget::Property
                };

                for component in self.components(validator, rule) {
                    let check = &component.check;
                    for schema_rule in self.rules.iter().filter(|r| r.is_match(check)) {
                        if schema_rule.is_inert() {
                            continue;
                        }
                        let item = RuleHistoryItem::new(
                            schema_type,
                            key,
                            target,
                            check,
                            schema_rule.name(),
                        );
                        if history.contains(&item) {
                            trace!(
                                schema_type = %schema_type,
                                property = %key,
                                rule = %schema_rule.name(),
                                "rule already applied"
                            );
                            continue;
                        }

                        let view = SchemaView::new(&mut *map, self.shape);
                        let mut context =
                            RuleContext::new(schema_type, key, check, target, view, &self.options);
                        match schema_rule.run(&mut context) {
                            Ok(()) => {
                                debug!(
                                    schema_type = %schema_type,
                                    property = %key,
                                    rule = %schema_rule.name(),
                                    "rule applied"
                                );
                                history.add(item);
                            }
                            Err(error) => {
                                warn!(
                                    schema_type = %schema_type,
                                    property = %key,
                                    rule = %schema_rule.name(),
                                    %error,
                                    "failed to apply rule"
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    /// Follow child-validator adapters reachable from `validator`.
    ///
    /// A child validating the same type (or a base of it) contributes to
    /// the current schema; any other child contributes to its own type's
    /// schema. Validators already on the inclusion path are skipped, which
    /// covers the self-referencing tree pattern as well as longer cycles.
    pub fn add_rules_from_included_validators(
        &self,
        schemas: &mut dyn SchemaProvider,
        schema_type: &str,
        validator: &Arc<Validator>,
    ) {
        let mut path = vec![identity(validator)];
        self.walk_included(schemas, schema_type, validator, &mut path);
    }

    fn walk_included(
        &self,
        schemas: &mut dyn SchemaProvider,
        schema_type: &str,
        validator: &Arc<Validator>,
        path: &mut Vec<usize>,
    ) {
        for rule in validator.rules() {
            if !self.is_rule_included(validator, rule) {
                continue;
            }
            for component in self.components(validator, rule) {
                for adapter in component.check.child_adapters() {
                    let child = match adapter.resolve(validator) {
                        Ok(child) => child,
                        Err(error) => {
                            warn!(
                                validator = %validator.name(),
                                property = ?rule.property,
                                %error,
                                "cannot resolve child validator"
                            );
                            continue;
                        }
                    };

                    if Arc::ptr_eq(&child, validator) {
                        debug!(
                            validator = %validator.name(),
                            "skipping self-referencing validator"
                        );
                        continue;
                    }
                    let id = identity(&child);
                    if path.contains(&id) {
                        debug!(
                            validator = %validator.name(),
                            child = %child.name(),
                            "skipping validator already on the inclusion path"
                        );
                        continue;
                    }

                    let child_type =
                        if self.types.is_assignable(child.validated_type(), schema_type) {
                            schema_type
                        } else {
                            child.validated_type()
                        };

                    path.push(id);
                    self.apply_rules_to_schema(schemas, child_type, None, &child);
                    self.walk_included(schemas, child_type, &child, path);
                    path.pop();
                }
            }
        }
    }

    /// Property rules targeting `key`, with conditional rules filtered out.
    fn rules_for_property<'v>(
        &'v self,
        validator: &'v Validator,
        key: &'v str,
    ) -> impl Iterator<Item = &'v ValidationRule> + 'v {
        validator.rules().iter().filter(move |rule| {
            rule.property
                .as_deref()
                .is_some_and(|member| self.is_same_property(member, key))
                && self.is_rule_included(validator, rule)
        })
    }

    fn is_same_property(&self, member: &str, key: &str) -> bool {
        same_name(member, key) || same_name(&self.name_resolver.property_name(member), key)
    }

    fn is_rule_included(&self, validator: &Validator, rule: &ValidationRule) -> bool {
        if !rule.is_conditional()
            || validator.include_conditional_rules()
            || rule.include_conditional
        {
            return true;
        }
        trace!(
            validator = %validator.name(),
            property = ?rule.property,
            "skipping conditional rule"
        );
        false
    }

    /// Checks of `rule`, with conditional checks filtered out.
    fn components<'v>(
        &self,
        validator: &'v Validator,
        rule: &'v ValidationRule,
    ) -> impl Iterator<Item = &'v RuleComponent> + 'v {
        let opted_in = validator.include_conditional_rules() || rule.include_conditional;
        rule.components
            .iter()
            .filter(move |component| {
                component.condition.is_none() || opted_in || component.include_conditional
            })
    }
}

impl fmt::Debug for SchemaBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaBuilder")
            .field("rules", &self.rules.names())
            .field("options", &self.options)
            .field("dialect", &self.dialect())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuleError;
    use crate::rules::Rule;
    use crate::schema::SchemaRepository;
    use crate::validation::ChildValidatorAdapter;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn repository(schemas: Value) -> SchemaRepository {
        let mut repo = SchemaRepository::new();
        if let Value::Object(map) = schemas {
            for (name, schema) in map {
                repo.insert(name, Schema::from_value(schema).unwrap());
            }
        }
        repo
    }

    fn builder() -> SchemaBuilder {
        SchemaBuilder::new(RuleSet::defaults(), SchemaGenerationOptions::default())
    }

    #[test]
    fn failing_rule_does_not_stop_other_rules() {
        let rules = RuleSet::defaults().override_rules([Rule::new("Boom")
            .matches_check(|c| c.is_not_null())
            .with_apply(|_| Err(RuleError::custom("boom")))]);
        let builder = SchemaBuilder::new(rules, SchemaGenerationOptions::default());
        let mut repo = repository(json!({
            "Person": { "type": "object", "properties": { "name": { "type": "string" } } }
        }));
        let validator = Validator::builder("Person")
            .rule_for("Name", |r| r.not_null())
            .build();

        builder.apply_rules_to_schema(&mut repo, "Person", None, &validator);

        let schema = repo.get("Person").unwrap();
        assert_eq!(schema.as_map()["required"], json!(["name"]));
        // Required and NotNull recorded, Boom not
        assert_eq!(schema.history().len(), 2);
    }

    #[test]
    fn missing_schema_is_a_no_op() {
        let mut repo = SchemaRepository::new();
        let validator = Validator::builder("Ghost")
            .rule_for("Name", |r| r.not_null())
            .build();
        builder().apply_rules_to_schema(&mut repo, "Ghost", None, &validator);
        assert!(repo.is_empty());
    }

    #[test]
    fn explicit_property_names_limit_the_walk() {
        let mut repo = repository(json!({
            "Person": { "properties": { "name": { "type": "string" }, "nick": { "type": "string" } } }
        }));
        let validator = Validator::builder("Person")
            .rule_for("Name", |r| r.not_empty())
            .rule_for("Nick", |r| r.not_empty())
            .build();

        builder().apply_rules_to_schema(
            &mut repo,
            "Person",
            Some(&["nick".to_string()]),
            &validator,
        );

        let schema = repo.get("Person").unwrap().to_value();
        assert_eq!(schema["required"], json!(["nick"]));
        assert!(schema["properties"]["name"].get("minLength").is_none());
    }

    #[test]
    fn unresolved_child_is_skipped() {
        let (adapter, _slot) = ChildValidatorAdapter::deferred();
        let validator = Validator::builder("Person")
            .rule_for("Name", |r| r.not_empty())
            .rule_for("Address", |r| r.set_validator_adapter(adapter))
            .build();
        let mut repo = repository(json!({
            "Person": { "properties": { "name": { "type": "string" }, "address": {} } }
        }));

        builder().add_rules_from_included_validators(&mut repo, "Person", &validator);
        // only reached through the (unresolved) child, so nothing changes
        assert!(repo.get("Person").unwrap().history().is_empty());
    }
}
