//! Schema Rules
//!
//! Projects declarative validation rules onto OpenAPI / JSON Schema
//! documents.
//!
//! Validators describe constraints on object properties (not-null, length,
//! patterns, numeric ranges, email). A schema generator only sees types. This
//! library bridges the two: for each schema it finds the validators of the
//! schema's type, matches their checks against an ordered set of schema
//! rules and applies each match as a schema transformation (`required`,
//! `minLength`, `pattern`, `minimum`, ...).
//!
//! # Example
//!
//! ```
//! use schema_rules::{
//!     RuleSet, Schema, SchemaBuilder, SchemaGenerationOptions, SchemaRepository,
//!     StaticValidatorRegistry, Validator,
//! };
//! use serde_json::json;
//!
//! let person = Validator::builder("Person")
//!     .rule_for("Name", |r| r.not_empty().maximum_length(50))
//!     .rule_for("Age", |r| r.inclusive_between(18, 150))
//!     .build();
//! let registry = StaticValidatorRegistry::default().with(person);
//!
//! let mut schemas = SchemaRepository::new();
//! schemas.insert(
//!     "Person",
//!     Schema::from_value(json!({
//!         "type": "object",
//!         "properties": {
//!             "name": { "type": "string" },
//!             "age": { "type": "integer" }
//!         }
//!     }))
//!     .unwrap(),
//! );
//!
//! let builder = SchemaBuilder::new(RuleSet::defaults(), SchemaGenerationOptions::default());
//! builder.apply_validators(&mut schemas, "Person", &registry);
//!
//! let person = schemas.get("Person").unwrap().to_value();
//! assert_eq!(person["required"], json!(["name"]));
//! assert_eq!(person["properties"]["name"]["minLength"], json!(1));
//! assert_eq!(person["properties"]["name"]["maxLength"], json!(50));
//! assert_eq!(person["properties"]["age"]["minimum"], json!(18));
//! assert_eq!(person["properties"]["age"]["maximum"], json!(150));
//! ```
//!
//! # Default Rules
//!
//! Rules are evaluated in this order; several may match one check.
//!
//! | Rule | Effect |
//! |------|--------|
//! | `Required` | Adds the property to `required` |
//! | `NotNull` | Clears nullability |
//! | `NotEmpty` | `minLength: 1` (`minItems` on arrays) |
//! | `Length` | Tightens `minLength` / `maxLength` |
//! | `Pattern` | `pattern`, or `allOf` for several patterns |
//! | `Comparison` | Tightens `minimum` / `maximum` |
//! | `Between` | Tightens both bounds |
//! | `Email` | `format: email` |
//!
//! Rules can be replaced by name with [`RuleSet::override_rules`].
//!
//! # Idempotence
//!
//! Every schema remembers which rules were applied to which property for
//! which check, so a validator reached through several inclusion paths
//! changes a schema only once.

mod builder;
mod dialect;
mod document;
mod error;
mod history;
mod manifest;
mod registry;
mod rules;
mod schema;
mod types;
mod validation;

pub use builder::SchemaBuilder;
pub use dialect::{Bound, OpenApi30, OpenApi31, SchemaDialect, SchemaShape, Swagger2};
pub use document::{document_dialect, enrich_document, load_document, load_document_str};
pub use error::{AdapterError, DocumentError, ManifestError, RuleError};
pub use history::{CheckFingerprint, OperandKey, PropertyTarget, RuleHistory, RuleHistoryItem};
pub use manifest::{load_manifest, load_manifest_str, Manifest};
pub use registry::{StaticValidatorRegistry, ValidatorRegistry};
pub use rules::{
    Rule, RuleContext, RuleSet, BETWEEN, COMPARISON, EMAIL, LENGTH, NOT_EMPTY, NOT_NULL, PATTERN,
    REQUIRED,
};
pub use schema::{tighten_max, tighten_min, Schema, SchemaProvider, SchemaRepository, SchemaView};
pub use types::{
    json_type_name, NameResolver, NamingPolicy, SchemaGenerationOptions, TypeHierarchy,
    ValidatorSearch, ValidatorSearchMode,
};
pub use validation::{
    ChildValidatorAdapter, ComparisonOp, ComparisonValue, DeferredValidator, EmailMode,
    LengthCheck, LengthKind, PropertyCheck, RuleComponent, RuleCondition, ValidationRule,
    ValidationRuleBuilder, Validator, ValidatorBuilder, NET4X_EMAIL_PATTERN,
};
