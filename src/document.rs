//! OpenAPI document integration.
//!
//! Pulls the component schemas out of a document (`components/schemas` for
//! OpenAPI 3.x, `definitions` for Swagger 2.0), runs every registered
//! validator against them and writes the enriched schemas back in place.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::builder::SchemaBuilder;
use crate::dialect::SchemaDialect;
use crate::error::DocumentError;
use crate::registry::ValidatorRegistry;
use crate::schema::{Schema, SchemaRepository};
use crate::types::{json_type_name, SchemaGenerationOptions};

/// Load an OpenAPI document from a file path.
///
/// # Errors
///
/// Returns `DocumentError::FileNotFound` if the file doesn't exist,
/// or `DocumentError::InvalidJson` if the file isn't valid JSON.
pub fn load_document(path: &Path) -> Result<Value, DocumentError> {
    if !path.exists() {
        return Err(DocumentError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| DocumentError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_document_str(&content)
}

/// Load an OpenAPI document from a JSON string.
pub fn load_document_str(content: &str) -> Result<Value, DocumentError> {
    serde_json::from_str(content).map_err(|source| DocumentError::InvalidJson { source })
}

/// Dialect to enrich `document` with.
///
/// An explicit option wins, then the document's version field. Documents
/// without one are treated as Swagger 2.0 when they carry `definitions`
/// and as OpenAPI 3.0 otherwise.
pub fn document_dialect(document: &Value, options: &SchemaGenerationOptions) -> SchemaDialect {
    options
        .dialect
        .or_else(|| SchemaDialect::detect(document))
        .unwrap_or_else(|| {
            if document.get("definitions").is_some() {
                SchemaDialect::Swagger2
            } else {
                SchemaDialect::OpenApi30
            }
        })
}

/// Enrich every component schema that has validators.
///
/// Returns the names of the schema types validators were applied to, in
/// document order. Non-object schemas (boolean schemas) are left alone.
///
/// # Errors
///
/// Returns `DocumentError::MissingSchemas` when the document has no
/// schema container; nothing is modified in that case.
pub fn enrich_document(
    document: &mut Value,
    builder: &SchemaBuilder,
    registry: &dyn ValidatorRegistry,
) -> Result<Vec<String>, DocumentError> {
    let root = match document {
        Value::Object(map) => map,
        other => {
            return Err(DocumentError::NotAnObject {
                actual: json_type_name(other).to_string(),
            })
        }
    };
    let container = schema_container(root).ok_or(DocumentError::MissingSchemas)?;

    let names: Vec<String> = container.keys().cloned().collect();
    let mut repository = SchemaRepository::new();
    for name in &names {
        if let Some(value) = container.get_mut(name).filter(|v| v.is_object()) {
            if let Some(schema) = Schema::from_value(value.take()) {
                repository.insert(name.clone(), schema);
            }
        }
    }

    let mut enriched = Vec::new();
    for name in &names {
        if registry.validators(name).is_empty() {
            continue;
        }
        debug!(schema_type = %name, "enriching schema");
        builder.apply_validators(&mut repository, name, registry);
        enriched.push(name.clone());
    }

    // existing keys keep their position
    for (name, schema) in repository.into_schemas() {
        container.insert(name, schema.into_value());
    }

    info!(
        dialect = ?builder.dialect(),
        schemas = names.len(),
        enriched = enriched.len(),
        "document enriched"
    );
    Ok(enriched)
}

fn schema_container(root: &mut Map<String, Value>) -> Option<&mut Map<String, Value>> {
    let has_components = root
        .get("components")
        .and_then(|c| c.get("schemas"))
        .is_some_and(Value::is_object);
    if has_components {
        return root.get_mut("components")?.get_mut("schemas")?.as_object_mut();
    }
    root.get_mut("definitions")?.as_object_mut()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StaticValidatorRegistry;
    use crate::rules::RuleSet;
    use crate::validation::Validator;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> StaticValidatorRegistry {
        StaticValidatorRegistry::default().with(
            Validator::builder("Person")
                .rule_for("Name", |r| r.not_empty().maximum_length(50))
                .build(),
        )
    }

    fn builder_for(document: &Value) -> SchemaBuilder {
        let options = SchemaGenerationOptions::default();
        let dialect = document_dialect(document, &options);
        SchemaBuilder::new(RuleSet::defaults(), options).with_dialect(dialect)
    }

    #[test]
    fn enriches_components_in_place() {
        let mut document = json!({
            "openapi": "3.0.3",
            "components": { "schemas": {
                "Address": { "type": "object", "properties": { "city": { "type": "string" } } },
                "Person": { "type": "object", "properties": {
                    "name": { "type": "string", "nullable": true }
                } }
            } }
        });

        let builder = builder_for(&document);
        let enriched = enrich_document(&mut document, &builder, &registry()).unwrap();

        assert_eq!(enriched, ["Person"]);
        let schemas = &document["components"]["schemas"];
        let keys: Vec<&String> = schemas.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["Address", "Person"]);
        assert_eq!(
            schemas["Person"],
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "nullable": false, "minLength": 1, "maxLength": 50 }
                },
                "required": ["name"]
            })
        );
        assert_eq!(
            schemas["Address"],
            json!({ "type": "object", "properties": { "city": { "type": "string" } } })
        );
    }

    #[test]
    fn swagger_definitions() {
        let mut document = json!({
            "swagger": "2.0",
            "definitions": {
                "Person": { "type": "object", "properties": { "name": { "type": "string" } } }
            }
        });

        let builder = builder_for(&document);
        assert_eq!(builder.dialect(), SchemaDialect::Swagger2);
        enrich_document(&mut document, &builder, &registry()).unwrap();
        assert_eq!(document["definitions"]["Person"]["required"], json!(["name"]));
    }

    #[test]
    fn boolean_schemas_are_kept() {
        let mut document = json!({
            "openapi": "3.1.0",
            "components": { "schemas": { "Anything": true } }
        });
        let builder = builder_for(&document);
        enrich_document(&mut document, &builder, &registry()).unwrap();
        assert_eq!(document["components"]["schemas"]["Anything"], json!(true));
    }

    #[test]
    fn document_without_schemas() {
        let mut document = json!({ "openapi": "3.0.0", "paths": {} });
        let builder = builder_for(&document);
        let err = enrich_document(&mut document, &builder, &registry()).unwrap_err();
        assert!(matches!(err, DocumentError::MissingSchemas));

        let mut document = json!([1, 2]);
        let err = enrich_document(&mut document, &builder, &registry()).unwrap_err();
        assert!(matches!(err, DocumentError::NotAnObject { .. }));
    }

    #[test]
    fn dialect_selection() {
        let options = SchemaGenerationOptions::default();
        assert_eq!(
            document_dialect(&json!({ "openapi": "3.1.0" }), &options),
            SchemaDialect::OpenApi31
        );
        assert_eq!(
            document_dialect(&json!({ "definitions": {} }), &options),
            SchemaDialect::Swagger2
        );
        assert_eq!(document_dialect(&json!({}), &options), SchemaDialect::OpenApi30);

        let forced = options.dialect(SchemaDialect::OpenApi31);
        assert_eq!(
            document_dialect(&json!({ "openapi": "3.0.0" }), &forced),
            SchemaDialect::OpenApi31
        );
    }
}
