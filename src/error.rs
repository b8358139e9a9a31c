//! Error types for rule application, manifests and document enrichment.

use std::path::PathBuf;
use thiserror::Error;

/// Failure inside a single rule's apply action.
///
/// The engine catches these per (property, rule) pair and logs them; they
/// never abort enrichment of sibling properties.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("schema has no property '{key}'")]
    PropertyNotFound { key: String },

    #[error("property '{key}' has no items schema")]
    ItemsNotFound { key: String },

    #[error("expected object schema at '{key}', got {actual}")]
    NotAnObject { key: String, actual: String },

    #[error("{message}")]
    Custom { message: String },
}

impl RuleError {
    /// Convenience constructor for user-defined rules.
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
        }
    }
}

/// Failure resolving the validator behind a child-validator adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("deferred child validator was never initialized")]
    Uninitialized,

    #[error("deferred child validator was dropped")]
    Dropped,
}

/// Errors while loading a validator manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid manifest JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("validator '{referenced_by}' references unknown validator '{name}'")]
    UnknownValidator { name: String, referenced_by: String },

    #[error("validator '{name}' is declared more than once")]
    DuplicateValidator { name: String },

    #[error("type '{type_name}' inherits from itself")]
    InheritanceCycle { type_name: String },

    #[error("invalid check in validator '{validator}': {message}")]
    InvalidCheck { validator: String, message: String },
}

impl ManifestError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ManifestError::FileNotFound { .. } | ManifestError::ReadError { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors while enriching an OpenAPI document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("document root must be an object, got {actual}")]
    NotAnObject { actual: String },

    #[error("document has neither components.schemas nor definitions")]
    MissingSchemas,
}

impl DocumentError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            DocumentError::FileNotFound { .. } | DocumentError::ReadError { .. } => 3,
            _ => 2,
        }
    }
}
