//! Error types for dictionary loading and lookup
//!
//! Dictionary errors are configuration errors: they surface when a dictionary
//! is loaded or installed, never while validating a submitted document.

use std::path::PathBuf;

/// Dictionary errors
#[derive(Debug, thiserror::Error)]
pub enum DictionaryError {
    /// IO error reading a dictionary file
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Syntax error in dictionary source
    #[error("dictionary syntax error: {0}")]
    Syntax(String),

    /// File extension is not json/yaml/yml
    #[error("unsupported dictionary format: '{0}'")]
    UnsupportedFormat(String),

    /// Parent edge targets an undeclared entity
    #[error("entity '{entity}' edge '{edge}' targets unknown entity '{target}'")]
    UnknownEdgeTarget {
        entity: String,
        edge: String,
        target: String,
    },

    /// Boundary or root entity type is not declared
    #[error("dictionary does not declare entity '{0}'")]
    MissingEntity(String),

    /// Key field is not a declared field
    #[error("entity '{entity}' key field '{field}' is not declared")]
    UnknownKeyField { entity: String, field: String },

    /// Field pattern does not compile
    #[error("entity '{entity}' field '{field}' has invalid pattern: {message}")]
    InvalidPattern {
        entity: String,
        field: String,
        message: String,
    },

    /// Field declaration is incomplete (enum without values, array without items)
    #[error("entity '{entity}' field '{field}': {message}")]
    InvalidField {
        entity: String,
        field: String,
        message: String,
    },

    /// Authorization parent edges form a cycle
    #[error("authorization parent edges form a cycle through '{0}'")]
    CyclicParents(String),

    /// Requested version is not installed
    #[error("dictionary version not found: {0}")]
    VersionNotFound(String),

    /// Requested entity type is not declared
    #[error("entity type not found: {0}")]
    EntityNotFound(String),

    /// Embedded schema failed to compile
    #[error("schema error: {0}")]
    Schema(String),

    /// Template rendering failed
    #[error("template error: {0}")]
    Template(String),
}

impl DictionaryError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for dictionary operations
pub type DictionaryResult<T> = Result<T, DictionaryError>;
