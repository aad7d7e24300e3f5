//! Error types for the declarative crate

use std::path::PathBuf;
use thiserror::Error;

use crate::document::Kind;

/// Errors that can occur while loading, merging or classifying documents
#[derive(Error, Debug)]
pub enum Error {
    /// A document was passed in a merge role its kind does not allow
    #[error("{role} must be of kind {expected}, found {found}")]
    KindMismatch {
        /// Merge role of the offending document (spec, profile, overlay)
        role: &'static str,
        /// Kind(s) accepted in that role
        expected: String,
        /// Kind actually supplied
        found: Kind,
    },

    /// A required identity field is missing or empty
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The `kind` field names nothing we know
    #[error("unknown kind: {0}")]
    UnknownKind(String),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to read a document or override file
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for declarative operations
pub type Result<T> = std::result::Result<T, Error>;
