//! Error types for the scenemerge core library.
//!
//! Building, matching, diffing and merging never fail: malformed input
//! degrades to best-effort output. Errors exist only at the edges: loading
//! documents and configuration, and applying a resolution to a merge result.
//! Each concern has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type.

use thiserror::Error;

use crate::document::LocalId;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Document errors
// ---------------------------------------------------------------------------

/// Errors from (de)serializing or editing a [`Document`](crate::document::Document).
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The JSON form of a document could not be read or written.
    #[error("document JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A node refers to an object the document does not hold.
    #[error("object {0} not found")]
    ObjectNotFound(LocalId),

    /// A property path could not be written on an object.
    #[error("cannot set '{path}' on object {local_id}: {detail}")]
    InvalidPath {
        local_id: LocalId,
        path: String,
        detail: String,
    },
}

// ---------------------------------------------------------------------------
// Conflict errors
// ---------------------------------------------------------------------------

/// Errors from applying a resolution to a merge result.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The requested conflict ID was not found.
    #[error("conflict not found: {0}")]
    NotFound(String),

    /// Attempted to resolve a conflict that is already resolved differently.
    #[error("conflict {0} is already resolved")]
    AlreadyResolved(String),

    /// The resolution could not be applied to the merged document.
    #[error("invalid resolution for conflict {id}: {detail}")]
    InvalidResolution { id: String, detail: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ConflictError::NotFound("abc".into());
        assert_eq!(err.to_string(), "conflict not found: abc");

        let err = ConflictError::AlreadyResolved("abc".into());
        assert_eq!(err.to_string(), "conflict abc is already resolved");

        let err = ConfigError::InvalidValue {
            field: "resolver.score_margin".into(),
            detail: "must be >= 0".into(),
        };
        assert!(err.to_string().contains("resolver.score_margin"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let err: CoreError = ConflictError::NotFound("x".into()).into();
        assert!(matches!(err, CoreError::Conflict(_)));

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: CoreError = DocumentError::from(json_err).into();
        assert!(matches!(err, CoreError::Document(_)));
    }
}
