//! Attribute and identifier error model.

use thiserror::Error;

use crate::attributes::AttrType;

/// Result type used by the attribute schema.
pub type AttributeResult<T> = Result<T, AttributeError>;

/// Failure while building or mutating a command's attribute mapping.
///
/// These are construction-time failures: they surface before any preflight
/// check runs, so they never become broadcast outcomes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttributeError {
    /// The positional source was present but was not a key/value mapping.
    #[error("first argument must be a mapping if provided (got {found})")]
    NotAMapping { found: &'static str },

    /// A setter targeted a field the command type never declared.
    #[error("unknown attribute '{0}'")]
    Unknown(String),

    /// A supplied value could not be coerced to the declared type.
    #[error("attribute '{field}' expects {expected}, got {found}")]
    Coercion {
        field: String,
        expected: AttrType,
        found: String,
    },

    /// A default factory produced a value of the wrong shape.
    #[error("default for '{field}' produced {found}, expected {expected}")]
    InvalidDefault {
        field: String,
        expected: AttrType,
        found: String,
    },
}

impl AttributeError {
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::Unknown(name.into())
    }
}

/// An identifier failed to parse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid identifier: {0}")]
pub struct InvalidId(pub String);

/// Human-readable name of a JSON value's shape, used in error messages.
pub(crate) fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "mapping",
    }
}
