//! Field validation errors and tracker API errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A field-scoped, non-fatal validation failure
///
/// These populate a field's error slot and block a successful submit; they
/// never abort the form session.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldError {
    #[error("{message}")]
    Required { message: String },
    #[error("{message}")]
    PatternMismatch { message: String },
    #[error("{message}")]
    Custom { validator: String, message: String },
    #[error("{message}")]
    AsyncValidation { validator: String, message: String },
    /// Produced by a schema resolver rather than per-field rules
    #[error("{message}")]
    Schema { message: String },
}

impl FieldError {
    pub fn message(&self) -> &str {
        match self {
            FieldError::Required { message }
            | FieldError::PatternMismatch { message }
            | FieldError::Custom { message, .. }
            | FieldError::AsyncValidation { message, .. }
            | FieldError::Schema { message } => message,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FieldError::Required { .. } => "required",
            FieldError::PatternMismatch { .. } => "pattern_mismatch",
            FieldError::Custom { .. } => "custom",
            FieldError::AsyncValidation { .. } => "async_validation",
            FieldError::Schema { .. } => "schema",
        }
    }
}

/// Misuse of the tracker API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("invalid field path `{0}`")]
    InvalidPath(String),
    #[error("field `{0}` is not registered")]
    UnknownField(String),
    #[error("field `{0}` does not hold an array")]
    NotAnArray(String),
    #[error("index {index} is out of range for `{path}` (length {len})")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },
    #[error("form is still loading its default values")]
    Loading,
    #[error("form has been unmounted")]
    Unmounted,
}
