//! Per-field state records

use super::error::FieldError;
use super::path::FieldPath;
use super::validation::FieldRules;
use super::value::FormValue;
use serde::Serialize;

/// Edit and validation state of one registered field
///
/// The value itself lives in the form's value tree; [`FieldSnapshot`]
/// joins the two for rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldState {
    pub error: Option<FieldError>,
    pub touched: bool,
    pub dirty: bool,
    /// An async validation for the current value is in flight
    pub validating: bool,
    pub disabled: bool,
}

impl FieldState {
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Read-only view of a field: its value plus its state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSnapshot {
    pub path: FieldPath,
    pub value: FormValue,
    #[serde(flatten)]
    pub state: FieldState,
}

/// Registry entry: rules, state and the latest validation token
#[derive(Debug, Clone)]
pub(crate) struct FieldEntry {
    pub rules: FieldRules,
    pub state: FieldState,
    pub token: u64,
}

impl FieldEntry {
    pub fn new(rules: FieldRules) -> Self {
        Self {
            rules,
            state: FieldState::default(),
            token: 0,
        }
    }
}

/// Binding handle returned by `register`
///
/// Carries only the path; the tracker is passed to each hook so that the
/// handle can live in a rendering layer without borrowing the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBinding {
    path: FieldPath,
}

impl FieldBinding {
    pub(crate) fn new(path: FieldPath) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    pub fn name(&self) -> String {
        self.path.to_string()
    }
}
