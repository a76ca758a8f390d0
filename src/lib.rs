//! Client-side form state tracking
//!
//! A [`FormTracker`] holds a form's values, per-field touched/dirty/error
//! state and submit flags. Fields are registered with validation rules or
//! validated by a schema resolver, arrays of sub-records keep stable row
//! identities, and watchers are told about every value change.

pub mod app;
pub mod config;
pub mod forms;
pub mod state;

pub use config::{RevalidateMode, TrackerConfig, ValidationMode};
pub use state::forms::*;
