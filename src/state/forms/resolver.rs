//! Whole-form schema resolvers
//!
//! A resolver replaces per-field rules: it sees every value at once and
//! reports errors keyed by path.

use super::error::FieldError;
use super::path::FieldPath;
use super::value::FormValue;
use regex::Regex;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

/// Errors reported by a resolver; valid iff empty
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    pub errors: BTreeMap<FieldPath, FieldError>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Capability interface for schema validation engines
pub trait Resolver: Send + Sync {
    fn resolve(&self, values: &FormValue) -> ValidationResult;
}

impl<F> Resolver for F
where
    F: Fn(&FormValue) -> ValidationResult + Send + Sync,
{
    fn resolve(&self, values: &FormValue) -> ValidationResult {
        self(values)
    }
}

/// Run `resolver` over `values`; `None` when it panicked
pub(crate) fn resolve_guarded(resolver: &dyn Resolver, values: &FormValue) -> Option<ValidationResult> {
    match catch_unwind(AssertUnwindSafe(|| resolver.resolve(values))) {
        Ok(result) => Some(result),
        Err(_) => {
            tracing::warn!("Schema resolver panicked");
            None
        }
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid")
    })
}

/// One check in a string schema
#[derive(Debug, Clone)]
pub enum Check {
    NonEmpty(String),
    Email(String),
    Matches(Regex, String),
    MinLength(usize, String),
    MaxLength(usize, String),
}

impl Check {
    fn failure(&self, text: &str) -> Option<&str> {
        let ok = match self {
            Check::NonEmpty(_) => !text.is_empty(),
            Check::Email(_) => email_regex().is_match(text),
            Check::Matches(regex, _) => regex.is_match(text),
            Check::MinLength(min, _) => text.chars().count() >= *min,
            Check::MaxLength(max, _) => text.chars().count() <= *max,
        };
        if ok {
            None
        } else {
            Some(match self {
                Check::NonEmpty(m)
                | Check::Email(m)
                | Check::Matches(_, m)
                | Check::MinLength(_, m)
                | Check::MaxLength(_, m) => m,
            })
        }
    }
}

/// Ordered checks for one string field
#[derive(Debug, Clone, Default)]
pub struct StringSchema {
    checks: Vec<Check>,
}

impl StringSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn non_empty(mut self, message: &str) -> Self {
        self.checks.push(Check::NonEmpty(message.to_string()));
        self
    }

    pub fn email(mut self, message: &str) -> Self {
        self.checks.push(Check::Email(message.to_string()));
        self
    }

    pub fn matches(mut self, regex: Regex, message: &str) -> Self {
        self.checks.push(Check::Matches(regex, message.to_string()));
        self
    }

    pub fn min_length(mut self, min: usize, message: &str) -> Self {
        self.checks.push(Check::MinLength(min, message.to_string()));
        self
    }

    pub fn max_length(mut self, max: usize, message: &str) -> Self {
        self.checks.push(Check::MaxLength(max, message.to_string()));
        self
    }

    /// First failing check's message; missing and non-text values are treated as ""
    fn first_failure(&self, value: Option<&FormValue>) -> Option<String> {
        let text = value.and_then(FormValue::pattern_text).unwrap_or_default();
        self.checks
            .iter()
            .find_map(|check| check.failure(&text).map(str::to_string))
    }
}

/// Object schema mapping field paths to string schemas
#[derive(Debug, Clone, Default)]
pub struct SchemaResolver {
    fields: Vec<(FieldPath, StringSchema)>,
}

impl SchemaResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, path: FieldPath, schema: StringSchema) -> Self {
        self.fields.push((path, schema));
        self
    }
}

impl Resolver for SchemaResolver {
    fn resolve(&self, values: &FormValue) -> ValidationResult {
        let errors = self
            .fields
            .iter()
            .filter_map(|(path, schema)| {
                schema
                    .first_failure(values.get(path))
                    .map(|message| (path.clone(), FieldError::Schema { message }))
            })
            .collect();
        ValidationResult { errors }
    }
}
