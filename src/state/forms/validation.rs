//! Validation rules and their evaluation
//!
//! Rules run in a fixed order: required, pattern, sync custom validators,
//! then async validators. The first failure wins. Async validators are not
//! awaited here; the sync pass hands them back as a [`PendingValidation`]
//! that the caller awaits and then feeds into the tracker.

use super::error::FieldError;
use super::path::FieldPath;
use super::value::{FormValue, ValueAs};
use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use regex::Regex;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Verdict of a custom validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid(String),
}

impl Validity {
    /// `true` passes, `false` fails with `message`
    pub fn check(ok: bool, message: &str) -> Self {
        if ok {
            Validity::Valid
        } else {
            Validity::Invalid(message.to_string())
        }
    }
}

/// Synchronous custom validator
pub type SyncValidatorFn = Arc<dyn Fn(&FormValue) -> Result<Validity> + Send + Sync>;

/// Asynchronous custom validator, e.g. an availability lookup over the network
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AsyncValidator: Send + Sync {
    async fn validate(&self, value: &FormValue) -> Result<Validity>;
}

/// Adapter turning an async closure into an [`AsyncValidator`]
pub struct AsyncFnValidator<F> {
    f: F,
}

impl<F, Fut> AsyncFnValidator<F>
where
    F: Fn(FormValue) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Validity>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> AsyncValidator for AsyncFnValidator<F>
where
    F: Fn(FormValue) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Validity>> + Send,
{
    async fn validate(&self, value: &FormValue) -> Result<Validity> {
        (self.f)(value.clone()).await
    }
}

/// Predicate over the whole value tree deciding whether a field is disabled
pub type DisabledWhenFn = Arc<dyn Fn(&FormValue) -> bool + Send + Sync>;

/// A single validation rule
#[derive(Clone)]
pub enum Rule {
    Required {
        message: String,
    },
    Pattern {
        regex: Regex,
        message: String,
    },
    Custom {
        name: String,
        validate: SyncValidatorFn,
    },
    AsyncCustom {
        name: String,
        validate: Arc<dyn AsyncValidator>,
    },
}

impl Rule {
    fn phase(&self) -> u8 {
        match self {
            Rule::Required { .. } => 0,
            Rule::Pattern { .. } => 1,
            Rule::Custom { .. } => 2,
            Rule::AsyncCustom { .. } => 3,
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Required { message } => f.debug_struct("Required").field("message", message).finish(),
            Rule::Pattern { regex, message } => f
                .debug_struct("Pattern")
                .field("regex", &regex.as_str())
                .field("message", message)
                .finish(),
            Rule::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
            Rule::AsyncCustom { name, .. } => {
                f.debug_struct("AsyncCustom").field("name", name).finish()
            }
        }
    }
}

/// Rules and options attached to a field at registration
#[derive(Clone, Default)]
pub struct FieldRules {
    rules: Vec<Rule>,
    pub(crate) value_as: ValueAs,
    pub(crate) disabled_when: Option<DisabledWhenFn>,
}

impl FieldRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, message: &str) -> Self {
        self.push(Rule::Required {
            message: message.to_string(),
        });
        self
    }

    pub fn pattern(mut self, regex: Regex, message: &str) -> Self {
        self.push(Rule::Pattern {
            regex,
            message: message.to_string(),
        });
        self
    }

    pub fn validate<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&FormValue) -> Result<Validity> + Send + Sync + 'static,
    {
        self.push(Rule::Custom {
            name: name.to_string(),
            validate: Arc::new(f),
        });
        self
    }

    pub fn validate_async(mut self, name: &str, validator: Arc<dyn AsyncValidator>) -> Self {
        self.push(Rule::AsyncCustom {
            name: name.to_string(),
            validate: validator,
        });
        self
    }

    pub fn value_as_number(mut self) -> Self {
        self.value_as = ValueAs::Number;
        self
    }

    pub fn value_as_date(mut self) -> Self {
        self.value_as = ValueAs::Date;
        self
    }

    pub fn disabled_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&FormValue) -> bool + Send + Sync + 'static,
    {
        self.disabled_when = Some(Arc::new(predicate));
        self
    }

    /// Keeps rules sorted by evaluation phase; insertion order holds within a phase
    fn push(&mut self, rule: Rule) {
        let phase = rule.phase();
        let at = self
            .rules
            .iter()
            .position(|r| r.phase() > phase)
            .unwrap_or(self.rules.len());
        self.rules.insert(at, rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn has_async(&self) -> bool {
        self.rules
            .iter()
            .any(|r| matches!(r, Rule::AsyncCustom { .. }))
    }

    pub fn is_disabled(&self, values: &FormValue) -> bool {
        self.disabled_when
            .as_ref()
            .is_some_and(|predicate| predicate(values))
    }
}

impl fmt::Debug for FieldRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRules")
            .field("rules", &self.rules)
            .field("value_as", &self.value_as)
            .field("disabled_when", &self.disabled_when.is_some())
            .finish()
    }
}

/// Result of the synchronous validation pass
pub enum SyncOutcome {
    Failed(FieldError),
    Passed,
    /// Sync rules passed; these async validators still have to run, in order
    NeedsAsync(Vec<(String, Arc<dyn AsyncValidator>)>),
}

/// Run the synchronous rules against `value`
///
/// Validator errors and panics both count as a failure carrying `failure_message`.
pub fn run_sync(rules: &FieldRules, value: &FormValue, failure_message: &str) -> SyncOutcome {
    let mut pending = Vec::new();
    for rule in rules.rules() {
        match rule {
            Rule::Required { message } => {
                if value.is_empty_value() {
                    return SyncOutcome::Failed(FieldError::Required {
                        message: message.clone(),
                    });
                }
            }
            Rule::Pattern { regex, message } => {
                // Empty values are the required rule's business
                if value.is_empty_value() {
                    continue;
                }
                let matched = value
                    .pattern_text()
                    .is_some_and(|text| regex.is_match(&text));
                if !matched {
                    return SyncOutcome::Failed(FieldError::PatternMismatch {
                        message: message.clone(),
                    });
                }
            }
            Rule::Custom { name, validate } => {
                let verdict = catch_unwind(AssertUnwindSafe(|| validate(value)));
                let message = match verdict {
                    Ok(Ok(Validity::Valid)) => continue,
                    Ok(Ok(Validity::Invalid(message))) => message,
                    Ok(Err(err)) => {
                        tracing::warn!("Validator {name} failed: {err:#}");
                        failure_message.to_string()
                    }
                    Err(_) => {
                        tracing::warn!("Validator {name} panicked");
                        failure_message.to_string()
                    }
                };
                return SyncOutcome::Failed(FieldError::Custom {
                    validator: name.clone(),
                    message,
                });
            }
            Rule::AsyncCustom { name, validate } => {
                pending.push((name.clone(), Arc::clone(validate)));
            }
        }
    }
    if pending.is_empty() {
        SyncOutcome::Passed
    } else {
        SyncOutcome::NeedsAsync(pending)
    }
}

/// Async validation work for one field, detached from the tracker
///
/// Owns everything it needs so the tracker stays free for further edits
/// while it runs.
pub struct PendingValidation {
    pub(crate) path: FieldPath,
    pub(crate) token: u64,
    pub(crate) value: FormValue,
    pub(crate) validators: Vec<(String, Arc<dyn AsyncValidator>)>,
    pub(crate) failure_message: String,
}

impl PendingValidation {
    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn value(&self) -> &FormValue {
        &self.value
    }

    /// Run the async validators in order, stopping at the first failure
    pub async fn resolve(self) -> ValidationResolution {
        let mut error = None;
        for (name, validator) in &self.validators {
            let verdict = AssertUnwindSafe(validator.validate(&self.value))
                .catch_unwind()
                .await;
            let message = match verdict {
                Ok(Ok(Validity::Valid)) => continue,
                Ok(Ok(Validity::Invalid(message))) => message,
                Ok(Err(err)) => {
                    tracing::warn!("Async validator {name} failed on {}: {err:#}", self.path);
                    self.failure_message.clone()
                }
                Err(_) => {
                    tracing::warn!("Async validator {name} panicked on {}", self.path);
                    self.failure_message.clone()
                }
            };
            error = Some(FieldError::AsyncValidation {
                validator: name.clone(),
                message,
            });
            break;
        }
        ValidationResolution {
            path: self.path,
            token: self.token,
            error,
        }
    }
}

impl fmt::Debug for PendingValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingValidation")
            .field("path", &self.path)
            .field("token", &self.token)
            .field("value", &self.value)
            .field("validators", &self.validators.len())
            .finish()
    }
}

/// Finished async validation, to be applied back to the tracker
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResolution {
    pub path: FieldPath,
    pub token: u64,
    pub error: Option<FieldError>,
}
