//! Form state tracking
//!
//! [`FormTracker`] owns the value tree, the per-field registry and the
//! submit flags. It is driven from a single event loop through `&mut self`.
//! Work that can suspend (async validators, async defaults, submit-time
//! validation) is split in two: a `begin_*` call hands back a detached ticket
//! the caller awaits, and an apply call feeds the result back in. Results
//! are matched against per-field tokens, so a resolution for a superseded
//! value is dropped instead of overwriting newer state.

use super::defaults::{DefaultValuesSource, LoadTicket};
use super::error::{FieldError, TrackerError};
use super::field::{FieldBinding, FieldEntry, FieldSnapshot, FieldState};
use super::field_array::FieldArrayState;
use super::path::FieldPath;
use super::resolver::{resolve_guarded, Resolver};
use super::validation::{
    run_sync, FieldRules, PendingValidation, SyncOutcome, ValidationResolution,
};
use super::value::{FormValue, ValueAs};
use super::watch::{ChangeKind, Subscription, WatchEvent, WatchHub};
use crate::config::TrackerConfig;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Read-only snapshot handed to the rendering layer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormState {
    pub values: FormValue,
    pub fields: BTreeMap<FieldPath, FieldState>,
    pub is_dirty: bool,
    pub is_valid: bool,
    pub is_validating: bool,
    pub is_loading: bool,
    pub is_submitting: bool,
    pub is_submitted: bool,
    pub is_submit_successful: bool,
    pub submit_count: u32,
    /// Increases on every observable mutation
    pub version: u64,
}

impl FormState {
    pub fn errors(&self) -> BTreeMap<FieldPath, FieldError> {
        self.fields
            .iter()
            .filter_map(|(path, state)| state.error.clone().map(|e| (path.clone(), e)))
            .collect()
    }

    pub fn error(&self, path: &str) -> Option<&FieldError> {
        let path = FieldPath::parse(path).ok()?;
        self.fields.get(&path)?.error.as_ref()
    }

    pub fn dirty_fields(&self) -> Vec<FieldPath> {
        self.fields
            .iter()
            .filter(|(_, s)| s.dirty)
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn touched_fields(&self) -> Vec<FieldPath> {
        self.fields
            .iter()
            .filter(|(_, s)| s.touched)
            .map(|(p, _)| p.clone())
            .collect()
    }
}

/// Options for [`FormTracker::set_value`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetValueOptions {
    pub should_validate: bool,
    pub should_dirty: bool,
    pub should_touch: bool,
}

impl SetValueOptions {
    pub fn all() -> Self {
        Self {
            should_validate: true,
            should_dirty: true,
            should_touch: true,
        }
    }
}

/// Outcome of starting a field validation
#[derive(Debug)]
pub enum FieldCheck {
    /// Validation was not requested for this event
    Skipped,
    /// Finished synchronously with this error (or none)
    Settled(Option<FieldError>),
    /// Sync rules passed; async validators must be awaited and applied
    Pending(PendingValidation),
}

impl FieldCheck {
    pub fn into_pending(self) -> Option<PendingValidation> {
        match self {
            FieldCheck::Pending(pending) => Some(pending),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, FieldCheck::Pending(_))
    }
}

/// Submit attempt accepted by [`FormTracker::begin_submit`]
///
/// Holds the values as they were when the attempt started. Those values are
/// the ones validated and the ones handed to the submit handler, whatever
/// edits happen while the async validators run.
#[derive(Debug)]
pub struct SubmitTicket {
    generation: u64,
    values: FormValue,
    /// Errors settled synchronously at the start of the attempt
    errors: BTreeMap<FieldPath, FieldError>,
    pending: Vec<PendingValidation>,
}

impl SubmitTicket {
    pub fn pending(&self) -> &[PendingValidation] {
        &self.pending
    }

    /// Await every outstanding async validation of the submit
    pub async fn resolve(self) -> SubmitResolution {
        let resolutions = join_all(self.pending.into_iter().map(PendingValidation::resolve)).await;
        SubmitResolution {
            generation: self.generation,
            values: self.values,
            errors: self.errors,
            resolutions,
        }
    }
}

#[derive(Debug)]
pub struct SubmitResolution {
    generation: u64,
    values: FormValue,
    errors: BTreeMap<FieldPath, FieldError>,
    resolutions: Vec<ValidationResolution>,
}

/// How a submit attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Another submit was in flight, the form was loading, or it was unmounted
    Ignored,
    /// Valid; the submit handler ran and succeeded
    Submitted,
    /// Invalid; the error handler ran with these errors
    Rejected(BTreeMap<FieldPath, FieldError>),
    /// Valid, but the submit handler returned an error
    HandlerFailed(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub(super) struct SubmitFlags {
    pub is_submitting: bool,
    pub is_submitted: bool,
    pub is_submit_successful: bool,
    pub submit_count: u32,
}

/// Client-side form state tracker
pub struct FormTracker {
    pub(super) config: TrackerConfig,
    pub(super) defaults: FormValue,
    pub(super) values: FormValue,
    pub(super) fields: BTreeMap<FieldPath, FieldEntry>,
    pub(super) arrays: BTreeMap<FieldPath, FieldArrayState>,
    pub(super) resolver: Option<Arc<dyn Resolver>>,
    pub(super) watchers: WatchHub,
    pub(super) submit: SubmitFlags,
    pub(super) is_loading: bool,
    pub(super) mounted: bool,
    pub(super) next_token: u64,
    pub(super) load_generation: u64,
    pub(super) submit_generation: u64,
    pub(super) version: u64,
}

impl FormTracker {
    /// Mount a form with known default values
    pub fn new(config: TrackerConfig, defaults: FormValue) -> Self {
        Self {
            config,
            values: defaults.clone(),
            defaults,
            fields: BTreeMap::new(),
            arrays: BTreeMap::new(),
            resolver: None,
            watchers: WatchHub::default(),
            submit: SubmitFlags::default(),
            is_loading: false,
            mounted: true,
            next_token: 0,
            load_generation: 0,
            submit_generation: 0,
            version: 0,
        }
    }

    /// Mount a form whose defaults arrive later through [`Self::load_defaults`]
    pub fn loading(config: TrackerConfig) -> Self {
        let mut tracker = Self::new(config, FormValue::object());
        tracker.is_loading = true;
        tracker
    }

    /// Validate with a schema resolver instead of per-field rules
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn set_resolver(&mut self, resolver: Option<Arc<dyn Resolver>>) {
        self.resolver = resolver;
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub(super) fn ensure_mounted(&self) -> Result<(), TrackerError> {
        if self.mounted {
            Ok(())
        } else {
            Err(TrackerError::Unmounted)
        }
    }

    pub(super) fn ensure_editable(&self) -> Result<(), TrackerError> {
        self.ensure_mounted()?;
        if self.is_loading {
            return Err(TrackerError::Loading);
        }
        Ok(())
    }

    pub(super) fn issue_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    pub(super) fn notify(&mut self, changed_path: Option<FieldPath>, kind: ChangeKind) {
        let event = WatchEvent { changed_path, kind };
        self.watchers.notify(&self.values, &event);
    }

    // ---- registration ----

    /// Associate `path` with validation rules and return its binding
    ///
    /// Registering an existing path replaces its rules and keeps its state.
    pub fn register(&mut self, path: &str, rules: FieldRules) -> Result<FieldBinding, TrackerError> {
        self.ensure_mounted()?;
        let path = FieldPath::parse(path)?;
        let disabled = rules.is_disabled(&self.values);
        match self.fields.get_mut(&path) {
            Some(entry) => {
                tracing::debug!("Re-registering field {path}");
                entry.rules = rules;
                entry.state.disabled = disabled;
            }
            None => {
                tracing::debug!("Registering field {path}");
                let mut entry = FieldEntry::new(rules);
                entry.state.disabled = disabled;
                self.fields.insert(path.clone(), entry);
            }
        }
        if disabled {
            if let Some(entry) = self.fields.get_mut(&path) {
                entry.state.error = None;
            }
        }
        self.normalize_dates();
        self.version += 1;
        Ok(FieldBinding::new(path))
    }

    /// Date fields hold `Date` values even where the defaults spell them as text
    fn normalize_dates(&mut self) {
        for (path, entry) in &self.fields {
            if entry.rules.value_as != ValueAs::Date {
                continue;
            }
            for root in [&mut self.defaults, &mut self.values] {
                let Some(slot) = root.get_mut(path) else {
                    continue;
                };
                if let FormValue::Text(raw) = slot {
                    if let date @ FormValue::Date(_) = FormValue::coerce(raw, ValueAs::Date) {
                        *slot = date;
                    }
                }
            }
        }
    }

    pub fn is_registered(&self, path: &str) -> bool {
        FieldPath::parse(path).is_ok_and(|p| self.fields.contains_key(&p))
    }

    pub fn registered_paths(&self) -> Vec<FieldPath> {
        self.fields.keys().cloned().collect()
    }

    // ---- values ----

    pub fn get_values(&self) -> &FormValue {
        &self.values
    }

    pub fn get_value(&self, path: &str) -> Result<Option<&FormValue>, TrackerError> {
        let path = FieldPath::parse(path)?;
        Ok(self.values.get(&path))
    }

    pub fn default_values(&self) -> &FormValue {
        &self.defaults
    }

    /// Programmatic value update
    pub fn set_value(
        &mut self,
        path: &str,
        value: impl Into<FormValue>,
        options: SetValueOptions,
    ) -> Result<FieldCheck, TrackerError> {
        self.ensure_editable()?;
        let path = FieldPath::parse(path)?;
        self.write_value(&path, value.into(), options.should_dirty, ChangeKind::SetValue)?;

        if options.should_touch {
            if let Some(entry) = self.fields.get_mut(&path) {
                entry.state.touched = true;
            }
        }

        if options.should_validate && self.fields.contains_key(&path) {
            Ok(self.begin_validation(&path))
        } else {
            Ok(FieldCheck::Skipped)
        }
    }

    /// User input on a field; applies the field's coercion and validation mode
    pub fn change(
        &mut self,
        path: &str,
        value: impl Into<FormValue>,
    ) -> Result<FieldCheck, TrackerError> {
        self.ensure_editable()?;
        let path = FieldPath::parse(path)?;
        let entry = self
            .fields
            .get(&path)
            .ok_or_else(|| TrackerError::UnknownField(path.to_string()))?;
        let touched = entry.state.touched;

        let value = match (value.into(), entry.rules.value_as) {
            (FormValue::Text(raw), value_as) if value_as != ValueAs::Text => {
                FormValue::coerce(&raw, value_as)
            }
            (value, _) => value,
        };
        self.write_value(&path, value, true, ChangeKind::Input)?;

        if self
            .config
            .validates_on_change(touched, self.submit.is_submitted)
        {
            Ok(self.begin_validation(&path))
        } else {
            Ok(FieldCheck::Skipped)
        }
    }

    /// Field lost focus
    pub fn blur(&mut self, path: &str) -> Result<FieldCheck, TrackerError> {
        self.ensure_editable()?;
        let path = FieldPath::parse(path)?;
        let entry = self
            .fields
            .get_mut(&path)
            .ok_or_else(|| TrackerError::UnknownField(path.to_string()))?;
        entry.state.touched = true;
        self.version += 1;

        if self.config.validates_on_blur(self.submit.is_submitted) {
            Ok(self.begin_validation(&path))
        } else {
            Ok(FieldCheck::Skipped)
        }
    }

    /// Store a value and update everything that depends on it
    ///
    /// Any registered field at or below `path` gets a fresh token, which
    /// discards async validations started for its previous value.
    fn write_value(
        &mut self,
        path: &FieldPath,
        value: FormValue,
        update_dirty: bool,
        kind: ChangeKind,
    ) -> Result<(), TrackerError> {
        tracing::debug!("Setting {path} = {}", value.display_value());
        self.values.set(path, value)?;

        let affected: Vec<FieldPath> = self
            .fields
            .keys()
            .filter(|p| p.starts_with(path))
            .cloned()
            .collect();
        for field in &affected {
            let token = self.issue_token();
            let dirty = self.values.get(field) != self.defaults.get(field);
            if let Some(entry) = self.fields.get_mut(field) {
                entry.token = token;
                entry.state.validating = false;
                if update_dirty {
                    entry.state.dirty = dirty;
                }
            }
        }

        self.resync_arrays_under(path);
        self.refresh_disabled();
        self.version += 1;
        self.notify(Some(path.clone()), kind);
        Ok(())
    }

    /// Re-evaluate `disabled_when` predicates; newly disabled fields drop their error
    pub(super) fn refresh_disabled(&mut self) {
        for entry in self.fields.values_mut() {
            let disabled = entry.rules.is_disabled(&self.values);
            if disabled != entry.state.disabled {
                entry.state.disabled = disabled;
                if disabled {
                    self.next_token += 1;
                    entry.token = self.next_token;
                    entry.state.error = None;
                    entry.state.validating = false;
                }
            }
        }
    }

    /// Recompute dirty flags of every field below `prefix` against the defaults
    pub(super) fn recompute_dirty_under(&mut self, prefix: &FieldPath) {
        for (path, entry) in self.fields.iter_mut() {
            if path.starts_with(prefix) {
                entry.state.dirty = self.values.get(path) != self.defaults.get(path);
            }
        }
    }

    // ---- validation ----

    /// Run the synchronous part of a field's validation
    ///
    /// Disabled fields always settle without error. With a resolver installed
    /// the resolver's verdict for this path replaces the field's own rules.
    fn begin_validation(&mut self, path: &FieldPath) -> FieldCheck {
        let token = self.issue_token();
        let failure_message = self.config.validator_failure_message.clone();
        let resolved = self.resolver.as_deref().map(|resolver| {
            match resolve_guarded(resolver, &self.values) {
                Some(mut result) => result.errors.remove(path),
                None => Some(FieldError::Schema {
                    message: failure_message.clone(),
                }),
            }
        });
        let value = self.values.get(path).cloned().unwrap_or_default();

        let Some(entry) = self.fields.get_mut(path) else {
            return FieldCheck::Skipped;
        };
        entry.token = token;

        let check = if entry.state.disabled {
            entry.state.error = None;
            entry.state.validating = false;
            FieldCheck::Settled(None)
        } else if let Some(error) = resolved {
            entry.state.error = error.clone();
            entry.state.validating = false;
            FieldCheck::Settled(error)
        } else {
            match run_sync(&entry.rules, &value, &failure_message) {
                SyncOutcome::Failed(error) => {
                    entry.state.error = Some(error.clone());
                    entry.state.validating = false;
                    FieldCheck::Settled(Some(error))
                }
                SyncOutcome::Passed => {
                    entry.state.error = None;
                    entry.state.validating = false;
                    FieldCheck::Settled(None)
                }
                SyncOutcome::NeedsAsync(validators) => {
                    entry.state.validating = true;
                    FieldCheck::Pending(PendingValidation {
                        path: path.clone(),
                        token,
                        value,
                        validators,
                        failure_message,
                    })
                }
            }
        };

        match &check {
            FieldCheck::Settled(Some(error)) => tracing::debug!("Field {path} invalid: {error}"),
            FieldCheck::Settled(None) => tracing::debug!("Field {path} valid"),
            FieldCheck::Pending(_) => tracing::debug!("Field {path} awaiting async validation (token {token})"),
            FieldCheck::Skipped => {}
        }
        self.version += 1;
        check
    }

    /// Start validating one registered field
    pub fn begin_validate_field(&mut self, path: &str) -> Result<FieldCheck, TrackerError> {
        self.ensure_mounted()?;
        let path = FieldPath::parse(path)?;
        if !self.fields.contains_key(&path) {
            return Err(TrackerError::UnknownField(path.to_string()));
        }
        Ok(self.begin_validation(&path))
    }

    /// Apply a finished async validation
    ///
    /// Returns `false` when the resolution is stale (the field was edited or
    /// re-validated since) or the form is unmounted; nothing changes then.
    pub fn apply_validation(&mut self, resolution: ValidationResolution) -> bool {
        if !self.mounted {
            tracing::debug!("Ignoring validation of {} after unmount", resolution.path);
            return false;
        }
        match self.fields.get_mut(&resolution.path) {
            Some(entry) if entry.token == resolution.token => {
                entry.state.validating = false;
                entry.state.error = resolution.error;
                self.version += 1;
                true
            }
            _ => {
                tracing::debug!(
                    "Discarding stale validation of {} (token {})",
                    resolution.path,
                    resolution.token
                );
                false
            }
        }
    }

    /// Validate one field, awaiting its async validators
    pub async fn validate_field(&mut self, path: &str) -> Result<Option<FieldError>, TrackerError> {
        let check = self.begin_validate_field(path)?;
        self.settle(check).await;
        let path = FieldPath::parse(path)?;
        Ok(self
            .fields
            .get(&path)
            .and_then(|entry| entry.state.error.clone()))
    }

    /// Await a check's async part, if any, and apply it
    pub async fn settle(&mut self, check: FieldCheck) -> bool {
        match check {
            FieldCheck::Pending(pending) => {
                let resolution = pending.resolve().await;
                self.apply_validation(resolution)
            }
            _ => true,
        }
    }

    /// Start validating every registered field
    pub fn begin_validate_all(&mut self) -> Vec<PendingValidation> {
        if let Some(resolver) = self.resolver.clone() {
            let failure_message = self.config.validator_failure_message.clone();
            let (mut errors, panicked) = match resolve_guarded(resolver.as_ref(), &self.values) {
                Some(result) => (result.errors, false),
                None => (BTreeMap::new(), true),
            };
            for (path, entry) in self.fields.iter_mut() {
                self.next_token += 1;
                entry.token = self.next_token;
                entry.state.validating = false;
                let error = if panicked {
                    Some(FieldError::Schema {
                        message: failure_message.clone(),
                    })
                } else {
                    errors.remove(path)
                };
                entry.state.error = if entry.state.disabled { None } else { error };
            }
            for path in errors.keys() {
                tracing::debug!("Resolver reported an error for unregistered field {path}");
            }
            self.version += 1;
            return Vec::new();
        }

        let paths: Vec<FieldPath> = self.fields.keys().cloned().collect();
        paths
            .iter()
            .filter_map(|path| self.begin_validation(path).into_pending())
            .collect()
    }

    /// Validate every registered field and return the aggregate errors
    pub async fn validate_all(&mut self) -> BTreeMap<FieldPath, FieldError> {
        let pending = self.begin_validate_all();
        let resolutions = join_all(pending.into_iter().map(PendingValidation::resolve)).await;
        for resolution in resolutions {
            self.apply_validation(resolution);
        }
        self.errors()
    }

    /// Validate the named fields (all fields when empty); `true` if they are all valid
    pub async fn trigger(&mut self, paths: &[&str]) -> Result<bool, TrackerError> {
        if paths.is_empty() {
            return Ok(self.validate_all().await.is_empty());
        }
        let mut checks = Vec::with_capacity(paths.len());
        for path in paths {
            checks.push(self.begin_validate_field(path)?);
        }
        let pending: Vec<PendingValidation> = checks
            .into_iter()
            .filter_map(FieldCheck::into_pending)
            .collect();
        for resolution in join_all(pending.into_iter().map(PendingValidation::resolve)).await {
            self.apply_validation(resolution);
        }
        let mut valid = true;
        for path in paths {
            let path = FieldPath::parse(path)?;
            valid &= self
                .fields
                .get(&path)
                .map_or(true, |entry| entry.state.error.is_none());
        }
        Ok(valid)
    }

    // ---- aggregate state ----

    pub fn errors(&self) -> BTreeMap<FieldPath, FieldError> {
        self.fields
            .iter()
            .filter_map(|(path, entry)| entry.state.error.clone().map(|e| (path.clone(), e)))
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.fields.values().all(|entry| entry.state.error.is_none())
    }

    pub fn is_dirty(&self) -> bool {
        self.fields.values().any(|entry| entry.state.dirty)
            || self.arrays.keys().any(|array| self.array_dirty(array))
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_submitting(&self) -> bool {
        self.submit.is_submitting
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn field(&self, path: &str) -> Option<FieldSnapshot> {
        let path = FieldPath::parse(path).ok()?;
        let entry = self.fields.get(&path)?;
        Some(FieldSnapshot {
            value: self.values.get(&path).cloned().unwrap_or_default(),
            state: entry.state.clone(),
            path,
        })
    }

    pub fn snapshot(&self) -> FormState {
        FormState {
            values: self.values.clone(),
            fields: self
                .fields
                .iter()
                .map(|(path, entry)| (path.clone(), entry.state.clone()))
                .collect(),
            is_dirty: self.is_dirty(),
            is_valid: self.is_valid(),
            is_validating: self.fields.values().any(|e| e.state.validating),
            is_loading: self.is_loading,
            is_submitting: self.submit.is_submitting,
            is_submitted: self.submit.is_submitted,
            is_submit_successful: self.submit.is_submit_successful,
            submit_count: self.submit.submit_count,
            version: self.version,
        }
    }

    // ---- submit ----

    /// Accept a submit attempt and start validating everything
    ///
    /// Returns `None` while another submit is in flight (no queuing), while
    /// loading, or after unmount.
    pub fn begin_submit(&mut self) -> Option<SubmitTicket> {
        if !self.mounted || self.is_loading {
            tracing::debug!("Submit ignored: form not ready");
            return None;
        }
        if self.submit.is_submitting {
            tracing::debug!("Submit ignored: already submitting");
            return None;
        }
        self.submit.is_submitting = true;
        self.submit_generation += 1;
        self.version += 1;
        let pending = self.begin_validate_all();
        let errors = self
            .errors()
            .into_iter()
            .filter(|(path, _)| !pending.iter().any(|p| p.path() == path))
            .collect();
        Some(SubmitTicket {
            generation: self.submit_generation,
            values: self.values.clone(),
            errors,
            pending,
        })
    }

    /// Finish a submit attempt started with [`Self::begin_submit`]
    pub fn finish_submit<V, I>(
        &mut self,
        resolution: SubmitResolution,
        on_valid: V,
        on_invalid: I,
    ) -> SubmitOutcome
    where
        V: FnOnce(&FormValue) -> anyhow::Result<()>,
        I: FnOnce(&BTreeMap<FieldPath, FieldError>),
    {
        if !self.mounted
            || !self.submit.is_submitting
            || resolution.generation != self.submit_generation
        {
            tracing::debug!("Discarding stale submit (generation {})", resolution.generation);
            return SubmitOutcome::Ignored;
        }
        let SubmitResolution {
            values,
            mut errors,
            resolutions,
            ..
        } = resolution;
        // The verdict covers the submitted values even when a field was
        // edited meanwhile and its resolution no longer applies to the field.
        for validation in resolutions {
            if let Some(error) = &validation.error {
                errors.insert(validation.path.clone(), error.clone());
            }
            self.apply_validation(validation);
        }

        self.submit.is_submitting = false;
        self.submit.is_submitted = true;
        self.submit.submit_count += 1;
        self.version += 1;

        if !errors.is_empty() {
            tracing::info!("Submit rejected with {} error(s)", errors.len());
            self.submit.is_submit_successful = false;
            on_invalid(&errors);
            return SubmitOutcome::Rejected(errors);
        }

        match on_valid(&values) {
            Ok(()) => {
                tracing::info!("Submit #{} succeeded", self.submit.submit_count);
                self.submit.is_submit_successful = true;
                if self.config.reset_after_successful_submit {
                    self.restore_defaults(ChangeKind::Reset);
                }
                SubmitOutcome::Submitted
            }
            Err(err) => {
                tracing::warn!("Submit handler failed: {err:#}");
                self.submit.is_submit_successful = false;
                SubmitOutcome::HandlerFailed(format!("{err:#}"))
            }
        }
    }

    /// Validate everything, then call `on_valid` or `on_invalid`
    pub async fn handle_submit<V, I>(&mut self, on_valid: V, on_invalid: I) -> SubmitOutcome
    where
        V: FnOnce(&FormValue) -> anyhow::Result<()>,
        I: FnOnce(&BTreeMap<FieldPath, FieldError>),
    {
        let Some(ticket) = self.begin_submit() else {
            return SubmitOutcome::Ignored;
        };
        let resolution = ticket.resolve().await;
        self.finish_submit(resolution, on_valid, on_invalid)
    }

    // ---- reset & lifecycle ----

    /// Restore defaults (optionally replacing them) and clear all field and submit state
    pub fn reset(&mut self, new_defaults: Option<FormValue>) -> Result<(), TrackerError> {
        self.ensure_editable()?;
        if let Some(defaults) = new_defaults {
            self.defaults = defaults;
        }
        self.submit = SubmitFlags::default();
        // Invalidates any submit still in flight
        self.submit_generation += 1;
        self.restore_defaults(ChangeKind::Reset);
        tracing::info!("Form reset");
        Ok(())
    }

    /// Values back to defaults, field state cleared, rows beyond the defaults dropped
    pub(super) fn restore_defaults(&mut self, kind: ChangeKind) {
        self.values = self.defaults.clone();
        self.normalize_dates();
        for entry in self.fields.values_mut() {
            self.next_token += 1;
            entry.token = self.next_token;
            entry.state = FieldState::default();
        }
        self.prune_array_rows();
        self.sync_array_ids(true);
        self.refresh_disabled();
        self.version += 1;
        self.notify(None, kind);
    }

    /// Start resolving defaults; the form is loading until the ticket is finished
    pub fn begin_load(&mut self) -> LoadTicket {
        self.load_generation += 1;
        self.is_loading = true;
        self.version += 1;
        LoadTicket {
            generation: self.load_generation,
        }
    }

    /// Apply loaded defaults
    ///
    /// `Ok(false)` means the ticket was stale or the form unmounted. A failed
    /// load leaves the form loading and returns the error.
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: anyhow::Result<FormValue>,
    ) -> anyhow::Result<bool> {
        if !self.mounted || ticket.generation != self.load_generation {
            tracing::debug!("Ignoring stale default values (generation {})", ticket.generation);
            return Ok(false);
        }
        let defaults = result?;
        self.defaults = defaults;
        self.is_loading = false;
        self.restore_defaults(ChangeKind::DefaultsLoaded);
        tracing::info!("Default values loaded");
        Ok(true)
    }

    /// Resolve defaults from `source` and apply them
    pub async fn load_defaults(&mut self, source: &dyn DefaultValuesSource) -> anyhow::Result<bool> {
        let ticket = self.begin_load();
        let result = source.load().await;
        if let Err(err) = &result {
            tracing::warn!("Loading default values failed: {err:#}");
        }
        self.finish_load(ticket, result)
    }

    /// Tear the form down; every later async completion is ignored
    pub fn unmount(&mut self) {
        self.mounted = false;
        self.submit.is_submitting = false;
        self.watchers.clear();
        for entry in self.fields.values_mut() {
            entry.state.validating = false;
        }
        tracing::info!("Form unmounted");
    }

    // ---- watch ----

    /// Subscribe to value changes
    pub fn watch<F>(&mut self, callback: F) -> Subscription
    where
        F: FnMut(&FormValue, &WatchEvent) + 'static,
    {
        self.watchers.subscribe(Box::new(callback))
    }

    /// Current snapshot of all values
    pub fn watch_all(&self) -> FormValue {
        self.values.clone()
    }

    /// Current value at one path
    pub fn watch_path(&self, path: &str) -> Result<Option<FormValue>, TrackerError> {
        Ok(self.get_value(path)?.cloned())
    }
}

impl FieldBinding {
    pub fn value(&self, form: &FormTracker) -> Option<FormValue> {
        form.values.get(self.path()).cloned()
    }

    pub fn state(&self, form: &FormTracker) -> Option<FieldState> {
        form.fields.get(self.path()).map(|entry| entry.state.clone())
    }

    pub fn set(
        &self,
        form: &mut FormTracker,
        value: impl Into<FormValue>,
        options: SetValueOptions,
    ) -> Result<FieldCheck, TrackerError> {
        form.set_value(&self.name(), value, options)
    }

    pub fn on_change(
        &self,
        form: &mut FormTracker,
        value: impl Into<FormValue>,
    ) -> Result<FieldCheck, TrackerError> {
        form.change(&self.name(), value)
    }

    pub fn on_blur(&self, form: &mut FormTracker) -> Result<FieldCheck, TrackerError> {
        form.blur(&self.name())
    }
}
