//! YouTube channel form with per-field rules
//!
//! Defaults are loaded from the user directory, the email has sync and
//! async checks, the second address line is disabled until the first one is
//! filled in, and phone numbers form a field array.

use super::directory::{EmailAvailable, ProfileDefaults, UserDirectory};
use crate::config::{TrackerConfig, ValidationMode};
use crate::state::forms::{FieldPath, FieldRules, FormTracker, FormValue, Validity};
use anyhow::Result;
use regex::Regex;
use std::sync::Arc;

pub const EMAIL_PATTERN: &str =
    r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9-]+(?:\.[a-zA-Z0-9-]+)*$";

fn email_rules(directory: Arc<UserDirectory>) -> Result<FieldRules> {
    Ok(FieldRules::new()
        .pattern(Regex::new(EMAIL_PATTERN)?, "Invalid email format")
        .validate("notAdmin", |value| {
            Ok(Validity::check(
                value.as_text() != Some("admin@example.com"),
                "Enter a different email address",
            ))
        })
        .validate("notBlackListed", |value| {
            Ok(Validity::check(
                !value.as_text().unwrap_or_default().ends_with("baddomain.com"),
                "This domain is not supported",
            ))
        })
        .validate_async("emailAvailable", Arc::new(EmailAvailable::new(directory))))
}

fn line1_is_empty(values: &FormValue) -> bool {
    let line1 = FieldPath::from_segments(Vec::new()).key("address").key("line1");
    values
        .get(&line1)
        .and_then(FormValue::as_text)
        .map_or(true, str::is_empty)
}

/// Register every field of the form
pub fn register(form: &mut FormTracker, directory: Arc<UserDirectory>) -> Result<()> {
    form.register("username", FieldRules::new().required("Username is required"))?;
    form.register("email", email_rules(directory)?)?;
    form.register("channel", FieldRules::new().required("Channel is required"))?;
    form.register(
        "address.line1",
        FieldRules::new().required("Address is required"),
    )?;
    form.register(
        "address.line2",
        FieldRules::new()
            .required("Address is required")
            .disabled_when(line1_is_empty),
    )?;
    form.register(
        "age",
        FieldRules::new()
            .value_as_number()
            .required("Age is required"),
    )?;
    form.register(
        "dob",
        FieldRules::new()
            .value_as_date()
            .required("Date of Birth is required"),
    )?;
    Ok(())
}

/// Mount the form and wait for its defaults
pub async fn mount(config: TrackerConfig, directory: Arc<UserDirectory>) -> Result<FormTracker> {
    let config = TrackerConfig {
        mode: ValidationMode::OnTouched,
        ..config
    };
    let mut form = FormTracker::loading(config);
    register(&mut form, Arc::clone(&directory))?;
    form.load_defaults(&ProfileDefaults::new(directory)).await?;
    form.field_array("phone")?;
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::forms::{FieldCheck, FieldError, SubmitOutcome};
    use pretty_assertions::assert_eq;

    async fn form() -> FormTracker {
        mount(
            TrackerConfig {
                reset_after_successful_submit: false,
                ..Default::default()
            },
            Arc::new(UserDirectory::sample()),
        )
        .await
        .unwrap()
    }

    async fn email_error(form: &mut FormTracker, email: &str) -> Option<String> {
        form.change("email", email).unwrap();
        form.validate_field("email")
            .await
            .unwrap()
            .map(|e| e.message().to_string())
    }

    #[tokio::test]
    async fn test_mount_loads_defaults() {
        let form = form().await;
        let state = form.snapshot();
        assert!(!state.is_loading);
        assert!(!state.is_dirty);
        assert_eq!(
            form.get_value("email").unwrap(),
            Some(&FormValue::from("Sincere@april.biz"))
        );
        assert!(form.is_registered("phone.0.number"));
        assert!(form.field("address.line2").unwrap().state.disabled);
    }

    #[tokio::test]
    async fn test_email_checks_in_order() {
        let mut form = form().await;
        assert_eq!(
            email_error(&mut form, "not-an-email").await.as_deref(),
            Some("Invalid email format")
        );
        assert_eq!(
            email_error(&mut form, "admin@example.com").await.as_deref(),
            Some("Enter a different email address")
        );
        assert_eq!(
            email_error(&mut form, "joker@baddomain.com").await.as_deref(),
            Some("This domain is not supported")
        );
        assert_eq!(
            email_error(&mut form, "Shanna@melissa.tv").await.as_deref(),
            Some("Email already exists")
        );
        assert_eq!(email_error(&mut form, "bruce@wayne.com").await, None);
    }

    #[tokio::test]
    async fn test_touched_mode() {
        let mut form = form().await;
        assert!(matches!(form.change("channel", "").unwrap(), FieldCheck::Skipped));
        let check = form.blur("channel").unwrap();
        assert!(matches!(
            check,
            FieldCheck::Settled(Some(FieldError::Required { .. }))
        ));
    }

    #[tokio::test]
    async fn test_submit_reports_every_missing_field() {
        let mut form = form().await;
        form.change("age", "").unwrap();
        let outcome = form.handle_submit(|_| Ok(()), |_| {}).await;
        let SubmitOutcome::Rejected(errors) = outcome else {
            panic!("expected rejection");
        };
        let messages: Vec<&str> = errors.values().map(|e| e.message()).collect();
        // The profile email loaded as default is already taken
        assert_eq!(
            messages,
            vec![
                "Address is required",
                "Age is required",
                "Channel is required",
                "Email already exists",
            ]
        );
    }

    #[tokio::test]
    async fn test_complete_submit() {
        let mut form = form().await;
        form.change("email", "bruce@wayne.com").unwrap();
        form.change("channel", "Batcave").unwrap();
        form.change("address.line1", "1007 Mountain Drive").unwrap();
        form.change("address.line2", "Gotham").unwrap();
        form.change("age", "35").unwrap();
        form.change("dob", "1939-05-01").unwrap();
        form.field_array("phone")
            .unwrap()
            .append(FormValue::object().with("number", "555"))
            .unwrap();

        let mut submitted = None;
        let outcome = form
            .handle_submit(
                |values| {
                    submitted = Some(serde_json::Value::from(values.clone()));
                    Ok(())
                },
                |_| {},
            )
            .await;
        assert_eq!(outcome, SubmitOutcome::Submitted);
        let submitted = submitted.unwrap();
        assert_eq!(submitted["age"], 35.0);
        assert_eq!(submitted["dob"], "1939-05-01");
        assert_eq!(submitted["phone"][1]["number"], "555");
    }
}
