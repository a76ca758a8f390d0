//! YouTube form validated by a whole-form schema instead of field rules

use crate::config::TrackerConfig;
use crate::state::forms::{FieldPath, FieldRules, FormTracker, FormValue, SchemaResolver, StringSchema};
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;

pub fn schema() -> Result<SchemaResolver> {
    Ok(SchemaResolver::new()
        .field(
            FieldPath::parse("username")?,
            StringSchema::new().non_empty("Username is required"),
        )
        .field(
            FieldPath::parse("email")?,
            StringSchema::new()
                .non_empty("Email is required")
                .email("Email format is not valid"),
        )
        .field(
            FieldPath::parse("channel")?,
            StringSchema::new().non_empty("Channel is required"),
        ))
}

pub fn mount(config: TrackerConfig) -> Result<FormTracker> {
    let defaults = FormValue::from(json!({ "username": "", "email": "", "channel": "" }));
    let mut form = FormTracker::new(config, defaults).with_resolver(Arc::new(schema()?));
    for field in ["username", "email", "channel"] {
        form.register(field, FieldRules::new())?;
    }
    Ok(form)
}
