//! Email and password login form

use crate::config::TrackerConfig;
use crate::state::forms::{FieldRules, FormTracker, FormValue};
use anyhow::Result;

pub fn mount(config: TrackerConfig) -> Result<FormTracker> {
    let defaults = FormValue::object().with("email", "").with("password", "");
    let mut form = FormTracker::new(config, defaults);
    form.register("email", FieldRules::new().required("Email is required"))?;
    form.register("password", FieldRules::new().required("Password is required"))?;
    Ok(form)
}
