//! Ready-made forms driven by the command-line demo

pub mod directory;
pub mod login;
pub mod schema_youtube;
pub mod youtube;

use crate::config::TrackerConfig;
use crate::state::forms::FormTracker;
use anyhow::Result;
use clap::ValueEnum;
use directory::UserDirectory;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DemoForm {
    /// Per-field rules, async defaults and a phone list
    #[default]
    #[value(name = "youtube")]
    YouTube,
    /// The same form validated by a schema resolver
    Schema,
    /// Email and password
    Login,
}

impl DemoForm {
    pub async fn mount(self, config: TrackerConfig) -> Result<FormTracker> {
        match self {
            DemoForm::YouTube => {
                youtube::mount(config, Arc::new(UserDirectory::sample())).await
            }
            DemoForm::Schema => schema_youtube::mount(config),
            DemoForm::Login => login::mount(config),
        }
    }
}

impl fmt::Display for DemoForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => Ok(()),
        }
    }
}
