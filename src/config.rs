//! Tracker configuration

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// When field validation runs before the first submit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    #[default]
    OnSubmit,
    OnBlur,
    OnChange,
    /// First on blur, then on every change
    OnTouched,
    All,
}

/// When field validation runs after the first submit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevalidateMode {
    #[default]
    OnChange,
    OnBlur,
    OnSubmit,
}

impl ValidationMode {
    pub fn validates_on_change(&self, touched: bool) -> bool {
        match self {
            Self::OnChange | Self::All => true,
            Self::OnTouched => touched,
            Self::OnSubmit | Self::OnBlur => false,
        }
    }

    pub fn validates_on_blur(&self) -> bool {
        matches!(self, Self::OnBlur | Self::OnTouched | Self::All)
    }
}

pub const DEFAULT_FAILURE_MESSAGE: &str = "Validation failed";

/// User configuration for the form tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Validation trigger before the first submit
    pub mode: ValidationMode,
    /// Validation trigger after the first submit
    pub revalidate_mode: RevalidateMode,
    /// Error shown when a validator fails to run
    pub validator_failure_message: String,
    /// Restore defaults after a successful submit (submit counters are kept)
    pub reset_after_successful_submit: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            mode: ValidationMode::default(),
            revalidate_mode: RevalidateMode::default(),
            validator_failure_message: DEFAULT_FAILURE_MESSAGE.to_string(),
            reset_after_successful_submit: true,
        }
    }
}

impl TrackerConfig {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("io", "form-tracker", "form-tracker")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load configuration from file
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                let content = fs::read_to_string(&path)?;
                let config: TrackerConfig = serde_json::from_str(&content)?;
                return Ok(config);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let content = serde_json::to_string_pretty(self)?;
            fs::write(&path, content)?;
        }
        Ok(())
    }

    /// Should a change to a field re-run its validation?
    pub fn validates_on_change(&self, touched: bool, submitted: bool) -> bool {
        self.mode.validates_on_change(touched)
            || (submitted && self.revalidate_mode == RevalidateMode::OnChange)
    }

    /// Should a blur re-run validation?
    pub fn validates_on_blur(&self, submitted: bool) -> bool {
        self.mode.validates_on_blur()
            || (submitted && self.revalidate_mode == RevalidateMode::OnBlur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.mode, ValidationMode::OnSubmit);
        assert_eq!(config.revalidate_mode, RevalidateMode::OnChange);
        assert_eq!(config.validator_failure_message, DEFAULT_FAILURE_MESSAGE);
        assert!(config.reset_after_successful_submit);
    }

    #[test]
    fn test_serialization() {
        let config = TrackerConfig {
            mode: ValidationMode::OnTouched,
            revalidate_mode: RevalidateMode::OnBlur,
            validator_failure_message: "Could not validate".to_string(),
            reset_after_successful_submit: false,
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed: TrackerConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, config);
        assert!(json.contains("\"on_touched\""));
    }

    #[test]
    fn test_deserialize_from_empty_json() {
        let parsed: TrackerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, TrackerConfig::default());
    }

    #[test]
    fn test_partial_deserialization() {
        let parsed: TrackerConfig = serde_json::from_str(r#"{"mode": "all"}"#).unwrap();
        assert_eq!(parsed.mode, ValidationMode::All);
        assert!(parsed.reset_after_successful_submit);
    }

    #[test]
    fn test_deserialize_with_extra_fields() {
        let json = r#"{"mode": "on_blur", "unknown_field": "value"}"#;
        let parsed: TrackerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.mode, ValidationMode::OnBlur);
    }

    #[test]
    fn test_load_returns_ok() {
        // Falls back to defaults when no config file exists
        assert!(TrackerConfig::load().is_ok());
    }

    mod modes {
        use super::*;

        #[test]
        fn test_on_submit_never_validates_before_submit() {
            let config = TrackerConfig::default();
            assert!(!config.validates_on_change(true, false));
            assert!(!config.validates_on_blur(false));
        }

        #[test]
        fn test_revalidates_on_change_after_submit() {
            let config = TrackerConfig::default();
            assert!(config.validates_on_change(false, true));
            assert!(!config.validates_on_blur(true));
        }

        #[test]
        fn test_on_touched() {
            let config = TrackerConfig {
                mode: ValidationMode::OnTouched,
                ..Default::default()
            };
            assert!(!config.validates_on_change(false, false));
            assert!(config.validates_on_change(true, false));
            assert!(config.validates_on_blur(false));
        }

        #[test]
        fn test_all() {
            let config = TrackerConfig {
                mode: ValidationMode::All,
                revalidate_mode: RevalidateMode::OnSubmit,
                ..Default::default()
            };
            assert!(config.validates_on_change(false, false));
            assert!(config.validates_on_blur(false));
        }
    }
}
