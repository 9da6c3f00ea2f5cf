//! Build configuration
//!
//! The free-form record describing what to build. It arrives as JSON text
//! inside the multipart submission and is validated before any job exists.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const REDACTED: &str = "********";

/// Submission rejected before a job was created
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Configuration for a single AAB build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub package_name: String,
    #[serde(default)]
    pub version_name: String,
    #[serde(default)]
    pub version_code: u32,
    #[serde(default)]
    pub key_alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_password: Option<String>,
    #[serde(default = "default_min_sdk")]
    pub min_sdk: Option<u32>,
    #[serde(default = "default_target_sdk")]
    pub target_sdk: Option<u32>,
    #[serde(default = "default_build_tools_version")]
    pub build_tools_version: Option<String>,
}

fn default_min_sdk() -> Option<u32> {
    Some(21)
}

fn default_target_sdk() -> Option<u32> {
    Some(33)
}

fn default_build_tools_version() -> Option<String> {
    Some("33.0.0".to_string())
}

impl BuildConfig {
    /// Creates a configuration with the two identifying fields set and
    /// everything else defaulted.
    pub fn new(app_name: impl Into<String>, version_code: u32) -> Self {
        Self {
            app_name: app_name.into(),
            package_name: String::new(),
            version_name: String::new(),
            version_code,
            key_alias: String::new(),
            key_password: None,
            store_password: None,
            min_sdk: default_min_sdk(),
            target_sdk: default_target_sdk(),
            build_tools_version: default_build_tools_version(),
        }
    }

    /// Parses and validates the JSON text of a submission's `config` part
    pub fn from_json(text: &str) -> Result<Self, ValidationError> {
        let config: BuildConfig = serde_json::from_str(text)
            .map_err(|e| ValidationError::new(format!("Invalid build configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the identifying fields and the SDK range
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.app_name.trim().is_empty() {
            return Err(ValidationError::new("appName is required"));
        }

        if self.version_code == 0 {
            return Err(ValidationError::new(
                "versionCode is required and must be greater than 0",
            ));
        }

        if let (Some(min), Some(target)) = (self.min_sdk, self.target_sdk) {
            if min > target {
                return Err(ValidationError::new(format!(
                    "minSdk ({}) cannot be greater than targetSdk ({})",
                    min, target
                )));
            }
        }

        Ok(())
    }

    /// Human-readable label used in listings
    pub fn label(&self) -> &str {
        &self.app_name
    }

    /// Copy safe to store and echo back: secrets are masked
    pub fn redacted(&self) -> Self {
        let mask = |secret: &Option<String>| secret.as_ref().map(|_| REDACTED.to_string());

        Self {
            key_password: mask(&self.key_password),
            store_password: mask(&self.store_password),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_applies_defaults() {
        let config = BuildConfig::from_json(r#"{"appName":"Demo","versionCode":1}"#).unwrap();

        assert_eq!(config.app_name, "Demo");
        assert_eq!(config.version_code, 1);
        assert_eq!(config.min_sdk, Some(21));
        assert_eq!(config.target_sdk, Some(33));
        assert_eq!(config.build_tools_version.as_deref(), Some("33.0.0"));
        assert!(config.key_password.is_none());
    }

    #[test]
    fn test_missing_app_name_is_rejected() {
        let err = BuildConfig::from_json(r#"{"versionCode":1}"#).unwrap_err();
        assert_eq!(err.message(), "appName is required");

        let err = BuildConfig::from_json(r#"{"appName":"   ","versionCode":1}"#).unwrap_err();
        assert_eq!(err.message(), "appName is required");
    }

    #[test]
    fn test_missing_version_code_is_rejected() {
        let err = BuildConfig::from_json(r#"{"appName":"Demo"}"#).unwrap_err();
        assert!(err.message().starts_with("versionCode is required"));
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let err = BuildConfig::from_json("{not json").unwrap_err();
        assert!(err.message().starts_with("Invalid build configuration"));

        let err = BuildConfig::from_json(r#"{"appName":"Demo","versionCode":"one"}"#).unwrap_err();
        assert!(err.message().starts_with("Invalid build configuration"));
    }

    #[test]
    fn test_sdk_range_is_checked() {
        let mut config = BuildConfig::new("Demo", 1);
        config.min_sdk = Some(34);
        config.target_sdk = Some(33);
        assert!(config.validate().is_err());

        config.target_sdk = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redacted_masks_passwords_only() {
        let mut config = BuildConfig::new("Demo", 3);
        config.key_alias = "upload".to_string();
        config.key_password = Some("hunter2".to_string());
        config.store_password = Some("s3cret".to_string());

        let redacted = config.redacted();
        assert_eq!(redacted.key_password.as_deref(), Some(REDACTED));
        assert_eq!(redacted.store_password.as_deref(), Some(REDACTED));
        assert_eq!(redacted.key_alias, "upload");
        assert_eq!(redacted.version_code, 3);

        let text = serde_json::to_string(&redacted).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("s3cret"));
    }
}
