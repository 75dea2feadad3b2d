//! Configuration parsing and validation for vigild
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Enforcement delays (initial window, reminder delay, removal delay)
//! - The set of monitored channels
//! - Notice message templates
//! - Validation with clear error messages

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Policy> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Policy> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Policy::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn parse_minimal_config() {
        let config = r#"
            config_version = 1

            [[channels]]
            id = "1422274947291676672"
        "#;

        let policy = parse_config(config).unwrap();
        assert_eq!(policy.channels.len(), 1);
        assert_eq!(policy.enforcement.initial_wait, Duration::from_secs(120));
        assert_eq!(policy.enforcement.reminder_wait, Duration::from_secs(120));
        assert_eq!(
            policy.enforcement.kick_wait_after_reminder,
            Duration::from_secs(180)
        );
    }

    #[test]
    fn reject_wrong_version() {
        let config = r#"
            config_version = 99

            [[channels]]
            id = "vc"
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_config() {
        let config = r#"
            config_version = 1

            [enforcement]
            initial_wait_seconds = 0
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => {
                assert!(errors.iter().any(|e| matches!(e, ValidationError::NoChannels)));
                assert!(errors.iter().any(|e| matches!(e, ValidationError::ZeroDuration { .. })));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn reject_overflowing_delay() {
        let config = r#"
            config_version = 1

            [enforcement]
            reminder_wait_seconds = 9223372036854775807
            kick_wait_after_reminder_seconds = 9223372036854775807

            [[channels]]
            id = "vc"
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => {
                assert_eq!(errors.len(), 2);
                assert!(errors
                    .iter()
                    .all(|e| matches!(e, ValidationError::DurationTooLarge { .. })));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            config_version = 1

            [enforcement]
            initial_wait_seconds = 30

            [[channels]]
            id = "focus"
            label = "Focus room"
            "#
        )
        .unwrap();

        let policy = load_config(file.path()).unwrap();
        assert_eq!(policy.enforcement.initial_wait, Duration::from_secs(30));
        assert_eq!(policy.channels[0].label, "Focus room");
    }

    #[test]
    fn missing_file_is_read_error() {
        let result = load_config("/nonexistent/vigil/config.toml");
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
