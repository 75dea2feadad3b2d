//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Global service settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Enforcement delays
    #[serde(default)]
    pub enforcement: RawEnforcement,

    /// Notice message overrides
    #[serde(default)]
    pub notices: RawNotices,

    /// Monitored channels
    #[serde(default)]
    pub channels: Vec<RawChannel>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/vigild/vigild.sock)
    pub socket_path: Option<PathBuf>,

    /// Data directory for the audit store
    pub data_dir: Option<PathBuf>,
}

/// Enforcement delays, in seconds
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawEnforcement {
    /// Time allowed after joining without presence (T1)
    pub initial_wait_seconds: Option<u64>,

    /// Delay from presence dropping to the reminder (T2)
    pub reminder_wait_seconds: Option<u64>,

    /// Additional delay from the reminder to removal (T3)
    pub kick_wait_after_reminder_seconds: Option<u64>,
}

/// Notice text shown to participants
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawNotices {
    pub initial: Option<String>,
    pub reminder: Option<String>,
    pub removed: Option<String>,
}

/// A monitored channel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawChannel {
    /// Platform channel ID
    pub id: String,

    /// Display label (defaults to the ID)
    pub label: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_schema() {
        let toml_str = r#"
            config_version = 1

            [service]
            socket_path = "/tmp/vigild-test/vigild.sock"

            [enforcement]
            initial_wait_seconds = 60
            reminder_wait_seconds = 90
            kick_wait_after_reminder_seconds = 120

            [notices]
            reminder = "Camera back on, please"

            [[channels]]
            id = "111"
            label = "Deep work"

            [[channels]]
            id = "222"
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.enforcement.reminder_wait_seconds, Some(90));
        assert_eq!(config.notices.reminder.as_deref(), Some("Camera back on, please"));
        assert!(config.notices.initial.is_none());
        assert!(config.channels[1].label.is_none());
    }

    #[test]
    fn sections_are_optional() {
        let config: RawConfig = toml::from_str("config_version = 1").unwrap();
        assert!(config.channels.is_empty());
        assert!(config.service.socket_path.is_none());
        assert!(config.enforcement.initial_wait_seconds.is_none());
    }
}
