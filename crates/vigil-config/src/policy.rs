//! Validated policy structures

use crate::schema::{RawChannel, RawConfig, RawEnforcement, RawNotices, RawServiceConfig};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use vigil_api::NoticeKind;
use vigil_util::{ChannelId, default_data_dir, default_socket_path, format_duration_words};

const DEFAULT_INITIAL_WAIT_SECS: u64 = 120;
const DEFAULT_REMINDER_WAIT_SECS: u64 = 120;
const DEFAULT_KICK_WAIT_AFTER_REMINDER_SECS: u64 = 180;

/// Validated policy, read once at startup and immutable afterwards
#[derive(Debug, Clone)]
pub struct Policy {
    /// Service configuration
    pub service: ServiceConfig,

    /// Enforcement delays
    pub enforcement: EnforcementPolicy,

    /// Participant-facing notice text
    pub notices: NoticeTemplates,

    /// Monitored channels
    pub channels: Vec<MonitoredChannel>,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let enforcement = EnforcementPolicy::from_raw(&raw.enforcement);
        let notices = NoticeTemplates::from_raw(raw.notices, &enforcement);

        Self {
            service: ServiceConfig::from_raw(raw.service),
            enforcement,
            notices,
            channels: raw.channels.into_iter().map(MonitoredChannel::from_raw).collect(),
        }
    }

    /// Check whether a channel is subject to the presence policy
    pub fn is_monitored(&self, channel_id: &ChannelId) -> bool {
        self.channels.iter().any(|c| &c.id == channel_id)
    }

    /// Get monitored channel by ID
    pub fn get_channel(&self, channel_id: &ChannelId) -> Option<&MonitoredChannel> {
        self.channels.iter().find(|c| &c.id == channel_id)
    }

    /// Set of monitored channel IDs
    pub fn monitored_channel_ids(&self) -> HashSet<ChannelId> {
        self.channels.iter().map(|c| c.id.clone()).collect()
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw.socket_path.unwrap_or_else(default_socket_path),
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            data_dir: default_data_dir(),
        }
    }
}

/// Delays driving the enforcement timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnforcementPolicy {
    /// T1: window after joining without presence before removal
    pub initial_wait: Duration,
    /// T2: delay from presence dropping to the reminder
    pub reminder_wait: Duration,
    /// T3: additional delay from the reminder to removal
    pub kick_wait_after_reminder: Duration,
}

impl EnforcementPolicy {
    fn from_raw(raw: &RawEnforcement) -> Self {
        Self {
            initial_wait: Duration::from_secs(
                raw.initial_wait_seconds.unwrap_or(DEFAULT_INITIAL_WAIT_SECS),
            ),
            reminder_wait: Duration::from_secs(
                raw.reminder_wait_seconds.unwrap_or(DEFAULT_REMINDER_WAIT_SECS),
            ),
            kick_wait_after_reminder: Duration::from_secs(
                raw.kick_wait_after_reminder_seconds
                    .unwrap_or(DEFAULT_KICK_WAIT_AFTER_REMINDER_SECS),
            ),
        }
    }

    /// Delay from presence dropping to removal (T2 + T3)
    pub fn kick_delay(&self) -> Duration {
        self.reminder_wait.saturating_add(self.kick_wait_after_reminder)
    }
}

impl Default for EnforcementPolicy {
    fn default() -> Self {
        Self::from_raw(&RawEnforcement::default())
    }
}

/// Notice text per notice kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeTemplates {
    pub initial: String,
    pub reminder: String,
    pub removed: String,
}

impl NoticeTemplates {
    fn from_raw(raw: RawNotices, enforcement: &EnforcementPolicy) -> Self {
        let defaults = Self::defaults(enforcement);
        Self {
            initial: raw.initial.unwrap_or(defaults.initial),
            reminder: raw.reminder.unwrap_or(defaults.reminder),
            removed: raw.removed.unwrap_or(defaults.removed),
        }
    }

    /// Built-in notice text for the given delays
    pub fn defaults(enforcement: &EnforcementPolicy) -> Self {
        Self {
            initial: "You were removed from the voice channel because you didn't enable \
                      camera or stream within the allowed time."
                .into(),
            reminder: format!(
                "You turned off your stream/camera. Please re-enable it within {}, \
                 or you may be removed.",
                format_duration_words(enforcement.kick_wait_after_reminder)
            ),
            removed: "You were removed because your stream/camera stayed off after the \
                      reminder period."
                .into(),
        }
    }

    /// Text for a notice kind
    pub fn render(&self, kind: NoticeKind) -> &str {
        match kind {
            NoticeKind::Initial => &self.initial,
            NoticeKind::Reminder => &self.reminder,
            NoticeKind::Removed => &self.removed,
        }
    }
}

/// A channel subject to the presence policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredChannel {
    pub id: ChannelId,
    pub label: String,
}

impl MonitoredChannel {
    fn from_raw(raw: RawChannel) -> Self {
        let id = raw.id.trim().to_string();
        Self {
            label: raw.label.unwrap_or_else(|| id.clone()),
            id: ChannelId::new(id),
        }
    }
}
