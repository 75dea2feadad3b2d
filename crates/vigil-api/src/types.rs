//! Shared types for the vigild API

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use vigil_util::{ChannelId, ParticipantId};
use std::time::Duration;

/// Visual-presence flags reported by the platform for one participant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    /// Camera (self video) is on
    #[serde(default)]
    pub camera: bool,
    /// Screen share (self stream) is on
    #[serde(default)]
    pub screen_share: bool,
}

impl Presence {
    /// Neither camera nor screen share
    pub const OFF: Presence = Presence {
        camera: false,
        screen_share: false,
    };

    pub fn camera() -> Self {
        Self {
            camera: true,
            screen_share: false,
        }
    }

    pub fn screen_share() -> Self {
        Self {
            camera: false,
            screen_share: true,
        }
    }
}

/// One raw voice-state notification from the platform.
///
/// A single notification may bundle several logical changes, e.g. leaving a
/// channel while also turning the camera off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub participant_id: ParticipantId,
    /// Channel occupied before the change (None = not connected)
    pub previous_channel: Option<ChannelId>,
    /// Channel occupied after the change (None = disconnected)
    pub new_channel: Option<ChannelId>,
    #[serde(default)]
    pub previous_presence: Presence,
    #[serde(default)]
    pub new_presence: Presence,
}

impl StateChange {
    /// Participant connects to `channel` from nowhere
    pub fn join(
        participant_id: impl Into<ParticipantId>,
        channel: impl Into<ChannelId>,
        presence: Presence,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            previous_channel: None,
            new_channel: Some(channel.into()),
            previous_presence: Presence::OFF,
            new_presence: presence,
        }
    }

    /// Participant disconnects from `channel`
    pub fn leave(
        participant_id: impl Into<ParticipantId>,
        channel: impl Into<ChannelId>,
        presence: Presence,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            previous_channel: Some(channel.into()),
            new_channel: None,
            previous_presence: presence,
            new_presence: Presence::OFF,
        }
    }

    /// Participant moves between two channels
    pub fn moved(
        participant_id: impl Into<ParticipantId>,
        from: impl Into<ChannelId>,
        to: impl Into<ChannelId>,
        presence: Presence,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            previous_channel: Some(from.into()),
            new_channel: Some(to.into()),
            previous_presence: presence,
            new_presence: presence,
        }
    }

    /// Participant toggles presence without changing channel
    pub fn presence(
        participant_id: impl Into<ParticipantId>,
        channel: impl Into<ChannelId>,
        before: Presence,
        after: Presence,
    ) -> Self {
        let channel = channel.into();
        Self {
            participant_id: participant_id.into(),
            previous_channel: Some(channel.clone()),
            new_channel: Some(channel),
            previous_presence: before,
            new_presence: after,
        }
    }
}

/// Phase of a participant session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Just joined without presence; the initial window is running
    Observing,
    /// Presence dropped after being active; reminder and removal windows running
    GraceWarned,
    /// Presence active; no timers running
    Compliant,
}

/// Role of a scheduled enforcement timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerRole {
    /// Removal deadline after joining without presence (T1)
    Initial,
    /// Reminder after presence dropped (T2)
    Grace,
    /// Removal deadline after presence dropped (T2 + T3)
    Kick,
}

/// Kind of direct notification sent to a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Removed because presence was never enabled in the initial window
    Initial,
    /// Presence has been off for the reminder delay
    Reminder,
    /// Removed because presence stayed off after the reminder
    Removed,
}

/// A requested side effect against the platform. Emission does not
/// guarantee delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    Notify {
        participant_id: ParticipantId,
        channel_id: ChannelId,
        kind: NoticeKind,
    },
    Remove {
        participant_id: ParticipantId,
        channel_id: ChannelId,
    },
}

impl Intent {
    pub fn participant_id(&self) -> &ParticipantId {
        match self {
            Intent::Notify { participant_id, .. } | Intent::Remove { participant_id, .. } => {
                participant_id
            }
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        match self {
            Intent::Notify { channel_id, .. } | Intent::Remove { channel_id, .. } => channel_id,
        }
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, Intent::Remove { .. })
    }
}

/// Why a session was destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEndReason {
    /// Participant disconnected or moved to a non-monitored channel
    Left,
    /// Participant moved to a different monitored channel
    Moved,
    /// Remove intent issued
    Removed { notice: NoticeKind },
    /// A new join arrived while the session still existed
    Replaced,
    /// Daemon shutdown
    Shutdown,
}

/// Session information for clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub participant_id: ParticipantId,
    pub channel_id: ChannelId,
    pub phase: SessionPhase,
    pub presence: Presence,
    pub pending_timers: Vec<TimerRole>,
    pub joined_at: DateTime<Local>,
    pub last_evaluated_at: DateTime<Local>,
    pub time_in_phase: Duration,
}

/// Snapshot of every tracked session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStateSnapshot {
    pub api_version: u32,
    pub monitored_channels: Vec<ChannelId>,
    pub sessions: Vec<SessionInfo>,
}

/// Role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Bridge or local admin - can push state changes and read the audit log
    Admin,
    /// Read-only observer
    Observer,
}

impl ClientRole {
    pub fn can_push_state(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }

    pub fn can_read_audit(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub actuator_ok: bool,
    pub store_ok: bool,
    pub session_count: usize,
}
