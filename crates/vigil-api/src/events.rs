//! Event types for vigild -> client streaming

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use vigil_util::{ChannelId, ParticipantId};

use crate::{NoticeKind, SessionEndReason, SessionPhase, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: vigil_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A participant entered a monitored channel
    SessionOpened {
        participant_id: ParticipantId,
        channel_id: ChannelId,
        phase: SessionPhase,
    },

    /// A session moved between phases
    PhaseChanged {
        participant_id: ParticipantId,
        channel_id: ChannelId,
        from: SessionPhase,
        to: SessionPhase,
    },

    /// A session was destroyed
    SessionClosed {
        participant_id: ParticipantId,
        channel_id: ChannelId,
        reason: SessionEndReason,
    },

    /// Bridge should deliver a direct message to the participant
    Notify {
        participant_id: ParticipantId,
        channel_id: ChannelId,
        kind: NoticeKind,
        message: String,
    },

    /// Bridge should disconnect the participant from the channel
    Remove {
        participant_id: ParticipantId,
        channel_id: ChannelId,
    },

    /// Service is shutting down
    Shutdown,
}
