//! Audit event types

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use vigil_api::{NoticeKind, SessionEndReason, SessionPhase};
use vigil_util::{ChannelId, ParticipantId};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted { channel_count: usize },

    /// Service stopped
    ServiceStopped,

    /// Participant entered a monitored channel
    SessionOpened {
        participant_id: ParticipantId,
        channel_id: ChannelId,
        phase: SessionPhase,
    },

    /// Session phase changed
    PhaseChanged {
        participant_id: ParticipantId,
        channel_id: ChannelId,
        from: SessionPhase,
        to: SessionPhase,
    },

    /// Reminder notice issued
    ReminderIssued {
        participant_id: ParticipantId,
        channel_id: ChannelId,
    },

    /// Removal issued
    RemovalIssued {
        participant_id: ParticipantId,
        channel_id: ChannelId,
        notice: NoticeKind,
    },

    /// Session destroyed
    SessionClosed {
        participant_id: ParticipantId,
        channel_id: ChannelId,
        reason: SessionEndReason,
    },

    /// Actuator could not carry out an intent
    IntentFailed {
        participant_id: ParticipantId,
        channel_id: ChannelId,
        intent: String,
        error: String,
    },

    /// Client connected
    ClientConnected {
        client_id: String,
        role: String,
        uid: Option<u32>,
    },

    /// Client disconnected
    ClientDisconnected { client_id: String },
}

impl AuditEventType {
    /// Participant this event concerns, if any
    pub fn participant_id(&self) -> Option<&ParticipantId> {
        match self {
            AuditEventType::SessionOpened { participant_id, .. }
            | AuditEventType::PhaseChanged { participant_id, .. }
            | AuditEventType::ReminderIssued { participant_id, .. }
            | AuditEventType::RemovalIssued { participant_id, .. }
            | AuditEventType::SessionClosed { participant_id, .. }
            | AuditEventType::IntentFailed { participant_id, .. } => Some(participant_id),
            AuditEventType::ServiceStarted { .. }
            | AuditEventType::ServiceStopped
            | AuditEventType::ClientConnected { .. }
            | AuditEventType::ClientDisconnected { .. } => None,
        }
    }
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: vigil_util::now(),
            event,
        }
    }
}
