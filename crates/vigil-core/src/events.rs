//! Core events and transition records emitted by the monitor

use vigil_api::{Intent, SessionEndReason, SessionPhase, TimerRole};
use vigil_util::{ChannelId, ParticipantId};

/// Events emitted by the compliance monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
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

    /// Ordered intents to carry out against the platform
    Enforce {
        participant_id: ParticipantId,
        channel_id: ChannelId,
        intents: Vec<Intent>,
    },

    /// Session destroyed, all its timers cancelled
    SessionClosed {
        participant_id: ParticipantId,
        channel_id: ChannelId,
        reason: SessionEndReason,
    },
}

/// What caused a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Entered a monitored channel
    Joined,
    /// Already in a monitored channel without a session
    Adopted,
    /// Left or moved out of the channel
    Left,
    /// Presence became compliant
    PresenceOn,
    /// Presence stopped being compliant
    PresenceOff,
    /// A timer fired and was claimed
    TimerFired(TimerRole),
    /// Daemon shutting down
    Shutdown,
}

/// One applied state-machine step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub participant_id: ParticipantId,
    pub channel_id: ChannelId,
    pub trigger: Trigger,

    /// Phase before the step (None = no session)
    pub from: Option<SessionPhase>,

    /// Phase after the step (None = session destroyed)
    pub to: Option<SessionPhase>,

    pub timers_started: Vec<TimerRole>,
    pub timers_cancelled: Vec<TimerRole>,
    pub intents: Vec<Intent>,

    /// Set when the step destroyed the session
    pub closed: Option<SessionEndReason>,
}

impl Transition {
    pub(crate) fn new(
        participant_id: &ParticipantId,
        channel_id: &ChannelId,
        trigger: Trigger,
        from: Option<SessionPhase>,
    ) -> Self {
        Self {
            participant_id: participant_id.clone(),
            channel_id: channel_id.clone(),
            trigger,
            from,
            to: from,
            timers_started: Vec::new(),
            timers_cancelled: Vec::new(),
            intents: Vec::new(),
            closed: None,
        }
    }
}
