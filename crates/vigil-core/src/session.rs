//! Participant session state

use chrono::{DateTime, Local};
use vigil_api::{Presence, SessionInfo, SessionPhase};
use vigil_util::{ChannelId, MonotonicInstant, ParticipantId};

use crate::PendingTimers;

/// One participant occupying one monitored channel
#[derive(Debug)]
pub struct ParticipantSession {
    pub participant_id: ParticipantId,

    /// Monitored channel currently occupied
    pub channel_id: ChannelId,

    /// Current phase
    pub phase: SessionPhase,

    /// Outstanding enforcement timers
    pub timers: PendingTimers,

    /// Most recent presence reported for the participant
    pub presence: Presence,

    /// Wall-clock join time (for display)
    pub joined_at: DateTime<Local>,

    /// Wall-clock time of the last transition or re-validation
    pub last_evaluated_at: DateTime<Local>,

    /// Monotonic time the current phase was entered
    phase_entered_at: MonotonicInstant,
}

impl ParticipantSession {
    pub fn new(
        participant_id: ParticipantId,
        channel_id: ChannelId,
        phase: SessionPhase,
        presence: Presence,
    ) -> Self {
        let now = vigil_util::now();
        Self {
            participant_id,
            channel_id,
            phase,
            timers: PendingTimers::default(),
            presence,
            joined_at: now,
            last_evaluated_at: now,
            phase_entered_at: MonotonicInstant::now(),
        }
    }

    /// Move to `phase`. Returns the previous phase.
    pub fn enter(&mut self, phase: SessionPhase) -> SessionPhase {
        let previous = self.phase;
        if previous != phase {
            self.phase = phase;
            self.phase_entered_at = MonotonicInstant::now();
        }
        self.last_evaluated_at = vigil_util::now();
        previous
    }

    /// Record a fresh presence snapshot
    pub fn observe(&mut self, presence: Presence) {
        self.presence = presence;
        self.last_evaluated_at = vigil_util::now();
    }

    pub fn to_info(&self) -> SessionInfo {
        SessionInfo {
            participant_id: self.participant_id.clone(),
            channel_id: self.channel_id.clone(),
            phase: self.phase,
            presence: self.presence,
            pending_timers: self.timers.roles(),
            joined_at: self.joined_at,
            last_evaluated_at: self.last_evaluated_at,
            time_in_phase: self.phase_entered_at.elapsed(),
        }
    }
}
