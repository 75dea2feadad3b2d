//! Actuator traits

use async_trait::async_trait;
use thiserror::Error;
use vigil_api::NoticeKind;
use vigil_util::{ChannelId, ParticipantId};

/// Errors from actuator operations
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("No platform bridge connected")]
    NoBridge,

    #[error("Participant cannot receive direct messages")]
    Undeliverable,

    #[error("Participant is not connected")]
    NotConnected,
}

pub type ActuatorResult<T> = Result<T, ActuatorError>;

/// Performs enforcement side effects against the platform
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Deliver a direct notification to the participant
    async fn notify(
        &self,
        participant_id: &ParticipantId,
        channel_id: &ChannelId,
        kind: NoticeKind,
        message: &str,
    ) -> ActuatorResult<()>;

    /// Forcibly disconnect the participant from the channel
    async fn remove(
        &self,
        participant_id: &ParticipantId,
        channel_id: &ChannelId,
    ) -> ActuatorResult<()>;
}
