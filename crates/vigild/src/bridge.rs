//! Actuator backed by the platform bridge
//!
//! vigild never talks to the chat platform itself. The bridge process
//! subscribes to the event stream and carries out `Notify` and `Remove`
//! events; this actuator just publishes them.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use vigil_actuator::{Actuator, ActuatorError, ActuatorResult};
use vigil_api::{Event, EventPayload, NoticeKind};
use vigil_ipc::IpcServer;
use vigil_util::{ChannelId, ParticipantId};

pub struct BridgeActuator {
    ipc: Arc<IpcServer>,
}

impl BridgeActuator {
    pub fn new(ipc: Arc<IpcServer>) -> Self {
        Self { ipc }
    }

    async fn publish(&self, payload: EventPayload) -> ActuatorResult<()> {
        if self.ipc.subscriber_count().await == 0 {
            return Err(ActuatorError::NoBridge);
        }
        self.ipc.broadcast_event(Event::new(payload));
        Ok(())
    }
}

#[async_trait]
impl Actuator for BridgeActuator {
    async fn notify(
        &self,
        participant_id: &ParticipantId,
        channel_id: &ChannelId,
        kind: NoticeKind,
        message: &str,
    ) -> ActuatorResult<()> {
        debug!(participant_id = %participant_id, ?kind, "Publishing notice");
        self.publish(EventPayload::Notify {
            participant_id: participant_id.clone(),
            channel_id: channel_id.clone(),
            kind,
            message: message.to_string(),
        })
        .await
    }

    async fn remove(
        &self,
        participant_id: &ParticipantId,
        channel_id: &ChannelId,
    ) -> ActuatorResult<()> {
        debug!(participant_id = %participant_id, channel_id = %channel_id, "Publishing removal");
        self.publish(EventPayload::Remove {
            participant_id: participant_id.clone(),
            channel_id: channel_id.clone(),
        })
        .await
    }
}
