//! Mock actuator for testing

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use vigil_api::NoticeKind;
use vigil_util::{ChannelId, ParticipantId};

use crate::{Actuator, ActuatorError, ActuatorResult};

/// One call received by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Notify {
        participant_id: ParticipantId,
        channel_id: ChannelId,
        kind: NoticeKind,
        message: String,
    },
    Remove {
        participant_id: ParticipantId,
        channel_id: ChannelId,
    },
}

/// Mock actuator for unit/integration testing
#[derive(Default)]
pub struct MockActuator {
    calls: Arc<Mutex<Vec<MockCall>>>,

    /// Configure notify to fail
    pub fail_notify: Arc<Mutex<bool>>,

    /// Configure remove to fail
    pub fail_remove: Arc<Mutex<bool>>,
}

impl MockActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls received so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of remove calls received
    pub fn removals(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Remove { .. }))
            .count()
    }

    /// Notice kinds received, in order
    pub fn notices(&self) -> Vec<NoticeKind> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                MockCall::Notify { kind, .. } => Some(*kind),
                MockCall::Remove { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl Actuator for MockActuator {
    async fn notify(
        &self,
        participant_id: &ParticipantId,
        channel_id: &ChannelId,
        kind: NoticeKind,
        message: &str,
    ) -> ActuatorResult<()> {
        self.calls.lock().unwrap().push(MockCall::Notify {
            participant_id: participant_id.clone(),
            channel_id: channel_id.clone(),
            kind,
            message: message.to_string(),
        });

        if *self.fail_notify.lock().unwrap() {
            return Err(ActuatorError::Undeliverable);
        }
        Ok(())
    }

    async fn remove(
        &self,
        participant_id: &ParticipantId,
        channel_id: &ChannelId,
    ) -> ActuatorResult<()> {
        self.calls.lock().unwrap().push(MockCall::Remove {
            participant_id: participant_id.clone(),
            channel_id: channel_id.clone(),
        });

        if *self.fail_remove.lock().unwrap() {
            return Err(ActuatorError::NotConnected);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_records_calls_in_order() {
        let actuator = MockActuator::new();
        let participant = ParticipantId::new("u1");
        let channel = ChannelId::new("vc");

        actuator
            .notify(&participant, &channel, NoticeKind::Removed, "bye")
            .await
            .unwrap();
        actuator.remove(&participant, &channel).await.unwrap();

        let calls = actuator.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], MockCall::Notify { message, .. } if message == "bye"));
        assert!(matches!(&calls[1], MockCall::Remove { .. }));
        assert_eq!(actuator.removals(), 1);
        assert_eq!(actuator.notices(), vec![NoticeKind::Removed]);
    }

    #[tokio::test]
    async fn mock_failure_modes() {
        let actuator = MockActuator::new();
        *actuator.fail_notify.lock().unwrap() = true;
        *actuator.fail_remove.lock().unwrap() = true;

        let participant = ParticipantId::new("u1");
        let channel = ChannelId::new("vc");

        let notify = actuator
            .notify(&participant, &channel, NoticeKind::Reminder, "hi")
            .await;
        assert!(matches!(notify, Err(ActuatorError::Undeliverable)));

        let remove = actuator.remove(&participant, &channel).await;
        assert!(matches!(remove, Err(ActuatorError::NotConnected)));

        // Failed calls are still recorded
        assert_eq!(actuator.calls().len(), 2);
    }
}
