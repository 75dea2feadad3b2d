//! Intent dispatch to the actuator

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vigil_actuator::{Actuator, ActuatorError};
use vigil_api::Intent;
use vigil_config::NoticeTemplates;
use vigil_store::{AuditEvent, AuditEventType, Store};

/// Outcome of one intent batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Carries intent batches out against the actuator.
///
/// Each batch runs on its own task, in order. Failures never reach the
/// state machine: a failed notification is only logged, and a failed
/// removal is treated as already resolved since the session is gone by the
/// time the intent exists.
#[derive(Clone)]
pub struct IntentDispatcher {
    actuator: Arc<dyn Actuator>,
    notices: Arc<NoticeTemplates>,
    store: Arc<dyn Store>,
}

impl IntentDispatcher {
    pub fn new(actuator: Arc<dyn Actuator>, notices: NoticeTemplates, store: Arc<dyn Store>) -> Self {
        Self {
            actuator,
            notices: Arc::new(notices),
            store,
        }
    }

    /// Run a batch in the background
    pub fn dispatch(&self, intents: Vec<Intent>) -> JoinHandle<DispatchReport> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.execute(intents).await })
    }

    /// Run a batch to completion, in order
    pub async fn execute(&self, intents: Vec<Intent>) -> DispatchReport {
        let mut report = DispatchReport::default();

        for intent in intents {
            match self.perform(&intent).await {
                Ok(()) => {
                    debug!(?intent, "Intent delivered");
                    report.delivered += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    self.record_failure(&intent, &e);
                }
            }
        }

        report
    }

    async fn perform(&self, intent: &Intent) -> Result<(), ActuatorError> {
        match intent {
            Intent::Notify {
                participant_id,
                channel_id,
                kind,
            } => {
                let message = self.notices.render(*kind);
                self.actuator
                    .notify(participant_id, channel_id, *kind, message)
                    .await
            }
            Intent::Remove {
                participant_id,
                channel_id,
            } => self.actuator.remove(participant_id, channel_id).await,
        }
    }

    fn record_failure(&self, intent: &Intent, error: &ActuatorError) {
        let participant_id = intent.participant_id();
        let channel_id = intent.channel_id();

        match intent {
            Intent::Notify { kind, .. } => {
                warn!(
                    participant_id = %participant_id,
                    channel_id = %channel_id,
                    ?kind,
                    error = %error,
                    "Notification not delivered"
                );
            }
            Intent::Remove { .. } => {
                info!(
                    participant_id = %participant_id,
                    channel_id = %channel_id,
                    error = %error,
                    "Removal failed; treating participant as already gone"
                );
            }
        }

        let label = match intent {
            Intent::Notify { .. } => "notify",
            Intent::Remove { .. } => "remove",
        };
        let audit = AuditEvent::new(AuditEventType::IntentFailed {
            participant_id: participant_id.clone(),
            channel_id: channel_id.clone(),
            intent: label.to_string(),
            error: error.to_string(),
        });
        if let Err(e) = self.store.append_audit(audit) {
            warn!(error = %e, "Failed to append audit event");
        }
    }
}
