//! Integration tests for vigild
//!
//! These tests drive the monitor, dispatcher and store together, the way the
//! daemon wires them, with a mock actuator standing in for the bridge.

use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc;
use vigil_actuator::{MockActuator, MockCall};
use vigil_api::{NoticeKind, Presence, SessionEndReason, SessionPhase, StateChange};
use vigil_config::{Policy, load_config, parse_config};
use vigil_core::{ComplianceMonitor, CoreEvent, DispatchReport, IntentDispatcher};
use vigil_store::{AuditEventType, SqliteStore, Store};
use vigil_util::ParticipantId;

const CONFIG: &str = r#"
config_version = 1

[enforcement]
initial_wait_seconds = 60
reminder_wait_seconds = 30
kick_wait_after_reminder_seconds = 45

[notices]
reminder = "Camera back on, please."

[[channels]]
id = "1422274947291676672"
label = "Focus room"
"#;

const FOCUS: &str = "1422274947291676672";

struct Harness {
    monitor: ComplianceMonitor,
    events: mpsc::UnboundedReceiver<CoreEvent>,
    dispatcher: IntentDispatcher,
    actuator: Arc<MockActuator>,
    store: Arc<SqliteStore>,
}

impl Harness {
    fn new(policy: &Policy) -> Self {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let actuator = Arc::new(MockActuator::new());
        let dispatcher =
            IntentDispatcher::new(actuator.clone(), policy.notices.clone(), store.clone());
        let (monitor, events) = ComplianceMonitor::new(policy, store.clone());

        Self {
            monitor,
            events,
            dispatcher,
            actuator,
            store,
        }
    }

    /// Let virtual time pass, then run every emitted intent batch the way
    /// the daemon's event loop does
    async fn advance(&mut self, duration: Duration) -> DispatchReport {
        tokio::time::sleep(duration).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        let mut total = DispatchReport::default();
        while let Ok(event) = self.events.try_recv() {
            if let CoreEvent::Enforce { intents, .. } = event {
                let report = self.dispatcher.execute(intents).await;
                total.delivered += report.delivered;
                total.failed += report.failed;
            }
        }
        total
    }
}

#[test]
fn config_round_trip_from_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, CONFIG).unwrap();

    let policy = load_config(&path).unwrap();
    assert_eq!(policy.channels.len(), 1);
    assert_eq!(policy.channels[0].label, "Focus room");
    assert_eq!(policy.enforcement.kick_delay(), Duration::from_secs(75));
    assert_eq!(policy.notices.render(NoticeKind::Reminder), "Camera back on, please.");
}

#[tokio::test(start_paused = true)]
async fn silent_joiner_is_notified_then_removed() {
    let policy = parse_config(CONFIG).unwrap();
    let mut harness = Harness::new(&policy);

    harness
        .monitor
        .on_state_change(StateChange::join("42", FOCUS, Presence::OFF));

    let report = harness.advance(Duration::from_secs(61)).await;
    assert_eq!(report.delivered, 2);

    let calls = harness.actuator.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(
        &calls[0],
        MockCall::Notify { kind: NoticeKind::Initial, message, .. } if message.contains("allowed time")
    ));
    assert!(matches!(&calls[1], MockCall::Remove { participant_id, .. } if participant_id.as_str() == "42"));

    assert_eq!(harness.monitor.session_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn reminder_then_removal_after_presence_drop() {
    let policy = parse_config(CONFIG).unwrap();
    let mut harness = Harness::new(&policy);

    harness
        .monitor
        .on_state_change(StateChange::join("42", FOCUS, Presence::screen_share()));
    harness.monitor.on_state_change(StateChange::presence(
        "42",
        FOCUS,
        Presence::screen_share(),
        Presence::OFF,
    ));

    harness.advance(Duration::from_secs(31)).await;
    assert_eq!(harness.actuator.notices(), vec![NoticeKind::Reminder]);
    assert_eq!(harness.actuator.removals(), 0);

    harness.advance(Duration::from_secs(45)).await;
    assert_eq!(
        harness.actuator.notices(),
        vec![NoticeKind::Reminder, NoticeKind::Removed]
    );
    assert_eq!(harness.actuator.removals(), 1);

    let audits = harness
        .store
        .get_participant_audits(&ParticipantId::new("42"), 50)
        .unwrap();
    assert!(audits
        .iter()
        .any(|a| matches!(a.event, AuditEventType::ReminderIssued { .. })));
    assert!(audits.iter().any(|a| matches!(
        a.event,
        AuditEventType::SessionClosed {
            reason: SessionEndReason::Removed {
                notice: NoticeKind::Removed
            },
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn failed_removal_leaves_state_clean() {
    let policy = parse_config(CONFIG).unwrap();
    let mut harness = Harness::new(&policy);
    *harness.actuator.fail_remove.lock().unwrap() = true;

    harness
        .monitor
        .on_state_change(StateChange::join("42", FOCUS, Presence::OFF));
    let report = harness.advance(Duration::from_secs(61)).await;

    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(harness.monitor.session_count(), 0);
    assert_eq!(harness.monitor.pending_timer_count(), 0);

    // The participant is still there as far as the platform is concerned;
    // the next notification adopts them again
    harness.monitor.on_state_change(StateChange::presence(
        "42",
        FOCUS,
        Presence::OFF,
        Presence::camera(),
    ));
    let info = harness.monitor.session(&ParticipantId::new("42")).unwrap();
    assert_eq!(info.phase, SessionPhase::Compliant);
}

#[tokio::test(start_paused = true)]
async fn non_monitored_channels_are_ignored() {
    let policy = parse_config(CONFIG).unwrap();
    let mut harness = Harness::new(&policy);

    let transitions = harness
        .monitor
        .on_state_change(StateChange::join("42", "lobby", Presence::OFF));
    assert!(transitions.is_empty());

    harness.advance(Duration::from_secs(600)).await;
    assert!(harness.actuator.calls().is_empty());
    assert_eq!(harness.monitor.snapshot().sessions.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn audit_log_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("vigild.db");
    let policy = parse_config(CONFIG).unwrap();

    {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&db_path).unwrap());
        let (monitor, _events) = ComplianceMonitor::new(&policy, store);
        monitor.on_state_change(StateChange::join("42", FOCUS, Presence::camera()));
        monitor.shutdown().await;
    }

    let store = SqliteStore::open(&db_path).unwrap();
    let audits = store
        .get_participant_audits(&ParticipantId::new("42"), 10)
        .unwrap();
    assert_eq!(audits.len(), 2);
    // Newest first
    assert!(matches!(
        audits[0].event,
        AuditEventType::SessionClosed {
            reason: SessionEndReason::Shutdown,
            ..
        }
    ));
    assert!(matches!(
        audits[1].event,
        AuditEventType::SessionOpened {
            phase: SessionPhase::Compliant,
            ..
        }
    ));
}
