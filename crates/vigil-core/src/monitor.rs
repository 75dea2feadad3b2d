//! Compliance monitor
//!
//! Owns one [`ParticipantSession`] per participant occupying a monitored
//! channel. Every mutation of a participant's session, whether from an
//! incoming notification or from a timer that woke up, happens under that
//! participant's slot mutex. Different participants never contend.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use vigil_api::{
    API_VERSION, Intent, MonitorStateSnapshot, NoticeKind, Presence, SessionEndReason,
    SessionInfo, SessionPhase, StateChange, TimerRole,
};
use vigil_config::{EnforcementPolicy, Policy};
use vigil_store::{AuditEvent, AuditEventType, Store};
use vigil_util::{ChannelId, ParticipantId, TimerId, VigilError};

use crate::{CoreEvent, ParticipantSession, TimerHandle, Transition, Trigger, is_compliant};

/// Primitive event decoded from a state-change notification
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    /// Left the monitored channel it was in
    Leave { reason: SessionEndReason },
    /// Entered a monitored channel
    Join { channel: ChannelId, presence: Presence },
    /// Stayed in a monitored channel; presence may have changed
    Stay {
        channel: ChannelId,
        before: Presence,
        after: Presence,
    },
}

/// Per-participant exclusivity cell.
///
/// A slot is retired (and unlinked from the table) while its mutex is held
/// as soon as it no longer holds a session. Anyone who locks a retired slot
/// must look the participant up again.
#[derive(Debug, Default)]
struct SessionSlot {
    session: Option<ParticipantSession>,
    retired: bool,
}

type SlotRef = Arc<Mutex<SessionSlot>>;

struct MonitorInner {
    enforcement: EnforcementPolicy,
    monitored: HashSet<ChannelId>,
    sessions: DashMap<ParticipantId, SlotRef>,
    store: Arc<dyn Store>,
    events: mpsc::UnboundedSender<CoreEvent>,
    timer_tasks: TaskTracker,
    closed: AtomicBool,
}

/// The compliance monitor. Cheap to clone; clones share state.
///
/// Must be used from within a tokio runtime, since transitions spawn timer
/// tasks.
#[derive(Clone)]
pub struct ComplianceMonitor {
    inner: Arc<MonitorInner>,
}

impl ComplianceMonitor {
    /// Create a new monitor. Delays and the monitored channel set are read
    /// from `policy` once and never change afterwards.
    pub fn new(
        policy: &Policy,
        store: Arc<dyn Store>,
    ) -> (Self, mpsc::UnboundedReceiver<CoreEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let monitored = policy.monitored_channel_ids();

        info!(
            channel_count = monitored.len(),
            initial_wait_secs = policy.enforcement.initial_wait.as_secs(),
            reminder_wait_secs = policy.enforcement.reminder_wait.as_secs(),
            kick_wait_after_reminder_secs = policy.enforcement.kick_wait_after_reminder.as_secs(),
            "Compliance monitor initialized"
        );

        let inner = MonitorInner {
            enforcement: policy.enforcement,
            monitored,
            sessions: DashMap::new(),
            store,
            events,
            timer_tasks: TaskTracker::new(),
            closed: AtomicBool::new(false),
        };

        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// Feed one raw platform notification into the state machine.
    ///
    /// The notification is decomposed into ordered primitive steps (leave,
    /// then join, or an in-channel presence change) which are applied under
    /// the participant's exclusivity. Returns the transitions applied.
    pub fn on_state_change(&self, change: StateChange) -> Vec<Transition> {
        let inner = &self.inner;
        let steps = inner.decompose(&change);
        if steps.is_empty() {
            debug!(
                participant_id = %change.participant_id,
                "Notification does not involve a monitored channel"
            );
            return Vec::new();
        }

        let participant_id = change.participant_id;
        inner.with_slot(&participant_id, |slot| {
            let mut transitions = Vec::new();
            if inner.closed.load(Ordering::SeqCst) {
                warn!(participant_id = %participant_id, "Monitor is shut down; notification ignored");
                return transitions;
            }
            for step in steps {
                inner.apply(&participant_id, slot, step, &mut transitions);
            }
            transitions
        })
    }

    /// Current session of a participant
    pub fn session(&self, participant_id: &ParticipantId) -> vigil_util::Result<SessionInfo> {
        self.inner
            .read_session(participant_id, ParticipantSession::to_info)
            .ok_or_else(|| VigilError::NoSession(participant_id.clone()))
    }

    /// Roles of the participant's outstanding timers (empty if no session)
    pub fn pending_timer_roles(&self, participant_id: &ParticipantId) -> Vec<TimerRole> {
        self.inner
            .read_session(participant_id, |s| s.timers.roles())
            .unwrap_or_default()
    }

    /// Snapshot of every live session, ordered by participant
    pub fn snapshot(&self) -> MonitorStateSnapshot {
        let mut sessions: Vec<SessionInfo> = self
            .inner
            .all_slots()
            .into_iter()
            .filter_map(|(_, slot)| {
                let guard = slot.lock();
                let info = if guard.retired {
                    None
                } else {
                    guard.session.as_ref().map(ParticipantSession::to_info)
                };
                info
            })
            .collect();
        sessions.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));

        let mut monitored_channels: Vec<ChannelId> =
            self.inner.monitored.iter().cloned().collect();
        monitored_channels.sort();

        MonitorStateSnapshot {
            api_version: API_VERSION,
            monitored_channels,
            sessions,
        }
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Outstanding timer handles across all sessions
    pub fn pending_timer_count(&self) -> usize {
        self.inner
            .all_slots()
            .into_iter()
            .map(|(_, slot)| {
                let guard = slot.lock();
                let count = guard.session.as_ref().map_or(0, |s| s.timers.len());
                count
            })
            .sum()
    }

    /// Timer tasks still running (sleeping or about to exit)
    pub fn live_timer_tasks(&self) -> usize {
        self.inner.timer_tasks.len()
    }

    /// Close every session (reason `Shutdown`), cancel every timer and wait
    /// for the timer tasks to exit. Later notifications are ignored.
    pub async fn shutdown(&self) -> Vec<Transition> {
        let inner = &self.inner;
        let mut transitions = Vec::new();
        if inner.closed.swap(true, Ordering::SeqCst) {
            return transitions;
        }

        for (participant_id, slot) in inner.all_slots() {
            let mut guard = slot.lock();
            if guard.retired {
                continue;
            }
            if let Some(session) = guard.session.take() {
                inner.close(session, Trigger::Shutdown, SessionEndReason::Shutdown, &mut transitions);
            }
            inner.retire(&participant_id, &slot, &mut guard);
        }

        inner.timer_tasks.close();
        inner.timer_tasks.wait().await;

        info!(closed = transitions.len(), "Compliance monitor stopped");
        transitions
    }
}

impl MonitorInner {
    fn monitored_channel<'a>(&self, channel: Option<&'a ChannelId>) -> Option<&'a ChannelId> {
        channel.filter(|c| self.monitored.contains(*c))
    }

    /// Split a notification into ordered primitive steps
    fn decompose(&self, change: &StateChange) -> Vec<Step> {
        let previous = change.previous_channel.as_ref();
        let next = change.new_channel.as_ref();
        let mut steps = Vec::new();

        if previous != next {
            let entering = self.monitored_channel(next);
            if self.monitored_channel(previous).is_some() {
                let reason = if entering.is_some() {
                    SessionEndReason::Moved
                } else {
                    SessionEndReason::Left
                };
                steps.push(Step::Leave { reason });
            }
            if let Some(channel) = entering {
                steps.push(Step::Join {
                    channel: channel.clone(),
                    presence: change.new_presence,
                });
            }
        } else if let Some(channel) = self.monitored_channel(next) {
            steps.push(Step::Stay {
                channel: channel.clone(),
                before: change.previous_presence,
                after: change.new_presence,
            });
        }

        steps
    }

    fn all_slots(&self) -> Vec<(ParticipantId, SlotRef)> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    fn slot(&self, participant_id: &ParticipantId) -> Option<SlotRef> {
        self.sessions
            .get(participant_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn read_session<R>(
        &self,
        participant_id: &ParticipantId,
        f: impl FnOnce(&ParticipantSession) -> R,
    ) -> Option<R> {
        let slot = self.slot(participant_id)?;
        let guard = slot.lock();
        if guard.retired {
            return None;
        }
        let result = guard.session.as_ref().map(f);
        result
    }

    /// Run `f` with exclusive access to the participant's slot, creating it
    /// if needed. The slot is retired afterwards if it ends up empty.
    fn with_slot<R>(
        &self,
        participant_id: &ParticipantId,
        f: impl FnOnce(&mut SessionSlot) -> R,
    ) -> R {
        loop {
            // Table guards are released before any slot is locked
            let existing = self.slot(participant_id);
            let slot = match existing {
                Some(slot) => slot,
                None => match self.sessions.entry(participant_id.clone()) {
                    Entry::Occupied(entry) => Arc::clone(entry.get()),
                    Entry::Vacant(entry) => {
                        let fresh = SlotRef::default();
                        entry.insert(Arc::clone(&fresh));
                        fresh
                    }
                },
            };

            let mut guard = slot.lock();
            if guard.retired {
                continue;
            }

            let result = f(&mut *guard);
            if guard.session.is_none() {
                self.retire(participant_id, &slot, &mut guard);
            }
            return result;
        }
    }

    fn retire(&self, participant_id: &ParticipantId, slot: &SlotRef, guard: &mut SessionSlot) {
        guard.retired = true;
        self.sessions
            .remove_if(participant_id, |_, current| Arc::ptr_eq(current, slot));
    }

    fn apply(
        self: &Arc<Self>,
        participant_id: &ParticipantId,
        slot: &mut SessionSlot,
        step: Step,
        out: &mut Vec<Transition>,
    ) {
        match step {
            Step::Leave { reason } => {
                if let Some(session) = slot.session.take() {
                    self.close(session, Trigger::Left, reason, out);
                }
            }
            Step::Join { channel, presence } => {
                if let Some(session) = slot.session.take() {
                    debug!(
                        participant_id = %participant_id,
                        "Join while a session exists; replacing it"
                    );
                    self.close(session, Trigger::Joined, SessionEndReason::Replaced, out);
                }
                slot.session = Some(self.open(participant_id, channel, presence, Trigger::Joined, out));
            }
            Step::Stay {
                channel,
                before,
                after,
            } => {
                let elsewhere = slot
                    .session
                    .as_ref()
                    .is_some_and(|s| s.channel_id != channel);
                if elsewhere && let Some(session) = slot.session.take() {
                    self.close(session, Trigger::Left, SessionEndReason::Moved, out);
                }

                if slot.session.is_none() {
                    // Already in the channel without a session, e.g. present
                    // before the daemon started
                    slot.session = Some(self.open(participant_id, channel, before, Trigger::Adopted, out));
                }
                if let Some(session) = slot.session.as_mut() {
                    self.toggle(session, before, after, out);
                }
            }
        }
    }

    fn open(
        self: &Arc<Self>,
        participant_id: &ParticipantId,
        channel: ChannelId,
        presence: Presence,
        trigger: Trigger,
        out: &mut Vec<Transition>,
    ) -> ParticipantSession {
        let phase = if is_compliant(&presence) {
            SessionPhase::Compliant
        } else {
            SessionPhase::Observing
        };

        let mut session = ParticipantSession::new(participant_id.clone(), channel, phase, presence);
        let mut transition = Transition::new(participant_id, &session.channel_id, trigger, None);
        transition.to = Some(phase);

        if phase == SessionPhase::Observing {
            self.arm(
                &mut session,
                TimerRole::Initial,
                self.enforcement.initial_wait,
                &mut transition,
            );
        }

        self.record(transition, out);
        session
    }

    /// Apply a presence update to an existing session.
    ///
    /// The session's phase decides the transition, not the notification's
    /// `before` snapshot, which may be stale or duplicated. `before` only
    /// distinguishes a fresh drop from an unrelated update while the
    /// participant is already in the grace window.
    fn toggle(
        self: &Arc<Self>,
        session: &mut ParticipantSession,
        before: Presence,
        after: Presence,
        out: &mut Vec<Transition>,
    ) {
        session.observe(after);
        let active = is_compliant(&after);
        let dropped = is_compliant(&before) && !active;

        let trigger = if active {
            Trigger::PresenceOn
        } else {
            Trigger::PresenceOff
        };
        let mut transition = Transition::new(
            &session.participant_id,
            &session.channel_id,
            trigger,
            Some(session.phase),
        );

        match (session.phase, active) {
            (SessionPhase::Observing | SessionPhase::GraceWarned, true) => {
                transition.timers_cancelled = session.timers.cancel_all();
                session.enter(SessionPhase::Compliant);
            }
            (SessionPhase::Compliant, false) => self.start_grace(session, &mut transition),
            // Each fresh drop restarts the grace/kick pair
            (SessionPhase::GraceWarned, false) if dropped => {
                self.start_grace(session, &mut transition)
            }
            _ => return,
        }

        transition.to = Some(session.phase);
        self.record(transition, out);
    }

    fn start_grace(self: &Arc<Self>, session: &mut ParticipantSession, transition: &mut Transition) {
        session.enter(SessionPhase::GraceWarned);
        self.arm(
            session,
            TimerRole::Grace,
            self.enforcement.reminder_wait,
            transition,
        );
        self.arm(
            session,
            TimerRole::Kick,
            self.enforcement.kick_delay(),
            transition,
        );
    }

    /// Schedule a timer for `role`, replacing any handle already holding it
    fn arm(
        self: &Arc<Self>,
        session: &mut ParticipantSession,
        role: TimerRole,
        delay: Duration,
        transition: &mut Transition,
    ) {
        let (handle, trigger) = TimerHandle::arm(role, delay);
        let timer_id = handle.id();
        let monitor = Arc::downgrade(self);
        let participant_id = session.participant_id.clone();

        self.timer_tasks.spawn(async move {
            if !trigger.expired().await {
                return;
            }
            if let Some(monitor) = monitor.upgrade() {
                monitor.on_timer_fired(&participant_id, trigger.role(), trigger.id());
            }
        });

        transition
            .timers_cancelled
            .extend(session.timers.install(handle));
        transition.timers_started.push(role);

        debug!(
            participant_id = %session.participant_id,
            ?role,
            %timer_id,
            delay_secs = delay.as_secs(),
            "Timer armed"
        );
    }

    fn on_timer_fired(&self, participant_id: &ParticipantId, role: TimerRole, timer_id: TimerId) {
        let Some(slot) = self.slot(participant_id) else {
            debug!(participant_id = %participant_id, %timer_id, "Timer fired after session ended");
            return;
        };

        let mut guard = slot.lock();
        if guard.retired {
            debug!(participant_id = %participant_id, %timer_id, "Timer fired after session ended");
            return;
        }

        let claimed = guard
            .session
            .as_mut()
            .and_then(|s| s.timers.take_matching(role, timer_id))
            .is_some_and(|handle| handle.try_fire());
        if !claimed {
            debug!(participant_id = %participant_id, ?role, %timer_id, "Stale timer ignored");
            return;
        }

        self.fire(&mut guard.session, role);
        if guard.session.is_none() {
            self.retire(participant_id, &slot, &mut guard);
        }
    }

    /// Apply a claimed timer, re-validating presence as it stands now.
    /// Nobody awaits a timer, so the transition is only published.
    fn fire(&self, slot_session: &mut Option<ParticipantSession>, role: TimerRole) {
        let Some(session) = slot_session.as_mut() else {
            return;
        };

        let mut transition = Transition::new(
            &session.participant_id,
            &session.channel_id,
            Trigger::TimerFired(role),
            Some(session.phase),
        );

        if is_compliant(&session.presence) {
            // Presence came back after the timer was scheduled
            transition.timers_cancelled = session.timers.cancel_all();
            session.enter(SessionPhase::Compliant);
            transition.to = Some(SessionPhase::Compliant);
            self.publish(&transition);
            return;
        }

        match role {
            TimerRole::Grace => {
                session.enter(SessionPhase::GraceWarned);
                transition.to = Some(SessionPhase::GraceWarned);
                transition.intents.push(Intent::Notify {
                    participant_id: session.participant_id.clone(),
                    channel_id: session.channel_id.clone(),
                    kind: NoticeKind::Reminder,
                });
            }
            TimerRole::Initial | TimerRole::Kick => {
                let notice = if role == TimerRole::Initial {
                    NoticeKind::Initial
                } else {
                    NoticeKind::Removed
                };
                transition.intents = vec![
                    Intent::Notify {
                        participant_id: session.participant_id.clone(),
                        channel_id: session.channel_id.clone(),
                        kind: notice,
                    },
                    Intent::Remove {
                        participant_id: session.participant_id.clone(),
                        channel_id: session.channel_id.clone(),
                    },
                ];
                transition.timers_cancelled = session.timers.cancel_all();
                transition.to = None;
                transition.closed = Some(SessionEndReason::Removed { notice });
                *slot_session = None;
            }
        }

        self.publish(&transition);
    }

    fn close(
        &self,
        mut session: ParticipantSession,
        trigger: Trigger,
        reason: SessionEndReason,
        out: &mut Vec<Transition>,
    ) {
        let mut transition = Transition::new(
            &session.participant_id,
            &session.channel_id,
            trigger,
            Some(session.phase),
        );
        transition.timers_cancelled = session.timers.cancel_all();
        transition.to = None;
        transition.closed = Some(reason);
        self.record(transition, out);
    }

    fn record(&self, transition: Transition, out: &mut Vec<Transition>) {
        self.publish(&transition);
        out.push(transition);
    }

    /// Log, emit and audit one transition. Called with the slot held so
    /// per-participant ordering is preserved.
    fn publish(&self, t: &Transition) {
        let participant_id = &t.participant_id;
        let channel_id = &t.channel_id;

        match (t.from, t.to) {
            (None, Some(phase)) => {
                info!(
                    participant_id = %participant_id,
                    channel_id = %channel_id,
                    ?phase,
                    trigger = ?t.trigger,
                    "Session opened"
                );
                self.emit(CoreEvent::SessionOpened {
                    participant_id: participant_id.clone(),
                    channel_id: channel_id.clone(),
                    phase,
                });
                self.audit(AuditEventType::SessionOpened {
                    participant_id: participant_id.clone(),
                    channel_id: channel_id.clone(),
                    phase,
                });
            }
            (Some(from), Some(to)) if from != to => {
                info!(
                    participant_id = %participant_id,
                    channel_id = %channel_id,
                    ?from,
                    ?to,
                    trigger = ?t.trigger,
                    "Phase changed"
                );
                self.emit(CoreEvent::PhaseChanged {
                    participant_id: participant_id.clone(),
                    channel_id: channel_id.clone(),
                    from,
                    to,
                });
                self.audit(AuditEventType::PhaseChanged {
                    participant_id: participant_id.clone(),
                    channel_id: channel_id.clone(),
                    from,
                    to,
                });
            }
            _ => {}
        }

        if !t.timers_started.is_empty() || !t.timers_cancelled.is_empty() {
            debug!(
                participant_id = %participant_id,
                started = ?t.timers_started,
                cancelled = ?t.timers_cancelled,
                "Timers updated"
            );
        }

        if !t.intents.is_empty() {
            match t.closed {
                Some(SessionEndReason::Removed { notice }) => {
                    info!(
                        participant_id = %participant_id,
                        channel_id = %channel_id,
                        ?notice,
                        "Removal issued"
                    );
                    self.audit(AuditEventType::RemovalIssued {
                        participant_id: participant_id.clone(),
                        channel_id: channel_id.clone(),
                        notice,
                    });
                }
                _ => {
                    info!(
                        participant_id = %participant_id,
                        channel_id = %channel_id,
                        "Reminder issued"
                    );
                    self.audit(AuditEventType::ReminderIssued {
                        participant_id: participant_id.clone(),
                        channel_id: channel_id.clone(),
                    });
                }
            }
            self.emit(CoreEvent::Enforce {
                participant_id: participant_id.clone(),
                channel_id: channel_id.clone(),
                intents: t.intents.clone(),
            });
        }

        if let Some(reason) = t.closed {
            info!(
                participant_id = %participant_id,
                channel_id = %channel_id,
                ?reason,
                "Session closed"
            );
            self.emit(CoreEvent::SessionClosed {
                participant_id: participant_id.clone(),
                channel_id: channel_id.clone(),
                reason,
            });
            self.audit(AuditEventType::SessionClosed {
                participant_id: participant_id.clone(),
                channel_id: channel_id.clone(),
                reason,
            });
        }
    }

    fn emit(&self, event: CoreEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to append audit event");
        }
    }
}
