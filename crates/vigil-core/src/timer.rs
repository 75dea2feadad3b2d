//! Enforcement timer handles
//!
//! A timer is split in two halves. The [`TimerHandle`] lives in the session
//! and is the only thing that can cancel or claim the timer. The
//! [`TimerTrigger`] is moved into the sleeping task and only knows how to
//! wait. Cancel and fire race on one atomic claim cell; whichever side wins
//! the compare-and-swap acts, and the other does nothing.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vigil_api::TimerRole;
use vigil_util::{MonotonicInstant, TimerId};

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Claim state of a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Pending,
    Fired,
    Cancelled,
}

impl TimerState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            FIRED => TimerState::Fired,
            CANCELLED => TimerState::Cancelled,
            _ => TimerState::Pending,
        }
    }
}

/// Owning half of a scheduled timer, stored in the session
#[derive(Debug)]
pub struct TimerHandle {
    id: TimerId,
    role: TimerRole,
    deadline: Option<MonotonicInstant>,
    state: Arc<AtomicU8>,
    token: CancellationToken,
}

/// Sleeping half of a scheduled timer, moved into the timer task
#[derive(Debug)]
pub struct TimerTrigger {
    id: TimerId,
    role: TimerRole,
    delay: Duration,
    state: Arc<AtomicU8>,
    token: CancellationToken,
}

impl TimerHandle {
    /// Create a new pending timer for `role` that expires after `delay`
    pub fn arm(role: TimerRole, delay: Duration) -> (TimerHandle, TimerTrigger) {
        let id = TimerId::from_raw(NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed));
        let state = Arc::new(AtomicU8::new(PENDING));
        let token = CancellationToken::new();

        let handle = TimerHandle {
            id,
            role,
            deadline: MonotonicInstant::now().checked_add(delay),
            state: Arc::clone(&state),
            token: token.clone(),
        };
        let trigger = TimerTrigger {
            id,
            role,
            delay,
            state,
            token,
        };
        (handle, trigger)
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn role(&self) -> TimerRole {
        self.role
    }

    pub fn state(&self) -> TimerState {
        TimerState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn is_pending(&self) -> bool {
        self.state() == TimerState::Pending
    }

    /// Wall-clock independent deadline, for diagnostics. `None` when the
    /// delay is too far out to represent; the timer then never fires.
    pub fn deadline(&self) -> Option<MonotonicInstant> {
        self.deadline
    }

    /// Cancel the timer. Returns false if it had already fired or been
    /// cancelled, in which case nothing changes.
    pub fn cancel(&self) -> bool {
        let won = self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        // Wake the sleeping task either way so it exits promptly
        self.token.cancel();
        won
    }

    /// Claim the timer for firing. Returns false if it was cancelled first.
    pub fn try_fire(&self) -> bool {
        self.state
            .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl TimerTrigger {
    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn role(&self) -> TimerRole {
        self.role
    }

    /// Sleep until the deadline. Returns false if the timer was cancelled
    /// before the deadline was reached.
    pub async fn expired(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(self.delay) => {
                self.state.load(Ordering::Acquire) == PENDING
            }
        }
    }
}

/// Outstanding timers of one session, at most one per role.
///
/// The `Initial` role never coexists with `Grace` or `Kick`: installing one
/// side cancels the other.
#[derive(Debug, Default)]
pub struct PendingTimers {
    initial: Option<TimerHandle>,
    grace: Option<TimerHandle>,
    kick: Option<TimerHandle>,
}

impl PendingTimers {
    fn slot(&self, role: TimerRole) -> &Option<TimerHandle> {
        match role {
            TimerRole::Initial => &self.initial,
            TimerRole::Grace => &self.grace,
            TimerRole::Kick => &self.kick,
        }
    }

    fn slot_mut(&mut self, role: TimerRole) -> &mut Option<TimerHandle> {
        match role {
            TimerRole::Initial => &mut self.initial,
            TimerRole::Grace => &mut self.grace,
            TimerRole::Kick => &mut self.kick,
        }
    }

    pub fn get(&self, role: TimerRole) -> Option<&TimerHandle> {
        self.slot(role).as_ref()
    }

    /// Install a handle, cancelling whatever held its role (and any
    /// conflicting role). Returns the roles that were cancelled.
    pub fn install(&mut self, handle: TimerHandle) -> Vec<TimerRole> {
        let mut cancelled = Vec::new();
        let conflicting: &[TimerRole] = match handle.role() {
            TimerRole::Initial => &[TimerRole::Grace, TimerRole::Kick],
            TimerRole::Grace | TimerRole::Kick => &[TimerRole::Initial],
        };
        for role in conflicting {
            if self.cancel(*role) {
                cancelled.push(*role);
            }
        }

        let role = handle.role();
        if let Some(previous) = self.slot_mut(role).replace(handle) {
            previous.cancel();
            cancelled.push(role);
        }
        cancelled
    }

    /// Cancel and drop the handle for `role`. Returns true if one existed.
    pub fn cancel(&mut self, role: TimerRole) -> bool {
        match self.slot_mut(role).take() {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every outstanding timer. Returns the roles that were cancelled.
    pub fn cancel_all(&mut self) -> Vec<TimerRole> {
        [TimerRole::Initial, TimerRole::Grace, TimerRole::Kick]
            .into_iter()
            .filter(|role| self.cancel(*role))
            .collect()
    }

    /// Remove the handle for `role` only if it is the timer identified by `id`
    pub fn take_matching(&mut self, role: TimerRole, id: TimerId) -> Option<TimerHandle> {
        let slot = self.slot_mut(role);
        if slot.as_ref().is_some_and(|h| h.id() == id) {
            slot.take()
        } else {
            None
        }
    }

    /// Roles with an outstanding handle, in role order
    pub fn roles(&self) -> Vec<TimerRole> {
        [TimerRole::Initial, TimerRole::Grace, TimerRole::Kick]
            .into_iter()
            .filter(|role| self.slot(*role).is_some())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.roles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
