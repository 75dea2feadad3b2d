//! Activity evaluation

use vigil_api::Presence;

/// A snapshot is compliant if the camera or the screen share is on.
///
/// Pure and side-effect free; called both when notifications arrive and when
/// timers re-validate at fire time.
pub fn is_compliant(presence: &Presence) -> bool {
    presence.camera || presence.screen_share
}
