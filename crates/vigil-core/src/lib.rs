//! Compliance monitor and enforcement state machine for vigild
//!
//! This crate is the heart of vigild, containing:
//! - Activity evaluation (is a presence snapshot compliant?)
//! - Per-participant session state machine (Observing / GraceWarned / Compliant)
//! - Cancellable enforcement timers with fire-time re-validation
//! - Intent dispatch to the actuator

mod dispatch;
mod evaluator;
mod events;
mod monitor;
mod session;
mod timer;

pub use dispatch::*;
pub use evaluator::*;
pub use events::*;
pub use monitor::*;
pub use session::*;
pub use timer::*;
