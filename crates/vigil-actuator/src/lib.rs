//! Enforcement actuator interface for vigild
//!
//! This crate defines the boundary between the compliance monitor and
//! whatever carries its intents out against the chat platform. It contains
//! no platform code itself.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
