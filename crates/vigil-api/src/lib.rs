//! Protocol types for vigild
//!
//! This crate defines the stable API between vigild and its clients
//! (the platform bridge and observers):
//! - Presence snapshots and state-change notifications
//! - Enforcement intents
//! - Commands (requests from clients) and responses
//! - Events (service -> clients)
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
