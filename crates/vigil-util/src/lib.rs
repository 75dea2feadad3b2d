//! Shared utilities for vigild
//!
//! This crate provides:
//! - ID types (ParticipantId, ChannelId, ClientId, TimerId)
//! - Time utilities (wall clock, monotonic instants)
//! - Error types
//! - Rate limiting helpers
//! - Default paths for socket, data, and config

mod error;
mod ids;
mod paths;
mod rate_limit;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
