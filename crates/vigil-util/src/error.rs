//! Error types for vigild

use thiserror::Error;

use crate::ParticipantId;

/// Core error type for vigild operations
#[derive(Debug, Error)]
pub enum VigilError {
    #[error("No session for participant: {0}")]
    NoSession(ParticipantId),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Rate limited")]
    RateLimited,
}

impl VigilError {
    pub fn permission(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, VigilError>;
