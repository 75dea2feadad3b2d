//! Configuration validation

use crate::schema::{RawConfig, RawEnforcement};
use std::collections::HashSet;
use thiserror::Error;

/// Longest accepted enforcement delay (one week)
pub const MAX_DELAY_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Channel '{channel_id}': {message}")]
    ChannelError { channel_id: String, message: String },

    #[error("Duplicate channel ID: {0}")]
    DuplicateChannelId(String),

    #[error("No monitored channels configured")]
    NoChannels,

    #[error("Enforcement delay '{field}' must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("Enforcement delay '{field}' cannot exceed {max} seconds")]
    DurationTooLarge { field: &'static str, max: u64 },

    #[error("Notice '{kind}' cannot be empty")]
    EmptyNotice { kind: &'static str },
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.channels.is_empty() {
        errors.push(ValidationError::NoChannels);
    }

    let mut seen_ids = HashSet::new();
    for channel in &config.channels {
        let id = channel.id.trim();
        if id.is_empty() {
            errors.push(ValidationError::ChannelError {
                channel_id: channel.id.clone(),
                message: "id cannot be empty".into(),
            });
            continue;
        }
        if !seen_ids.insert(id) {
            errors.push(ValidationError::DuplicateChannelId(id.to_string()));
        }
    }

    errors.extend(validate_enforcement(&config.enforcement));

    let notices = [
        ("initial", &config.notices.initial),
        ("reminder", &config.notices.reminder),
        ("removed", &config.notices.removed),
    ];
    for (kind, text) in notices {
        if let Some(text) = text
            && text.trim().is_empty()
        {
            errors.push(ValidationError::EmptyNotice { kind });
        }
    }

    errors
}

fn validate_enforcement(raw: &RawEnforcement) -> Vec<ValidationError> {
    let fields = [
        ("initial_wait_seconds", raw.initial_wait_seconds),
        ("reminder_wait_seconds", raw.reminder_wait_seconds),
        (
            "kick_wait_after_reminder_seconds",
            raw.kick_wait_after_reminder_seconds,
        ),
    ];

    fields
        .into_iter()
        .filter_map(|(field, value)| match value? {
            0 => Some(ValidationError::ZeroDuration { field }),
            v if v > MAX_DELAY_SECONDS => Some(ValidationError::DurationTooLarge {
                field,
                max: MAX_DELAY_SECONDS,
            }),
            _ => None,
        })
        .collect()
}
