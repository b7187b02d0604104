//! Publisher error taxonomy.

use thiserror::Error;

use census_core::MessageId;

use crate::event_type::EventType;
use crate::payload::PayloadKind;

/// Converting between a payload and a serialised envelope failed.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("envelope JSON for {event_type} could not be parsed: {source}")]
    Malformed {
        event_type: EventType,
        #[source]
        source: serde_json::Error,
    },

    #[error("no builder registered for {0}")]
    NoBuilder(EventType),
}

/// Failure of an [`crate::EventPublisher`] call.
///
/// Validation failures (`IncompatiblePayload`, `UnsupportedEventType`,
/// `InvalidJsonPayload`) are raised before any IO.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("payload {actual} is incompatible with event type {event_type} (expected {expected})")]
    IncompatiblePayload {
        event_type: EventType,
        expected: PayloadKind,
        actual: PayloadKind,
    },

    #[error("unsupported event type: {0}")]
    UnsupportedEventType(EventType),

    #[error("JSON payload for {event_type} could not be parsed: {source}")]
    InvalidJsonPayload {
        event_type: EventType,
        #[source]
        source: serde_json::Error,
    },

    /// The transport failed and no backup store is configured.
    #[error("failed to send event: {0}")]
    Send(#[source] anyhow::Error),

    /// The transport failed and so did the backup store.
    #[error("failed to send event {message_id} ({send}) and failed to back it up ({persist})")]
    BackupFailed {
        message_id: MessageId,
        send: anyhow::Error,
        #[source]
        persist: anyhow::Error,
    },

    /// A stored backup could not be turned back into an event.
    #[error("backup record {message_id} is malformed: {source}")]
    MalformedBackup {
        message_id: String,
        #[source]
        source: BuildError,
    },
}

impl PublishError {
    /// True for failures detected before any IO was attempted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PublishError::IncompatiblePayload { .. }
                | PublishError::UnsupportedEventType(_)
                | PublishError::InvalidJsonPayload { .. }
        )
    }
}
