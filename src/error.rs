//! Crate-level error taxonomy.
//!
//! Gateway failures arrive as [`LogError`]; conversion lifts the two
//! outcomes callers routinely branch on (revision conflicts and missing
//! streams) into their own variants and wraps everything else.

use uuid::Uuid;

use crate::interfaces::LogError;
use crate::model::{CurrentRevision, ExpectedRevision};

/// Result type for producer and consumer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by consumer handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Concurrency conflict on '{stream}': expected {expected}, actual {actual}")]
    ConcurrencyConflict {
        stream: String,
        expected: ExpectedRevision,
        actual: CurrentRevision,
    },

    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("Unrecognized event type '{event_type}' at {stream}@{revision}")]
    UnrecognizedEventType {
        event_type: String,
        stream: String,
        revision: u64,
    },

    #[error("Failed to decode '{event_type}' at {stream}@{revision}")]
    Decode {
        event_type: String,
        stream: String,
        revision: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Subscription '{group}' dropped: {cause}")]
    SubscriptionDropped { group: String, cause: String },

    #[error("Failed to acknowledge event {event_id} on '{group}'")]
    AckFailed {
        group: String,
        event_id: Uuid,
        #[source]
        source: LogError,
    },

    #[error("Handler failed for event {event_id}")]
    Handler {
        event_id: Uuid,
        #[source]
        source: HandlerError,
    },

    #[error(transparent)]
    Log(LogError),
}

impl Error {
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Error::ConcurrencyConflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::StreamNotFound(_) => true,
            Error::Log(e) => e.is_not_found(),
            _ => false,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::Log(e) if e.is_already_exists())
    }
}

impl From<LogError> for Error {
    fn from(error: LogError) -> Self {
        match error {
            LogError::WrongExpectedRevision {
                stream,
                expected,
                actual,
            } => Error::ConcurrencyConflict {
                stream,
                expected,
                actual,
            },
            LogError::StreamNotFound(stream) => Error::StreamNotFound(stream),
            other => Error::Log(other),
        }
    }
}
