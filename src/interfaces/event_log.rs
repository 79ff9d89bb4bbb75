//! Event log interface.

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use super::PersistentSubscription;
use crate::model::{
    AppendResult, CurrentRevision, EventData, ExpectedRevision, ReadOptions, RecordedEvent,
    StreamPosition, SubscriptionSettings, SubscriptionTarget,
};

/// Result type for event log operations.
pub type Result<T> = std::result::Result<T, LogError>;

/// Lazy, finite sequence of records produced by a read.
pub type EventStream = BoxStream<'static, Result<RecordedEvent>>;

/// Errors reported by the event-log service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LogError {
    #[error("Wrong expected revision on '{stream}': expected {expected}, actual {actual}")]
    WrongExpectedRevision {
        stream: String,
        expected: ExpectedRevision,
        actual: CurrentRevision,
    },

    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("Subscription group '{group}' already exists on {target}")]
    AlreadyExists {
        target: SubscriptionTarget,
        group: String,
    },

    #[error("Subscription group '{group}' not found on {target}")]
    SubscriptionNotFound {
        target: SubscriptionTarget,
        group: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Delivery {event_id} is not in flight on this subscription")]
    StaleDelivery { event_id: Uuid },

    #[error("Subscription dropped: {0}")]
    SubscriptionDropped(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl LogError {
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, LogError::WrongExpectedRevision { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LogError::StreamNotFound(_) | LogError::SubscriptionNotFound { .. }
        )
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, LogError::AlreadyExists { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, LogError::Transport(_))
    }
}

/// Reject group settings the target cannot honour.
///
/// Prefix filters apply to `$all` only. A `$all` group starts from `Start`
/// or `End`: revisions address a single stream.
pub fn check_subscription_settings(
    target: &SubscriptionTarget,
    settings: &SubscriptionSettings,
) -> Result<()> {
    match (target, settings.start_from) {
        (SubscriptionTarget::Stream(_), _) if settings.filter.is_some() => Err(
            LogError::InvalidArgument("stream filters only apply to $all subscriptions".to_string()),
        ),
        (SubscriptionTarget::All, StreamPosition::Revision(n)) => Err(LogError::InvalidArgument(
            format!("$all subscriptions cannot start from revision {}", n),
        )),
        _ => Ok(()),
    }
}

/// Interface to the event-log service.
///
/// Implementations:
/// - `MemoryEventLog`: in-process log, the default backend
/// - `EventStoreDbLog`: EventStoreDB via the `eventstore` client (feature `eventstoredb`)
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append records to a stream if `expected` matches its current revision.
    ///
    /// Records are written atomically; either all receive contiguous
    /// revisions or none are written.
    async fn append(
        &self,
        stream: &str,
        expected: ExpectedRevision,
        events: Vec<EventData>,
    ) -> Result<AppendResult>;

    /// Read a stream.
    ///
    /// A missing stream surfaces as a `StreamNotFound` item from the
    /// returned sequence, matching how the remote service reports it.
    async fn read_stream(&self, stream: &str, options: &ReadOptions) -> Result<EventStream>;

    /// Create a persistent subscription group.
    ///
    /// Fails with `AlreadyExists` if the group is already present.
    async fn create_subscription(
        &self,
        target: &SubscriptionTarget,
        group: &str,
        settings: &SubscriptionSettings,
    ) -> Result<()>;

    /// Delete a persistent subscription group, dropping attached consumers.
    async fn delete_subscription(&self, target: &SubscriptionTarget, group: &str) -> Result<()>;

    /// Attach a consumer to an existing group.
    async fn subscribe(
        &self,
        target: &SubscriptionTarget,
        group: &str,
    ) -> Result<Box<dyn PersistentSubscription>>;
}
