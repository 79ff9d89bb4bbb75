//! Value types shared by the gateway, producer and consumer.
//!
//! These mirror the collaborator's data model: streams of immutable
//! records addressed by zero-based revision, expected-revision tokens for
//! optimistic concurrency, and persistent subscription groups that hand out
//! acknowledgeable deliveries.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the cross-stream view.
pub const ALL_STREAM: &str = "$all";
/// Content type for JSON payloads.
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// Content type for opaque binary payloads.
pub const CONTENT_TYPE_BINARY: &str = "application/octet-stream";

/// Optimistic-concurrency precondition for an append.
///
/// `Exact(n)` names the revision of the last event currently in the
/// stream, so a stream holding three events is at `Exact(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpectedRevision {
    /// The stream must not exist yet.
    NoStream,
    /// The stream's last event must be at this revision.
    Exact(u64),
    /// The stream must already exist, at any revision.
    StreamExists,
    /// No check.
    Any,
}

impl ExpectedRevision {
    /// Whether an append under this token is allowed against `current`.
    pub fn matches(&self, current: CurrentRevision) -> bool {
        match (self, current) {
            (ExpectedRevision::Any, _) => true,
            (ExpectedRevision::NoStream, CurrentRevision::NoStream) => true,
            (ExpectedRevision::StreamExists, CurrentRevision::Current(_)) => true,
            (ExpectedRevision::Exact(n), CurrentRevision::Current(c)) => *n == c,
            _ => false,
        }
    }
}

impl fmt::Display for ExpectedRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedRevision::NoStream => write!(f, "no-stream"),
            ExpectedRevision::Exact(n) => write!(f, "{}", n),
            ExpectedRevision::StreamExists => write!(f, "stream-exists"),
            ExpectedRevision::Any => write!(f, "any"),
        }
    }
}

/// Actual state of a stream when an append was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurrentRevision {
    NoStream,
    Current(u64),
}

impl CurrentRevision {
    /// The token that would succeed against this state.
    pub fn as_expected(&self) -> ExpectedRevision {
        match self {
            CurrentRevision::NoStream => ExpectedRevision::NoStream,
            CurrentRevision::Current(n) => ExpectedRevision::Exact(*n),
        }
    }
}

impl fmt::Display for CurrentRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrentRevision::NoStream => write!(f, "no-stream"),
            CurrentRevision::Current(n) => write!(f, "{}", n),
        }
    }
}

/// An event proposed for append.
#[derive(Debug, Clone, PartialEq)]
pub struct EventData {
    pub id: Uuid,
    pub event_type: String,
    pub content_type: String,
    pub data: Bytes,
    pub metadata: Bytes,
}

impl EventData {
    /// Serialize `payload` as JSON under the given type tag.
    pub fn json<T: Serialize>(
        event_type: impl Into<String>,
        payload: &T,
    ) -> serde_json::Result<Self> {
        let data = serde_json::to_vec(payload)?;
        Ok(Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            content_type: CONTENT_TYPE_JSON.to_string(),
            data: Bytes::from(data),
            metadata: Bytes::new(),
        })
    }

    /// Wrap opaque bytes under the given type tag.
    pub fn binary(event_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            content_type: CONTENT_TYPE_BINARY.to_string(),
            data: data.into(),
            metadata: Bytes::new(),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<Bytes>) -> Self {
        self.metadata = metadata.into();
        self
    }
}

/// An event as stored in the log. Immutable once appended.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub id: Uuid,
    pub stream: String,
    /// Zero-based position within `stream`.
    pub revision: u64,
    /// Commit position in the `$all` view.
    pub position: u64,
    pub event_type: String,
    pub content_type: String,
    pub data: Bytes,
    pub metadata: Bytes,
    pub created: DateTime<Utc>,
}

impl RecordedEvent {
    pub fn is_json(&self) -> bool {
        self.content_type == CONTENT_TYPE_JSON
    }
}

/// Outcome of a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResult {
    /// Revision assigned to the last appended record.
    pub next_expected_revision: u64,
    /// Commit position of the last appended record.
    pub position: u64,
}

/// Read direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forwards,
    Backwards,
}

/// Where a read or a subscription group starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamPosition {
    #[default]
    Start,
    End,
    Revision(u64),
}

/// Options for reading a single stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    pub position: StreamPosition,
    pub direction: Direction,
    pub max_count: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            position: StreamPosition::Start,
            direction: Direction::Forwards,
            max_count: usize::MAX,
        }
    }
}

impl ReadOptions {
    pub fn position(mut self, position: StreamPosition) -> Self {
        self.position = position;
        self
    }

    pub fn forwards(mut self) -> Self {
        self.direction = Direction::Forwards;
        self
    }

    pub fn backwards(mut self) -> Self {
        self.direction = Direction::Backwards;
        self
    }

    pub fn max_count(mut self, max_count: usize) -> Self {
        self.max_count = max_count;
        self
    }
}

/// What a persistent subscription group is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionTarget {
    /// A single named stream.
    Stream(String),
    /// The cross-stream `$all` view, optionally filtered at group creation.
    All,
}

impl SubscriptionTarget {
    pub fn stream(name: impl Into<String>) -> Self {
        SubscriptionTarget::Stream(name.into())
    }
}

impl fmt::Display for SubscriptionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionTarget::Stream(name) => write!(f, "{}", name),
            SubscriptionTarget::All => write!(f, "{}", ALL_STREAM),
        }
    }
}

/// Stream-name prefix filter for `$all` groups.
///
/// An empty prefix list matches every stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamFilter {
    pub prefixes: Vec<String>,
}

impl StreamFilter {
    pub fn prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn add_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    pub fn matches(&self, stream: &str) -> bool {
        self.prefixes.is_empty() || self.prefixes.iter().any(|p| stream.starts_with(p.as_str()))
    }
}

/// Default number of redeliveries before an event is parked.
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 10;

/// Settings applied when a subscription group is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSettings {
    pub start_from: StreamPosition,
    /// Only valid for [`SubscriptionTarget::All`].
    pub filter: Option<StreamFilter>,
    pub max_retry_count: u32,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            start_from: StreamPosition::Start,
            filter: None,
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
        }
    }
}

impl SubscriptionSettings {
    pub fn start_from(mut self, position: StreamPosition) -> Self {
        self.start_from = position;
        self
    }

    pub fn filter(mut self, filter: StreamFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn max_retry_count(mut self, count: u32) -> Self {
        self.max_retry_count = count;
        self
    }
}

/// A delivered event awaiting acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub event: RecordedEvent,
    /// Zero on first delivery, incremented on each redelivery.
    pub retry_count: u32,
}

impl Delivery {
    pub fn event_id(&self) -> Uuid {
        self.event.id
    }
}

/// Item yielded by a persistent subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    EventAppeared(Delivery),
    /// Terminal. No further items follow.
    Dropped { cause: String },
}

/// What the server should do with a negatively acknowledged delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackAction {
    /// Redeliver later.
    Retry,
    /// Treat as handled without processing.
    Skip,
    /// Move out of rotation.
    Park,
}
