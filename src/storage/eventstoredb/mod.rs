//! EventStoreDB implementation of the event log interface.
//!
//! Streams map one-to-one onto server streams. Stream groups use the
//! stream persistent-subscription API; `$all` groups use the `_to_all`
//! variants with a stream-name prefix filter.

use async_trait::async_trait;
use bytes::Bytes;
use eventstore::{
    AppendToStreamOptions, Client, ClientSettings, DeletePersistentSubscriptionOptions, NakAction,
    PersistentSubscriptionOptions, PersistentSubscriptionToAllOptions, Position,
    ReadStreamOptions, SubscribeToPersistentSubscriptionOptions, SubscriptionFilter,
};
use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::interfaces::{
    check_subscription_settings, EventLog, EventStream, LogError, PersistentSubscription, Result,
};
use crate::model::{
    AppendResult, CurrentRevision, Delivery, Direction, EventData, ExpectedRevision, NackAction,
    ReadOptions, RecordedEvent, StreamPosition, SubscriptionEvent, SubscriptionSettings,
    SubscriptionTarget,
};

/// Cause reported after the client closed its own handle.
const CLOSED_BY_CLIENT: &str = "subscription closed by client";

fn transport(error: eventstore::Error) -> LogError {
    LogError::Transport(error.to_string())
}

fn expected_revision(expected: ExpectedRevision) -> eventstore::ExpectedRevision {
    match expected {
        ExpectedRevision::NoStream => eventstore::ExpectedRevision::NoStream,
        ExpectedRevision::Exact(n) => eventstore::ExpectedRevision::Exact(n),
        ExpectedRevision::StreamExists => eventstore::ExpectedRevision::StreamExists,
        ExpectedRevision::Any => eventstore::ExpectedRevision::Any,
    }
}

fn current_revision(current: eventstore::CurrentRevision) -> CurrentRevision {
    match current {
        eventstore::CurrentRevision::NoStream => CurrentRevision::NoStream,
        eventstore::CurrentRevision::Current(n) => CurrentRevision::Current(n),
    }
}

fn stream_position(position: StreamPosition) -> eventstore::StreamPosition<u64> {
    match position {
        StreamPosition::Start => eventstore::StreamPosition::Start,
        StreamPosition::End => eventstore::StreamPosition::End,
        StreamPosition::Revision(n) => eventstore::StreamPosition::Position(n),
    }
}

fn all_position(position: StreamPosition) -> eventstore::StreamPosition<Position> {
    match position {
        StreamPosition::Start => eventstore::StreamPosition::Start,
        StreamPosition::End => eventstore::StreamPosition::End,
        // Rejected by check_subscription_settings before reaching the server.
        StreamPosition::Revision(_) => eventstore::StreamPosition::Start,
    }
}

fn to_server_event(event: EventData) -> Result<eventstore::EventData> {
    let data = if event.content_type == crate::model::CONTENT_TYPE_JSON {
        let payload: serde_json::Value = serde_json::from_slice(&event.data)
            .map_err(|e| LogError::InvalidArgument(format!("invalid JSON payload: {}", e)))?;
        eventstore::EventData::json(event.event_type, payload)
            .map_err(|e| LogError::InvalidArgument(e.to_string()))?
    } else {
        eventstore::EventData::binary(event.event_type, event.data)
    };

    let data = data.id(event.id);
    Ok(if event.metadata.is_empty() {
        data
    } else {
        data.metadata(event.metadata)
    })
}

fn from_server_event(event: &eventstore::RecordedEvent) -> RecordedEvent {
    let content_type = if event.is_json {
        crate::model::CONTENT_TYPE_JSON
    } else {
        crate::model::CONTENT_TYPE_BINARY
    };
    RecordedEvent {
        id: event.id,
        stream: event.stream_id.clone(),
        revision: event.revision,
        position: event.position.commit,
        event_type: event.event_type.clone(),
        content_type: content_type.to_string(),
        data: event.data.clone(),
        metadata: Bytes::copy_from_slice(&event.custom_metadata),
        created: event.created,
    }
}

/// EventStoreDB-backed event log.
pub struct EventStoreDbLog {
    client: Client,
}

impl EventStoreDbLog {
    /// Create a client from a connection string such as
    /// `esdb://localhost:2113?tls=false`.
    ///
    /// The client connects lazily; the first call surfaces connectivity
    /// problems as transport errors.
    pub fn connect(connection_string: &str) -> Result<Self> {
        let settings = connection_string
            .parse::<ClientSettings>()
            .map_err(|e| LogError::InvalidArgument(e.to_string()))?;
        let client = Client::new(settings).map_err(|e| LogError::Transport(e.to_string()))?;
        info!("EventStoreDB client created");
        Ok(Self { client })
    }

    fn subscription_error(
        error: eventstore::Error,
        target: &SubscriptionTarget,
        group: &str,
    ) -> LogError {
        match error {
            eventstore::Error::ResourceAlreadyExists => LogError::AlreadyExists {
                target: target.clone(),
                group: group.to_string(),
            },
            eventstore::Error::ResourceNotFound => LogError::SubscriptionNotFound {
                target: target.clone(),
                group: group.to_string(),
            },
            other => transport(other),
        }
    }
}

#[async_trait]
impl EventLog for EventStoreDbLog {
    #[tracing::instrument(name = "log.append", skip_all, fields(stream = %stream, expected = %expected))]
    async fn append(
        &self,
        stream: &str,
        expected: ExpectedRevision,
        events: Vec<EventData>,
    ) -> Result<AppendResult> {
        if events.is_empty() {
            return Err(LogError::InvalidArgument("no events to append".to_string()));
        }
        let events = events
            .into_iter()
            .map(to_server_event)
            .collect::<Result<Vec<_>>>()?;

        let options =
            AppendToStreamOptions::default().expected_revision(expected_revision(expected));

        let written = self
            .client
            .append_to_stream(stream, &options, events)
            .await
            .map_err(|e| match e {
                eventstore::Error::WrongExpectedVersion { current, .. } => {
                    LogError::WrongExpectedRevision {
                        stream: stream.to_string(),
                        expected,
                        actual: current_revision(current),
                    }
                }
                other => transport(other),
            })?;

        debug!(revision = written.next_expected_version, "Events appended");
        Ok(AppendResult {
            next_expected_revision: written.next_expected_version,
            position: written.position.commit,
        })
    }

    #[tracing::instrument(name = "log.read_stream", skip_all, fields(stream = %stream))]
    async fn read_stream(&self, stream: &str, options: &ReadOptions) -> Result<EventStream> {
        let read_options = ReadStreamOptions::default()
            .position(stream_position(options.position))
            .max_count(options.max_count);
        let read_options = match options.direction {
            Direction::Forwards => read_options.forwards(),
            Direction::Backwards => read_options.backwards(),
        };

        let name = stream.to_string();
        let reader = match self.client.read_stream(stream, &read_options).await {
            Ok(reader) => reader,
            Err(eventstore::Error::ResourceNotFound) => {
                return Ok(stream::once(async move { Err(LogError::StreamNotFound(name)) }).boxed());
            }
            Err(e) => return Err(transport(e)),
        };

        let events = stream::unfold(Some(reader), move |state| {
            let name = name.clone();
            async move {
                let mut reader = state?;
                match reader.next().await {
                    Ok(Some(resolved)) => {
                        let event = from_server_event(resolved.get_original_event());
                        Some((Ok(event), Some(reader)))
                    }
                    Ok(None) => None,
                    Err(eventstore::Error::ResourceNotFound) => {
                        Some((Err(LogError::StreamNotFound(name)), None))
                    }
                    Err(e) => Some((Err(transport(e)), None)),
                }
            }
        });

        Ok(events.boxed())
    }

    #[tracing::instrument(name = "log.create_subscription", skip_all, fields(subscription = %target, group = %group))]
    async fn create_subscription(
        &self,
        target: &SubscriptionTarget,
        group: &str,
        settings: &SubscriptionSettings,
    ) -> Result<()> {
        check_subscription_settings(target, settings)?;
        let created = match target {
            SubscriptionTarget::Stream(stream) => {
                let options = PersistentSubscriptionOptions::default()
                    .start_from(stream_position(settings.start_from))
                    .max_retry_count(settings.max_retry_count);
                self.client
                    .create_persistent_subscription(stream, group, &options)
                    .await
            }
            SubscriptionTarget::All => {
                let mut options = PersistentSubscriptionToAllOptions::default()
                    .start_from(all_position(settings.start_from))
                    .max_retry_count(settings.max_retry_count);
                if let Some(filter) = &settings.filter {
                    let server_filter = filter
                        .prefixes
                        .iter()
                        .fold(SubscriptionFilter::on_stream_name(), |f, prefix| {
                            f.add_prefix(prefix.as_str())
                        });
                    options = options.filter(server_filter);
                }
                self.client
                    .create_persistent_subscription_to_all(group, &options)
                    .await
            }
        };

        created.map_err(|e| Self::subscription_error(e, target, group))?;
        info!("Persistent subscription created");
        Ok(())
    }

    #[tracing::instrument(name = "log.delete_subscription", skip_all, fields(subscription = %target, group = %group))]
    async fn delete_subscription(&self, target: &SubscriptionTarget, group: &str) -> Result<()> {
        let options = DeletePersistentSubscriptionOptions::default();
        let deleted = match target {
            SubscriptionTarget::Stream(stream) => {
                self.client
                    .delete_persistent_subscription(stream, group, &options)
                    .await
            }
            SubscriptionTarget::All => {
                self.client
                    .delete_persistent_subscription_to_all(group, &options)
                    .await
            }
        };
        deleted.map_err(|e| Self::subscription_error(e, target, group))?;
        info!("Persistent subscription deleted");
        Ok(())
    }

    #[tracing::instrument(name = "log.subscribe", skip_all, fields(subscription = %target, group = %group))]
    async fn subscribe(
        &self,
        target: &SubscriptionTarget,
        group: &str,
    ) -> Result<Box<dyn PersistentSubscription>> {
        let options = SubscribeToPersistentSubscriptionOptions::default();
        let inner = match target {
            SubscriptionTarget::Stream(stream) => {
                self.client
                    .subscribe_to_persistent_subscription(stream, group, &options)
                    .await
            }
            SubscriptionTarget::All => {
                self.client
                    .subscribe_to_persistent_subscription_to_all(group, &options)
                    .await
            }
        }
        .map_err(|e| Self::subscription_error(e, target, group))?;

        debug!("Consumer attached");
        Ok(Box::new(EventStoreDbSubscription {
            inner: Some(inner),
            dropped: None,
        }))
    }
}

/// Consumer handle on an EventStoreDB persistent subscription.
///
/// Closing releases the server connection, so the server returns in-flight
/// events to the group without waiting for the handle to be dropped.
pub struct EventStoreDbSubscription {
    inner: Option<eventstore::PersistentSubscription>,
    dropped: Option<String>,
}

impl EventStoreDbSubscription {
    fn live(&mut self) -> Result<&mut eventstore::PersistentSubscription> {
        if let Some(cause) = &self.dropped {
            return Err(LogError::SubscriptionDropped(cause.clone()));
        }
        self.inner
            .as_mut()
            .ok_or_else(|| LogError::SubscriptionDropped(CLOSED_BY_CLIENT.to_string()))
    }

    fn drop_with(&mut self, cause: String) -> SubscriptionEvent {
        debug!(cause = %cause, "Subscription dropped");
        self.inner = None;
        self.dropped = Some(cause.clone());
        SubscriptionEvent::Dropped { cause }
    }
}

#[async_trait]
impl PersistentSubscription for EventStoreDbSubscription {
    async fn recv(&mut self) -> SubscriptionEvent {
        let next = match self.live() {
            Ok(inner) => inner.next().await,
            Err(LogError::SubscriptionDropped(cause)) => {
                return SubscriptionEvent::Dropped { cause }
            }
            Err(e) => return self.drop_with(e.to_string()),
        };

        match next {
            Ok(resolved) => SubscriptionEvent::EventAppeared(Delivery {
                event: from_server_event(resolved.get_original_event()),
                retry_count: u32::try_from(resolved.retry_count).unwrap_or(u32::MAX),
            }),
            Err(e) => self.drop_with(e.to_string()),
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<()> {
        self.live()?
            .ack_ids(vec![delivery.event_id()])
            .await
            .map_err(transport)
    }

    async fn nack(&mut self, delivery: &Delivery, action: NackAction, reason: &str) -> Result<()> {
        let action = match action {
            NackAction::Retry => NakAction::Retry,
            NackAction::Skip => NakAction::Skip,
            NackAction::Park => NakAction::Park,
        };
        self.live()?
            .nack_ids(vec![delivery.event_id()], action, reason)
            .await
            .map_err(transport)
    }

    async fn close(&mut self) -> Result<()> {
        self.inner = None;
        if self.dropped.is_none() {
            self.dropped = Some(CLOSED_BY_CLIENT.to_string());
        }
        Ok(())
    }
}
