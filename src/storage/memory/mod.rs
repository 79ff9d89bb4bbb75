//! In-memory event log.
//!
//! A process-local implementation of the full event-log contract: streams,
//! the `$all` view, persistent subscription groups with competing consumers,
//! ack/nack and redelivery. Ideal for local development and testing without
//! an external server.
//!
//! All state lives behind one mutex that is never held across an await.
//! A watch channel carries a change counter so idle subscribers can wait
//! for appends, nacks and releases without missing a wake-up.

mod subscription;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info};

pub use subscription::MemorySubscription;

use crate::interfaces::{
    check_subscription_settings, EventLog, EventStream, LogError, PersistentSubscription, Result,
};
use crate::model::{
    AppendResult, CurrentRevision, Delivery, Direction, EventData, ExpectedRevision,
    ReadOptions, RecordedEvent, StreamPosition, SubscriptionSettings, SubscriptionTarget,
    ALL_STREAM,
};

/// Key type for subscription groups: (target, group name).
type GroupKey = (SubscriptionTarget, String);

/// Point-in-time view of a subscription group, for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    /// Deliveries currently held by a consumer.
    pub in_flight: usize,
    /// Deliveries waiting to be handed out again.
    pub pending_retry: usize,
    /// Deliveries moved out of rotation.
    pub parked: usize,
    /// Source index below which every event has been settled.
    pub checkpoint: Option<u64>,
    pub connected_consumers: usize,
}

struct InFlight {
    consumer: u64,
    delivery: Delivery,
}

struct GroupState {
    settings: SubscriptionSettings,
    /// Distinguishes a re-created group from the one a handle attached to.
    generation: u64,
    /// Next source index to consider.
    cursor: u64,
    retry: VecDeque<Delivery>,
    /// Keyed by source index. Event ids are caller-supplied and may repeat.
    in_flight: HashMap<u64, InFlight>,
    parked: Vec<Delivery>,
    consumers: usize,
}

impl GroupState {
    /// Lowest source index still unsettled, minus one.
    fn checkpoint(&self, target: &SubscriptionTarget) -> Option<u64> {
        let lowest_open = self
            .in_flight
            .values()
            .map(|f| &f.delivery)
            .chain(self.retry.iter())
            .map(|d| source_index(target, d))
            .min()
            .unwrap_or(self.cursor);
        lowest_open.checked_sub(1)
    }

    fn requeue(&mut self, mut delivery: Delivery) {
        delivery.retry_count += 1;
        if delivery.retry_count > self.settings.max_retry_count {
            debug!(
                event_id = %delivery.event_id(),
                retry_count = delivery.retry_count,
                "Retry limit reached, parking event"
            );
            self.parked.push(delivery);
            return;
        }
        self.retry.push_back(delivery);
        self.retry
            .make_contiguous()
            .sort_by_key(|d| d.event.position);
    }
}

/// Position of an event within the group's source.
fn source_index(target: &SubscriptionTarget, delivery: &Delivery) -> u64 {
    match target {
        SubscriptionTarget::Stream(_) => delivery.event.revision,
        SubscriptionTarget::All => delivery.event.position,
    }
}

#[derive(Default)]
struct LogState {
    streams: HashMap<String, Vec<RecordedEvent>>,
    /// Commit order: (stream, revision).
    all: Vec<(String, u64)>,
    groups: HashMap<GroupKey, GroupState>,
    next_generation: u64,
    next_consumer: u64,
    shutdown: Option<String>,
}

impl LogState {
    fn current_revision(&self, stream: &str) -> CurrentRevision {
        match self.streams.get(stream) {
            Some(events) if !events.is_empty() => {
                CurrentRevision::Current(events.len() as u64 - 1)
            }
            _ => CurrentRevision::NoStream,
        }
    }

    fn source_len(&self, target: &SubscriptionTarget) -> u64 {
        match target {
            SubscriptionTarget::Stream(name) => {
                self.streams.get(name).map(|e| e.len() as u64).unwrap_or(0)
            }
            SubscriptionTarget::All => self.all.len() as u64,
        }
    }

    fn source_event(&self, target: &SubscriptionTarget, index: u64) -> Option<&RecordedEvent> {
        match target {
            SubscriptionTarget::Stream(name) => self.streams.get(name)?.get(index as usize),
            SubscriptionTarget::All => {
                let (stream, revision) = self.all.get(index as usize)?;
                self.streams.get(stream)?.get(*revision as usize)
            }
        }
    }

    fn ensure_running(&self) -> Result<()> {
        match &self.shutdown {
            Some(cause) => Err(LogError::Transport(format!("event log shut down: {}", cause))),
            None => Ok(()),
        }
    }

    /// Hand the next delivery of a group to `consumer`.
    ///
    /// `Err` carries the drop cause when the consumer can no longer be served.
    fn next_delivery(
        &mut self,
        key: &GroupKey,
        generation: u64,
        consumer: u64,
    ) -> std::result::Result<Option<Delivery>, String> {
        if let Some(cause) = &self.shutdown {
            return Err(cause.clone());
        }

        let (target, _) = key;
        let source_len = self.source_len(target);

        let Some(group) = self.groups.get(key).filter(|g| g.generation == generation) else {
            return Err("subscription group deleted".to_string());
        };
        let filter = group.settings.filter.clone();
        let mut cursor = group.cursor;

        let mut fresh = None;
        let has_retry = !group.retry.is_empty();
        if !has_retry {
            while cursor < source_len {
                let index = cursor;
                cursor += 1;
                let Some(event) = self.source_event(target, index) else {
                    continue;
                };
                if *target == SubscriptionTarget::All {
                    if event.stream.starts_with('$') {
                        continue;
                    }
                    if let Some(filter) = &filter {
                        if !filter.matches(&event.stream) {
                            continue;
                        }
                    }
                }
                fresh = Some(Delivery {
                    event: event.clone(),
                    retry_count: 0,
                });
                break;
            }
        }

        let Some(group) = self.groups.get_mut(key) else {
            return Err("subscription group deleted".to_string());
        };
        group.cursor = cursor;

        let delivery = if has_retry {
            group.retry.pop_front()
        } else {
            fresh
        };

        if let Some(delivery) = &delivery {
            group.in_flight.insert(
                source_index(target, delivery),
                InFlight {
                    consumer,
                    delivery: delivery.clone(),
                },
            );
        }
        Ok(delivery)
    }
}

/// Shared core referenced by the log and every open subscription handle.
struct Shared {
    state: Mutex<LogState>,
    changes: watch::Sender<u64>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }
}

/// In-memory event log.
///
/// Cloning yields another handle onto the same log, so producers and
/// consumers in one process can share it.
#[derive(Clone)]
pub struct MemoryEventLog {
    shared: Arc<Shared>,
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEventLog {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        info!("In-memory event log initialized");
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LogState::default()),
                changes,
            }),
        }
    }

    /// Stop serving. Attached consumers receive `Dropped` with `cause`;
    /// later calls fail with a transport error.
    pub fn shutdown(&self, cause: impl Into<String>) {
        let cause = cause.into();
        info!(cause = %cause, "In-memory event log shutting down");
        self.shared.lock().shutdown = Some(cause);
        self.shared.notify();
    }

    /// Inspect a subscription group.
    pub fn subscription_info(
        &self,
        target: &SubscriptionTarget,
        group: &str,
    ) -> Option<SubscriptionInfo> {
        let state = self.shared.lock();
        let group_state = state.groups.get(&(target.clone(), group.to_string()))?;
        Some(SubscriptionInfo {
            in_flight: group_state.in_flight.len(),
            pending_retry: group_state.retry.len(),
            parked: group_state.parked.len(),
            checkpoint: group_state.checkpoint(target),
            connected_consumers: group_state.consumers,
        })
    }

    /// Names of all streams that have at least one event.
    pub fn stream_names(&self) -> Vec<String> {
        let state = self.shared.lock();
        let mut names: Vec<_> = state.streams.keys().cloned().collect();
        names.sort();
        names
    }
}

fn validate_stream_name(stream: &str) -> Result<()> {
    if stream.is_empty() {
        return Err(LogError::InvalidArgument("stream name is empty".to_string()));
    }
    if stream == ALL_STREAM {
        return Err(LogError::InvalidArgument(format!(
            "'{}' cannot be written or read as a stream",
            ALL_STREAM
        )));
    }
    Ok(())
}

/// Index of the first record a read yields, or `None` if nothing is in range.
fn read_start(len: usize, options: &ReadOptions) -> Option<usize> {
    if len == 0 {
        return None;
    }
    match (options.direction, options.position) {
        (Direction::Forwards, StreamPosition::Start) => Some(0),
        (Direction::Forwards, StreamPosition::End) => None,
        (Direction::Forwards, StreamPosition::Revision(n)) => {
            usize::try_from(n).ok().filter(|&n| n < len)
        }
        (Direction::Backwards, StreamPosition::Start) => Some(0),
        (Direction::Backwards, StreamPosition::End) => Some(len - 1),
        (Direction::Backwards, StreamPosition::Revision(n)) => {
            Some(usize::try_from(n).map_or(len - 1, |n| n.min(len - 1)))
        }
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    #[tracing::instrument(name = "log.append", skip_all, fields(stream = %stream, expected = %expected))]
    async fn append(
        &self,
        stream: &str,
        expected: ExpectedRevision,
        events: Vec<EventData>,
    ) -> Result<AppendResult> {
        validate_stream_name(stream)?;
        if events.is_empty() {
            return Err(LogError::InvalidArgument("no events to append".to_string()));
        }

        let result = {
            let mut state = self.shared.lock();
            state.ensure_running()?;

            let current = state.current_revision(stream);
            if !expected.matches(current) {
                debug!(actual = %current, "Expected revision mismatch");
                return Err(LogError::WrongExpectedRevision {
                    stream: stream.to_string(),
                    expected,
                    actual: current,
                });
            }

            let now = Utc::now();
            let mut position = state.all.len() as u64;
            let mut revision = state.streams.get(stream).map(|e| e.len()).unwrap_or(0) as u64;
            let mut recorded = Vec::with_capacity(events.len());
            for event in events {
                recorded.push(RecordedEvent {
                    id: event.id,
                    stream: stream.to_string(),
                    revision,
                    position,
                    event_type: event.event_type,
                    content_type: event.content_type,
                    data: event.data,
                    metadata: event.metadata,
                    created: now,
                });
                revision += 1;
                position += 1;
            }

            for event in &recorded {
                state.all.push((stream.to_string(), event.revision));
            }
            state
                .streams
                .entry(stream.to_string())
                .or_default()
                .extend(recorded);

            AppendResult {
                next_expected_revision: revision - 1,
                position: position - 1,
            }
        };

        self.shared.notify();
        debug!(
            revision = result.next_expected_revision,
            position = result.position,
            "Events appended"
        );
        Ok(result)
    }

    #[tracing::instrument(name = "log.read_stream", skip_all, fields(stream = %stream))]
    async fn read_stream(&self, stream: &str, options: &ReadOptions) -> Result<EventStream> {
        validate_stream_name(stream)?;

        let selected = {
            let state = self.shared.lock();
            state.ensure_running()?;

            let Some(events) = state.streams.get(stream) else {
                debug!("Stream not found");
                let missing = LogError::StreamNotFound(stream.to_string());
                return Ok(stream::once(async move { Err(missing) }).boxed());
            };

            match read_start(events.len(), options) {
                None => Vec::new(),
                Some(start) => match options.direction {
                    Direction::Forwards => events[start..]
                        .iter()
                        .take(options.max_count)
                        .cloned()
                        .collect(),
                    Direction::Backwards => events[..=start]
                        .iter()
                        .rev()
                        .take(options.max_count)
                        .cloned()
                        .collect::<Vec<_>>(),
                },
            }
        };

        Ok(stream::iter(selected.into_iter().map(Ok)).boxed())
    }

    #[tracing::instrument(name = "log.create_subscription", skip_all, fields(subscription = %target, group = %group))]
    async fn create_subscription(
        &self,
        target: &SubscriptionTarget,
        group: &str,
        settings: &SubscriptionSettings,
    ) -> Result<()> {
        if group.is_empty() {
            return Err(LogError::InvalidArgument("group name is empty".to_string()));
        }
        if let SubscriptionTarget::Stream(name) = target {
            validate_stream_name(name)?;
        }
        check_subscription_settings(target, settings)?;

        let mut state = self.shared.lock();
        state.ensure_running()?;

        let key = (target.clone(), group.to_string());
        if state.groups.contains_key(&key) {
            return Err(LogError::AlreadyExists {
                target: target.clone(),
                group: group.to_string(),
            });
        }

        let cursor = match settings.start_from {
            StreamPosition::Start => 0,
            StreamPosition::End => state.source_len(target),
            StreamPosition::Revision(n) => n,
        };
        let generation = state.next_generation;
        state.next_generation += 1;
        state.groups.insert(
            key,
            GroupState {
                settings: settings.clone(),
                generation,
                cursor,
                retry: VecDeque::new(),
                in_flight: HashMap::new(),
                parked: Vec::new(),
                consumers: 0,
            },
        );

        info!(cursor, "Persistent subscription created");
        Ok(())
    }

    #[tracing::instrument(name = "log.delete_subscription", skip_all, fields(subscription = %target, group = %group))]
    async fn delete_subscription(&self, target: &SubscriptionTarget, group: &str) -> Result<()> {
        {
            let mut state = self.shared.lock();
            state.ensure_running()?;
            if state
                .groups
                .remove(&(target.clone(), group.to_string()))
                .is_none()
            {
                return Err(LogError::SubscriptionNotFound {
                    target: target.clone(),
                    group: group.to_string(),
                });
            }
        }
        self.shared.notify();
        info!("Persistent subscription deleted");
        Ok(())
    }

    #[tracing::instrument(name = "log.subscribe", skip_all, fields(subscription = %target, group = %group))]
    async fn subscribe(
        &self,
        target: &SubscriptionTarget,
        group: &str,
    ) -> Result<Box<dyn PersistentSubscription>> {
        let key = (target.clone(), group.to_string());
        let (generation, consumer) = {
            let mut state = self.shared.lock();
            state.ensure_running()?;

            let consumer = state.next_consumer;
            let Some(group_state) = state.groups.get_mut(&key) else {
                return Err(LogError::SubscriptionNotFound {
                    target: target.clone(),
                    group: group.to_string(),
                });
            };
            group_state.consumers += 1;
            let generation = group_state.generation;
            state.next_consumer += 1;
            (generation, consumer)
        };

        debug!(consumer, "Consumer attached");
        Ok(Box::new(MemorySubscription::new(
            Arc::clone(&self.shared),
            key,
            generation,
            consumer,
        )))
    }
}
