//! Subscription consumer state machine.
//!
//! ```text
//! Connecting --connect--> Active --next--> EventDelivered --ack/nack--> Active
//!                            |                   |
//!                            +------next---------+--> Dropped (terminal)
//! ```

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::EventHandler;
use crate::codec::EventRegistry;
use crate::error::{Error, Result};
use crate::interfaces::{EventLog, LogError, PersistentSubscription};
use crate::model::{Delivery, NackAction, RecordedEvent, SubscriptionEvent, SubscriptionTarget};

const CLOSED_BY_CLIENT: &str = "subscription closed by client";

/// Consumer lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerState {
    Connecting,
    Active,
    /// A delivery is held and must be acked or nacked before the next one.
    EventDelivered,
    /// Terminal.
    Dropped { cause: String },
}

/// A delivery decoded against the consumer's registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<E> {
    pub event: E,
    pub record: RecordedEvent,
    pub retry_count: u32,
}

/// Item returned by [`SubscriptionConsumer::next`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumerEvent<E> {
    Delivered(Decoded<E>),
    Dropped { cause: String },
}

/// Why [`SubscriptionConsumer::run`] returned normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The shutdown signal fired.
    Shutdown,
    /// The server dropped the subscription.
    Dropped { cause: String },
}

/// Result of a completed consumption loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub exit: ExitReason,
}

/// One consumer in a persistent subscription group.
///
/// Receive, process and acknowledge are strictly sequential: a delivery
/// must be settled before the next one is requested.
pub struct SubscriptionConsumer<E> {
    target: SubscriptionTarget,
    group: String,
    registry: Arc<EventRegistry<E>>,
    handle: Option<Box<dyn PersistentSubscription>>,
    state: ConsumerState,
    pending: Option<Delivery>,
}

impl<E: Send + Sync + 'static> SubscriptionConsumer<E> {
    /// A consumer in the `Connecting` state.
    pub fn new(
        target: SubscriptionTarget,
        group: impl Into<String>,
        registry: Arc<EventRegistry<E>>,
    ) -> Self {
        Self {
            target,
            group: group.into(),
            registry,
            handle: None,
            state: ConsumerState::Connecting,
            pending: None,
        }
    }

    /// Attach to the group.
    pub async fn connect(&mut self, log: &dyn EventLog) -> Result<()> {
        if self.state != ConsumerState::Connecting {
            return Err(Error::Log(LogError::InvalidArgument(format!(
                "consumer on '{}' is not connecting",
                self.group
            ))));
        }
        let handle = log.subscribe(&self.target, &self.group).await?;
        self.handle = Some(handle);
        self.state = ConsumerState::Active;
        info!(subscription = %self.target, group = %self.group, "Consumer connected");
        Ok(())
    }

    pub fn state(&self) -> &ConsumerState {
        &self.state
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn target(&self) -> &SubscriptionTarget {
        &self.target
    }

    fn handle(&mut self) -> Result<&mut Box<dyn PersistentSubscription>> {
        let group = &self.group;
        self.handle.as_mut().ok_or_else(|| {
            Error::Log(LogError::InvalidArgument(format!(
                "consumer on '{}' is not connected",
                group
            )))
        })
    }

    async fn mark_dropped(&mut self, cause: String) {
        self.pending = None;
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.close().await {
                debug!(error = %e, "Closing dropped subscription failed");
            }
        }
        self.state = ConsumerState::Dropped { cause };
    }

    /// Wait for the next delivery and decode it.
    ///
    /// A tag the registry does not know fails with
    /// `Error::UnrecognizedEventType`. The envelope stays held and
    /// unacknowledged, so it is redelivered once the consumer closes.
    pub async fn next(&mut self) -> Result<ConsumerEvent<E>> {
        match &self.state {
            ConsumerState::Active => {}
            ConsumerState::Dropped { cause } => {
                return Ok(ConsumerEvent::Dropped {
                    cause: cause.clone(),
                })
            }
            ConsumerState::EventDelivered => {
                return Err(Error::Log(LogError::InvalidArgument(
                    "previous delivery has not been acknowledged".to_string(),
                )))
            }
            ConsumerState::Connecting => {
                return Err(Error::Log(LogError::InvalidArgument(format!(
                    "consumer on '{}' is not connected",
                    self.group
                ))))
            }
        }

        let received = self.handle()?.recv().await;
        match received {
            SubscriptionEvent::EventAppeared(delivery) => {
                let decoded = self.registry.decode(&delivery.event);
                let retry_count = delivery.retry_count;
                let record = delivery.event.clone();
                self.pending = Some(delivery);
                self.state = ConsumerState::EventDelivered;

                let event = decoded.inspect_err(|e| {
                    error!(
                        group = %self.group,
                        stream = %record.stream,
                        revision = record.revision,
                        error = %e,
                        "Failed to decode delivery"
                    );
                })?;
                debug!(
                    group = %self.group,
                    stream = %record.stream,
                    revision = record.revision,
                    retry_count,
                    "Event delivered"
                );
                Ok(ConsumerEvent::Delivered(Decoded {
                    event,
                    record,
                    retry_count,
                }))
            }
            SubscriptionEvent::Dropped { cause } => {
                warn!(group = %self.group, cause = %cause, "Subscription dropped");
                self.mark_dropped(cause.clone()).await;
                Ok(ConsumerEvent::Dropped { cause })
            }
        }
    }

    fn take_pending(&mut self) -> Result<Delivery> {
        match (&self.state, self.pending.take()) {
            (ConsumerState::EventDelivered, Some(delivery)) => Ok(delivery),
            _ => Err(Error::Log(LogError::InvalidArgument(
                "no delivery awaiting acknowledgement".to_string(),
            ))),
        }
    }

    /// Acknowledge the held delivery.
    ///
    /// A failed ack ends the consumer: the delivery stays unacknowledged
    /// and will be redelivered, never assumed settled.
    pub async fn ack(&mut self) -> Result<()> {
        let delivery = self.take_pending()?;
        let event_id = delivery.event_id();

        let acked = self.handle()?.ack(&delivery).await;
        if let Err(source) = acked {
            error!(group = %self.group, event_id = %event_id, error = %source, "Ack failed");
            self.mark_dropped(format!("ack failed: {}", source)).await;
            return Err(Error::AckFailed {
                group: self.group.clone(),
                event_id,
                source,
            });
        }

        self.state = ConsumerState::Active;
        Ok(())
    }

    /// Negatively acknowledge the held delivery.
    pub async fn nack(&mut self, action: NackAction, reason: &str) -> Result<()> {
        let delivery = self.take_pending()?;

        let nacked = self.handle()?.nack(&delivery, action, reason).await;
        if let Err(e) = nacked {
            self.mark_dropped(format!("nack failed: {}", e)).await;
            return Err(e.into());
        }

        self.state = ConsumerState::Active;
        Ok(())
    }

    /// Detach from the group. Anything held is returned for redelivery.
    pub async fn close(&mut self) -> Result<()> {
        self.pending = None;
        let closed = match self.handle.take() {
            Some(mut handle) => handle.close().await,
            None => Ok(()),
        };
        if !matches!(self.state, ConsumerState::Dropped { .. }) {
            self.state = ConsumerState::Dropped {
                cause: CLOSED_BY_CLIENT.to_string(),
            };
        }
        closed.map_err(Error::from)
    }

    /// Drive receive, process, acknowledge until the subscription drops,
    /// an error occurs, or `shutdown` completes.
    ///
    /// The handle is closed on every exit path. A handler error nacks the
    /// delivery for retry before being returned.
    pub async fn run<H, S>(&mut self, handler: &H, shutdown: S) -> Result<RunSummary>
    where
        H: EventHandler<E> + ?Sized,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut processed = 0;

        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => break Ok(ExitReason::Shutdown),
                next = self.next() => next,
            };

            let decoded = match next {
                Ok(ConsumerEvent::Delivered(decoded)) => decoded,
                Ok(ConsumerEvent::Dropped { cause }) => break Ok(ExitReason::Dropped { cause }),
                Err(e) => break Err(e),
            };

            let event_id = decoded.record.id;
            match handler.handle(Arc::new(decoded)).await {
                Ok(()) => {
                    if let Err(e) = self.ack().await {
                        break Err(e);
                    }
                    processed += 1;
                }
                Err(source) => {
                    warn!(group = %self.group, event_id = %event_id, error = %source, "Handler failed");
                    if let Err(e) = self.nack(NackAction::Retry, &source.to_string()).await {
                        error!(group = %self.group, error = %e, "Nack after handler failure failed");
                    }
                    break Err(Error::Handler { event_id, source });
                }
            }
        };

        let closed = self.close().await;
        let exit = outcome?;
        closed?;

        info!(group = %self.group, processed, exit = ?exit, "Consumer stopped");
        Ok(RunSummary { processed, exit })
    }
}
