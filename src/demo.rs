//! Producer and consumer roles run by the binaries.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::info;

use crate::codec::{self, EventRegistry};
use crate::config::{ConsumerConfig, ProducerConfig};
use crate::consumer::{
    Decoded, ExitReason, RunSummary, SubscriptionConsumer, SubscriptionProvisioner,
};
use crate::error::{Error, HandlerError, Result};
use crate::events::{self, DemoEvent, TestEvent};
use crate::interfaces::{EventLog, LogError};
use crate::model::{ReadOptions, StreamPosition};
use crate::producer::{ConditionalAppender, StreamReader};

/// Append one [`TestEvent`] to the configured stream, then read the
/// stream back from the start.
pub async fn produce(
    log: Arc<dyn EventLog>,
    config: &ProducerConfig,
    message: &str,
) -> Result<Vec<TestEvent>> {
    let appender = ConditionalAppender::new(Arc::clone(&log));
    let reader = StreamReader::new(log);
    let registry = events::registry();

    let event = TestEvent::new(message);
    let revision = appender
        .append_with_retry(&config.stream, codec::encode(&event)?, config.retry.backoff())
        .await?;
    info!(stream = %config.stream, revision, id = %event.id, "Produced event");

    let records = reader
        .read_to_end(
            &config.stream,
            ReadOptions::default()
                .position(StreamPosition::Start)
                .forwards()
                .max_count(config.read_back),
        )
        .await?
        .into_events();

    let mut read_back = Vec::with_capacity(records.len());
    for record in &records {
        let DemoEvent::Test(event) = registry.decode(record)?;
        info!(
            stream = %record.stream,
            revision = record.revision,
            id = %event.id,
            message = %event.message,
            "Read event"
        );
        read_back.push(event);
    }
    Ok(read_back)
}

fn log_event(
    event: Arc<Decoded<DemoEvent>>,
) -> BoxFuture<'static, std::result::Result<(), HandlerError>> {
    async move {
        let DemoEvent::Test(test) = &event.event;
        info!(
            stream = %event.record.stream,
            revision = event.record.revision,
            retry_count = event.retry_count,
            id = %test.id,
            message = %test.message,
            "Consumed event"
        );
        Ok(())
    }
    .boxed()
}

/// Provision every configured group, then consume the first one until
/// `shutdown` completes.
///
/// A server-side drop fails with [`Error::SubscriptionDropped`].
pub async fn consume<S>(
    log: Arc<dyn EventLog>,
    config: &ConsumerConfig,
    shutdown: S,
) -> Result<RunSummary>
where
    S: Future<Output = ()>,
{
    let provisioner = SubscriptionProvisioner::new(Arc::clone(&log));
    provisioner.ensure_configured(config).await?;

    let subscription = config.subscriptions.first().ok_or_else(|| {
        Error::Log(LogError::InvalidArgument(
            "no subscriptions configured".to_string(),
        ))
    })?;

    let registry: Arc<EventRegistry<DemoEvent>> = Arc::new(events::registry());
    let mut consumer =
        SubscriptionConsumer::new(subscription.target(), &subscription.group, registry);
    consumer.connect(&*log).await?;

    let summary = consumer.run(&log_event, shutdown).await?;
    match summary.exit {
        ExitReason::Shutdown => Ok(summary),
        ExitReason::Dropped { cause } => Err(Error::SubscriptionDropped {
            group: subscription.group.clone(),
            cause,
        }),
    }
}
