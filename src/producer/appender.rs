//! Conditional append.

use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::{debug, info, warn};

use super::StreamReader;
use crate::codec::{self, Event};
use crate::error::{Error, Result};
use crate::interfaces::EventLog;
use crate::model::{EventData, ExpectedRevision};
use crate::utils::retry::is_retryable;

/// Appends to a stream under an optimistic-concurrency precondition.
///
/// Every append returns the revision of the last written record, which is
/// the token to pass as `ExpectedRevision::Exact` on the next append.
#[derive(Clone)]
pub struct ConditionalAppender {
    log: Arc<dyn EventLog>,
    reader: StreamReader,
}

impl ConditionalAppender {
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        let reader = StreamReader::new(Arc::clone(&log));
        Self { log, reader }
    }

    /// Probe the stream's tail.
    ///
    /// Reads at most one record backward from the end. A stream that has
    /// never been written yields `NoStream`.
    pub async fn tail_revision(&self, stream: &str) -> Result<ExpectedRevision> {
        let expected = match self.reader.last_event(stream).await? {
            Some(last) => ExpectedRevision::Exact(last.revision),
            None => ExpectedRevision::NoStream,
        };
        Ok(expected)
    }

    /// Append one record.
    pub async fn append(
        &self,
        stream: &str,
        expected: ExpectedRevision,
        event: EventData,
    ) -> Result<u64> {
        self.append_batch(stream, expected, vec![event]).await
    }

    /// Append records atomically, returning the last record's revision.
    pub async fn append_batch(
        &self,
        stream: &str,
        expected: ExpectedRevision,
        events: Vec<EventData>,
    ) -> Result<u64> {
        let count = events.len();
        let written = self.log.append(stream, expected, events).await?;
        info!(
            stream = %stream,
            expected = %expected,
            revision = written.next_expected_revision,
            count,
            "Appended events"
        );
        Ok(written.next_expected_revision)
    }

    /// Encode a typed event and append it.
    pub async fn append_event<T: Event>(
        &self,
        stream: &str,
        expected: ExpectedRevision,
        event: &T,
    ) -> Result<u64> {
        self.append(stream, expected, codec::encode(event)?).await
    }

    /// Probe the tail and append, retrying on concurrency conflicts.
    ///
    /// Each attempt recomputes the expected revision. Other failures are
    /// returned immediately; conflicts are returned once `backoff` is spent.
    pub async fn append_with_retry(
        &self,
        stream: &str,
        event: EventData,
        backoff: ExponentialBuilder,
    ) -> Result<u64> {
        let attempt = || async {
            let expected = self.tail_revision(stream).await?;
            debug!(stream = %stream, expected = %expected, "Probed stream tail");
            self.append(stream, expected, event.clone()).await
        };

        attempt
            .retry(backoff)
            .when(is_retryable)
            .notify(|err: &Error, dur: Duration| {
                warn!(stream = %stream, error = %err, delay = ?dur, "Append conflicted, retrying");
            })
            .await
    }
}
