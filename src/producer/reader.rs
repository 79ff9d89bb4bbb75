//! Stream reader.

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use tracing::debug;

use crate::error::{Error, Result};
use crate::interfaces::EventLog;
use crate::model::{ReadOptions, RecordedEvent, StreamPosition};

/// Result of reading a stream to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Events(Vec<RecordedEvent>),
    /// The stream has never been written.
    StreamNotFound,
}

impl ReadOutcome {
    /// Events read, treating a missing stream as empty.
    pub fn into_events(self) -> Vec<RecordedEvent> {
        match self {
            ReadOutcome::Events(events) => events,
            ReadOutcome::StreamNotFound => Vec::new(),
        }
    }
}

/// Reads ranges of a stream in either direction.
///
/// Each read is lazy and finite. To continue past the last record seen,
/// read again starting from the next revision.
#[derive(Clone)]
pub struct StreamReader {
    log: Arc<dyn EventLog>,
}

impl StreamReader {
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self { log }
    }

    /// Lazily read records.
    ///
    /// A missing stream surfaces as an `Error::StreamNotFound` item, so a
    /// caller can tell it apart from transport failures.
    pub async fn read(
        &self,
        stream: &str,
        options: ReadOptions,
    ) -> Result<BoxStream<'static, Result<RecordedEvent>>> {
        let events = self.log.read_stream(stream, &options).await?;
        Ok(events.map_err(Error::from).boxed())
    }

    /// Read `count` records forward from `from`.
    pub async fn read_forward(
        &self,
        stream: &str,
        from: StreamPosition,
        count: usize,
    ) -> Result<BoxStream<'static, Result<RecordedEvent>>> {
        self.read(
            stream,
            ReadOptions::default().position(from).forwards().max_count(count),
        )
        .await
    }

    /// Read `count` records backward from `from`.
    pub async fn read_backward(
        &self,
        stream: &str,
        from: StreamPosition,
        count: usize,
    ) -> Result<BoxStream<'static, Result<RecordedEvent>>> {
        self.read(
            stream,
            ReadOptions::default().position(from).backwards().max_count(count),
        )
        .await
    }

    /// Collect a whole read, reporting a missing stream as an outcome.
    pub async fn read_to_end(&self, stream: &str, options: ReadOptions) -> Result<ReadOutcome> {
        let mut events = self.read(stream, options).await?;
        let mut collected = Vec::new();
        while let Some(next) = events.next().await {
            match next {
                Ok(event) => collected.push(event),
                Err(Error::StreamNotFound(_)) if collected.is_empty() => {
                    debug!(stream = %stream, "Stream not found");
                    return Ok(ReadOutcome::StreamNotFound);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(ReadOutcome::Events(collected))
    }

    /// The stream's last record, or `None` if it has never been written.
    pub async fn last_event(&self, stream: &str) -> Result<Option<RecordedEvent>> {
        let outcome = self
            .read_to_end(
                stream,
                ReadOptions::default()
                    .position(StreamPosition::End)
                    .backwards()
                    .max_count(1),
            )
            .await?;
        Ok(outcome.into_events().into_iter().next())
    }
}
