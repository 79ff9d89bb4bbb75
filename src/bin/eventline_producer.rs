//! eventline-producer: append one event and read the stream back
//!
//! Probes the tail of the configured stream, appends a `TestEvent` under
//! the matching expected revision (retrying on conflicts), then reads the
//! stream forward and prints what it finds.
//!
//! ## Configuration
//! - EVENTLINE_CONFIG: Path to a YAML config file (optional)
//! - EVENTLINE__LOG__BACKEND: `memory` or `eventstoredb`
//! - EVENTLINE__PRODUCER__STREAM: Target stream (default: some-stream)
//! - EVENTLINE_LOG: Log filter (default: info)

use tracing::info;

use eventline::config::Config;
use eventline::demo::produce;
use eventline::utils::bootstrap::{connect_event_log, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None)?;
    let log = connect_event_log(&config.log).await?;

    let events = produce(log, &config.producer, "My first event").await?;

    info!(
        stream = %config.producer.stream,
        count = events.len(),
        "eventline-producer finished"
    );
    Ok(())
}
