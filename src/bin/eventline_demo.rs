//! eventline-demo: producer and consumer in one process
//!
//! Runs both roles against a shared in-memory event log: the producer
//! appends a few events, the consumer acknowledges them, and the process
//! exits once every event has been consumed.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use eventline::config::Config;
use eventline::demo::{consume, produce};
use eventline::interfaces::EventLog;
use eventline::storage::MemoryEventLog;
use eventline::utils::bootstrap::init_tracing;

const MESSAGES: [&str; 3] = ["My first event", "My second event", "My third event"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None)?;
    let memory = MemoryEventLog::new();
    let log: Arc<dyn EventLog> = Arc::new(memory.clone());

    for message in MESSAGES {
        produce(Arc::clone(&log), &config.producer, message).await?;
    }

    let subscription = config
        .consumer
        .subscriptions
        .first()
        .ok_or("no subscriptions configured")?;
    let (target, group) = (subscription.target(), subscription.group.clone());

    // Stop once the group has settled everything that was produced.
    let settled = async {
        loop {
            let checkpoint = memory
                .subscription_info(&target, &group)
                .and_then(|info| info.checkpoint);
            if checkpoint.is_some_and(|c| c + 1 >= MESSAGES.len() as u64) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };

    let summary = consume(log, &config.consumer, settled).await?;
    info!(
        processed = summary.processed,
        exit = ?summary.exit,
        "eventline-demo finished"
    );
    Ok(())
}
