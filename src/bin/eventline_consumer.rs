//! eventline-consumer: consume a persistent subscription
//!
//! Provisions every configured subscription group (existing groups are
//! left as they are), then consumes the first one, acknowledging each
//! event, until the subscription drops or Ctrl-C is received.
//!
//! ## Configuration
//! - EVENTLINE_CONFIG: Path to a YAML config file (optional)
//! - EVENTLINE__LOG__BACKEND: `memory` or `eventstoredb`
//! - EVENTLINE_LOG: Log filter (default: info)

use tracing::{info, warn};

use eventline::config::Config;
use eventline::demo::consume;
use eventline::utils::bootstrap::{connect_event_log, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None)?;
    let log = connect_event_log(&config.log).await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let summary = consume(log, &config.consumer, shutdown).await?;
    info!(processed = summary.processed, "eventline-consumer stopped");
    Ok(())
}
