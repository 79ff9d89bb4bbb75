//! Bootstrap utilities for eventline binaries.
//!
//! Shared initialization code for the producer and consumer binaries.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogConfig, LOG_ENV_VAR};
use crate::interfaces::{EventLog, LogError};
use crate::storage::init_event_log;

/// Initialize tracing with the EVENTLINE_LOG environment variable.
///
/// Defaults to "info" level if EVENTLINE_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Connect to the configured event log, retrying transient failures.
pub async fn connect_event_log(
    config: &LogConfig,
) -> Result<Arc<dyn EventLog>, Box<dyn std::error::Error>> {
    use backon::Retryable;

    let log = (|| async { init_event_log(config).await })
        .retry(super::retry::connection_backoff())
        .when(|e: &LogError| e.is_transport())
        .notify(|err: &LogError, dur: Duration| {
            warn!(error = %err, delay = ?dur, "Event log connection failed, retrying");
        })
        .await?;

    info!(backend = ?config.backend, "Connected to event log");
    Ok(log)
}
