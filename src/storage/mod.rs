//! Event log implementations.

use std::sync::Arc;

use tracing::info;

use crate::config::{LogBackend, LogConfig};
use crate::interfaces::{EventLog, LogError};

pub mod memory;

#[cfg(feature = "eventstoredb")]
pub mod eventstoredb;

pub use memory::{MemoryEventLog, MemorySubscription, SubscriptionInfo};

#[cfg(feature = "eventstoredb")]
pub use eventstoredb::{EventStoreDbLog, EventStoreDbSubscription};

/// Initialize the event log based on configuration.
pub async fn init_event_log(config: &LogConfig) -> Result<Arc<dyn EventLog>, LogError> {
    match config.backend {
        LogBackend::Memory => {
            info!("Event log: memory");
            Ok(Arc::new(MemoryEventLog::new()))
        }
        #[cfg(feature = "eventstoredb")]
        LogBackend::EventStoreDb => {
            info!(
                "Event log: eventstoredb at {}",
                config.eventstoredb.connection_string
            );
            let log = EventStoreDbLog::connect(&config.eventstoredb.connection_string)?;
            Ok(Arc::new(log))
        }
        #[cfg(not(feature = "eventstoredb"))]
        LogBackend::EventStoreDb => {
            tracing::error!("EventStoreDB backend requested but 'eventstoredb' feature is not enabled");
            Err(LogError::InvalidArgument(
                "eventstoredb feature not enabled".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_memory_backend() {
        let log = init_event_log(&LogConfig::default()).await.unwrap();
        let result = log
            .append(
                "orders",
                crate::model::ExpectedRevision::NoStream,
                vec![crate::model::EventData::binary("Created", &b"{}"[..])],
            )
            .await
            .unwrap();
        assert_eq!(result.next_expected_revision, 0);
    }

    #[cfg(not(feature = "eventstoredb"))]
    #[tokio::test]
    async fn test_eventstoredb_requires_feature() {
        let config = LogConfig {
            backend: LogBackend::EventStoreDb,
            ..Default::default()
        };
        let err = init_event_log(&config).await.err().unwrap();
        assert!(matches!(err, LogError::InvalidArgument(_)));
    }
}
