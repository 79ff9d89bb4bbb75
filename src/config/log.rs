//! Event log backend configuration types.

use serde::Deserialize;

/// Backend discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogBackend {
    /// In-process log. Nothing survives the process.
    #[default]
    Memory,
    /// EventStoreDB server (requires the `eventstoredb` feature).
    #[serde(rename = "eventstoredb")]
    EventStoreDb,
}

/// Event log configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Backend discriminator.
    pub backend: LogBackend,
    /// EventStoreDB-specific configuration.
    pub eventstoredb: EventStoreDbConfig,
}

/// EventStoreDB-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventStoreDbConfig {
    /// EventStoreDB connection string.
    pub connection_string: String,
}

impl Default for EventStoreDbConfig {
    fn default() -> Self {
        Self {
            connection_string: "esdb://localhost:2113?tls=false".to_string(),
        }
    }
}
