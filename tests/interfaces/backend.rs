//! Backend factory for interface tests.
//!
//! Provides a unified interface to create event log backends based on
//! environment configuration.

use std::env;
use std::sync::Arc;

use eventline::interfaces::EventLog;
use eventline::storage::MemoryEventLog;

/// Event log backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogBackend {
    Memory,
    EventStoreDb,
}

impl LogBackend {
    pub fn from_env() -> Self {
        match env::var("EVENTLOG_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "eventstoredb" => LogBackend::EventStoreDb,
            _ => LogBackend::Memory,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LogBackend::Memory => "memory",
            LogBackend::EventStoreDb => "eventstoredb",
        }
    }
}

/// Holds the event log for a scenario.
pub struct LogContext {
    pub log: Arc<dyn EventLog>,
}

impl std::fmt::Debug for LogContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogContext")
            .field("log", &"<dyn EventLog>")
            .finish()
    }
}

impl LogContext {
    /// Create a log context for the configured backend.
    pub async fn new(backend: LogBackend) -> Self {
        match backend {
            LogBackend::Memory => Self {
                log: Arc::new(MemoryEventLog::new()),
            },
            LogBackend::EventStoreDb => Self::create_eventstoredb(),
        }
    }

    #[cfg(feature = "eventstoredb")]
    fn create_eventstoredb() -> Self {
        let connection_string = env::var("EVENTSTOREDB_URL")
            .unwrap_or_else(|_| "esdb://localhost:2113?tls=false".to_string());
        let log = eventline::storage::EventStoreDbLog::connect(&connection_string)
            .expect("Failed to create EventStoreDB client");
        Self { log: Arc::new(log) }
    }

    #[cfg(not(feature = "eventstoredb"))]
    fn create_eventstoredb() -> Self {
        panic!("EVENTLOG_BACKEND=eventstoredb requires the 'eventstoredb' feature");
    }
}
