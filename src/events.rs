//! Event schema shared by the producer and consumer binaries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::{Event, EventRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestEvent {
    pub id: String,
    pub message: String,
}

impl Event for TestEvent {
    const EVENT_TYPE: &'static str = "TestEvent";
}

impl TestEvent {
    /// A new event with a random id.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message: message.into(),
        }
    }
}

/// Every event the demo consumer understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemoEvent {
    Test(TestEvent),
}

/// Registry decoding [`DemoEvent`]s.
pub fn registry() -> EventRegistry<DemoEvent> {
    EventRegistry::new().register(DemoEvent::Test)
}
