//! Cucumber step definitions for interface tests.

pub mod event_log;
pub mod subscriptions;

use std::time::Duration;

use cucumber::{given, World};
use eventline::consumer::Provisioned;
use eventline::error::Error;
use eventline::interfaces::{EventLog, PersistentSubscription};
use eventline::model::{Delivery, EventData, ExpectedRevision, RecordedEvent, SubscriptionEvent};
use uuid::Uuid;

use crate::backend::{LogBackend, LogContext};

/// Upper bound on waiting for a delivery before failing the step.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Test context shared by event log and subscription scenarios.
#[derive(Debug, World)]
#[world(init = Self::new)]
pub struct EventLogWorld {
    backend: LogBackend,
    context: Option<LogContext>,
    /// Keeps names unique per scenario on a shared server.
    run_id: String,
    last_append: Option<Result<u64, Error>>,
    last_expected: Option<ExpectedRevision>,
    forward: Option<Result<Vec<RecordedEvent>, Error>>,
    backward: Option<Vec<RecordedEvent>>,
    last_provisioned: Option<Provisioned>,
    last_create_rejected: bool,
    subscription: Option<SubscriptionHandle>,
    /// Closed handles stay alive so that redelivery depends on close alone.
    closed: Vec<SubscriptionHandle>,
    last_delivery: Option<Delivery>,
}

/// Debug-printable wrapper around an open subscription handle.
pub struct SubscriptionHandle(Box<dyn PersistentSubscription>);

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<dyn PersistentSubscription>")
    }
}

impl EventLogWorld {
    fn new() -> Self {
        Self {
            backend: LogBackend::from_env(),
            context: None,
            run_id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            last_append: None,
            last_expected: None,
            forward: None,
            backward: None,
            last_provisioned: None,
            last_create_rejected: false,
            subscription: None,
            closed: Vec::new(),
            last_delivery: None,
        }
    }

    fn log(&self) -> std::sync::Arc<dyn EventLog> {
        self.context
            .as_ref()
            .expect("Event log context not initialized")
            .log
            .clone()
    }

    /// Scope a stream, group or prefix name to this scenario.
    ///
    /// The run id goes after the first `-`, so `some-stream` and the prefix
    /// `some-` scope to names that still match each other.
    fn scoped(&self, name: &str) -> String {
        match name.split_once('-') {
            Some((head, tail)) => format!("{}-{}-{}", head, self.run_id, tail),
            None => format!("{}-{}", name, self.run_id),
        }
    }

    fn unscoped(&self, name: &str) -> String {
        name.replacen(&format!("-{}", self.run_id), "", 1)
    }

    fn subscription(&mut self) -> &mut Box<dyn PersistentSubscription> {
        &mut self
            .subscription
            .as_mut()
            .expect("No consumer connected")
            .0
    }

    async fn recv(&mut self) -> SubscriptionEvent {
        tokio::time::timeout(RECV_TIMEOUT, self.subscription().recv())
            .await
            .expect("Timed out waiting for a delivery")
    }

    async fn append_events(&self, stream: &str, count: u32) {
        let events = (0..count)
            .map(|n| {
                let payload = serde_json::json!({ "id": n.to_string(), "message": "hello" });
                EventData::json("TestEvent", &payload).expect("Failed to encode event")
            })
            .collect();
        self.log()
            .append(&self.scoped(stream), ExpectedRevision::Any, events)
            .await
            .expect("Failed to append events");
    }
}

// --- Background ---

#[given("an event log backend")]
async fn given_event_log_backend(world: &mut EventLogWorld) {
    println!("Using backend: {}", world.backend.name());
    world.context = Some(LogContext::new(world.backend).await);
}

#[given(expr = "stream {string} has {int} event(s)")]
async fn given_stream_with_events(world: &mut EventLogWorld, stream: String, count: u32) {
    if count > 0 {
        world.append_events(&stream, count).await;
    }
}
