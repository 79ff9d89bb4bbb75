//! Interface tests for event log backends using Cucumber.
//!
//! These tests verify that every event log implementation honours the same
//! contract. Select a backend via environment variable:
//!
//! ```bash
//! # In-memory (default)
//! cargo test --test interfaces
//!
//! # EventStoreDB (server at EVENTSTOREDB_URL, default esdb://localhost:2113?tls=false)
//! EVENTLOG_BACKEND=eventstoredb cargo test --test interfaces --features eventstoredb
//! ```

mod backend;
mod steps;

use cucumber::World;
use steps::EventLogWorld;

#[tokio::main]
async fn main() {
    println!("\n=== Running EventLog Interface Tests ===\n");
    EventLogWorld::cucumber()
        .fail_on_skipped()
        .run_and_exit("tests/interfaces/features")
        .await;
}
