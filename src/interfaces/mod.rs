//! Abstract interfaces to the external event-log service.
//!
//! These traits define the contracts for:
//! - Stream persistence (conditional append, ranged reads)
//! - Persistent subscription groups (provisioning, competing consumers)
//! - Subscription handles (delivery, ack/nack, close)

pub mod event_log;
pub mod subscription;

pub use event_log::{check_subscription_settings, EventLog, EventStream, LogError, Result};
pub use subscription::PersistentSubscription;
