//! Consumer side: group provisioning and sequential consumption.
//!
//! A consumer attaches to a durable group, decodes each delivery by its
//! type tag, hands it to an [`EventHandler`] and acknowledges it before
//! asking for the next one. The group's offset lives in the event log, so
//! any number of consumer processes can share a group.

mod handler;
mod provisioner;
mod subscription;

pub use handler::EventHandler;
pub use provisioner::{Provisioned, SubscriptionProvisioner};
pub use subscription::{
    ConsumerEvent, ConsumerState, Decoded, ExitReason, RunSummary, SubscriptionConsumer,
};
