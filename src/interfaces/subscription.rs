//! Persistent subscription handle interface.

use async_trait::async_trait;

use super::Result;
use crate::model::{Delivery, NackAction, SubscriptionEvent};

/// A consumer's connection to a persistent subscription group.
///
/// Deliveries stay in flight until acked or nacked through the same handle.
/// When the handle closes or is dropped, whatever is still in flight goes
/// back to the group for redelivery.
#[async_trait]
pub trait PersistentSubscription: Send {
    /// Wait for the next delivery.
    ///
    /// Once `Dropped` has been returned, every later call returns `Dropped`
    /// again with the same cause.
    async fn recv(&mut self) -> SubscriptionEvent;

    /// Acknowledge a delivery, advancing the group's durable offset past it.
    async fn ack(&mut self, delivery: &Delivery) -> Result<()>;

    /// Negatively acknowledge a delivery.
    async fn nack(&mut self, delivery: &Delivery, action: NackAction, reason: &str) -> Result<()>;

    /// Detach from the group.
    async fn close(&mut self) -> Result<()>;
}
