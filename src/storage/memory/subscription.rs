//! Consumer handle onto an in-memory subscription group.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{source_index, GroupKey, GroupState, Shared};
use crate::interfaces::{LogError, PersistentSubscription, Result};
use crate::model::{Delivery, NackAction, SubscriptionEvent};

/// Cause reported after the client closed its own handle.
const CLOSED_BY_CLIENT: &str = "subscription closed by client";

/// One competing consumer attached to a group.
///
/// In-flight deliveries are returned to the group when the handle is
/// closed or dropped.
pub struct MemorySubscription {
    shared: Arc<Shared>,
    key: GroupKey,
    generation: u64,
    consumer: u64,
    changes: watch::Receiver<u64>,
    dropped: Option<String>,
    released: bool,
}

impl MemorySubscription {
    pub(super) fn new(shared: Arc<Shared>, key: GroupKey, generation: u64, consumer: u64) -> Self {
        let changes = shared.changes.subscribe();
        Self {
            shared,
            key,
            generation,
            consumer,
            changes,
            dropped: None,
            released: false,
        }
    }

    fn drop_with(&mut self, cause: String) -> SubscriptionEvent {
        debug!(consumer = self.consumer, cause = %cause, "Subscription dropped");
        self.release();
        self.dropped = Some(cause.clone());
        SubscriptionEvent::Dropped { cause }
    }

    fn ensure_live(&self) -> Result<()> {
        match &self.dropped {
            Some(cause) => Err(LogError::SubscriptionDropped(cause.clone())),
            None => Ok(()),
        }
    }

    /// Take a delivery out of this consumer's in-flight set and hand it to
    /// `then` under the same lock.
    fn settle<F>(&self, delivery: &Delivery, then: F) -> Result<()>
    where
        F: FnOnce(&mut GroupState, Delivery),
    {
        let mut state = self.shared.lock();
        let (target, _) = &self.key;
        let index = source_index(target, delivery);
        let group = state
            .groups
            .get_mut(&self.key)
            .filter(|g| g.generation == self.generation)
            .ok_or_else(|| LogError::SubscriptionDropped("subscription group deleted".to_string()))?;

        let stale = LogError::StaleDelivery {
            event_id: delivery.event_id(),
        };
        let held = group.in_flight.get(&index).is_some_and(|f| {
            f.consumer == self.consumer && f.delivery.event_id() == delivery.event_id()
        });
        if !held {
            return Err(stale);
        }
        let settled = group.in_flight.remove(&index).ok_or(stale)?;
        then(group, settled.delivery);
        Ok(())
    }

    /// Return everything this consumer holds to the group. Idempotent.
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let returned = {
            let mut state = self.shared.lock();
            let Some(group) = state
                .groups
                .get_mut(&self.key)
                .filter(|g| g.generation == self.generation)
            else {
                return;
            };
            group.consumers = group.consumers.saturating_sub(1);

            let mine: Vec<_> = group
                .in_flight
                .iter()
                .filter(|(_, f)| f.consumer == self.consumer)
                .map(|(id, _)| *id)
                .collect();
            for id in &mine {
                if let Some(f) = group.in_flight.remove(id) {
                    group.requeue(f.delivery);
                }
            }
            mine.len()
        };

        if returned > 0 {
            debug!(
                consumer = self.consumer,
                returned, "Returned in-flight deliveries to group"
            );
            self.shared.notify();
        }
    }
}

#[async_trait]
impl PersistentSubscription for MemorySubscription {
    async fn recv(&mut self) -> SubscriptionEvent {
        if let Some(cause) = &self.dropped {
            return SubscriptionEvent::Dropped {
                cause: cause.clone(),
            };
        }

        loop {
            // Mark the current version seen before inspecting state so a
            // change made after the check wakes the wait below.
            self.changes.borrow_and_update();

            let next = self
                .shared
                .lock()
                .next_delivery(&self.key, self.generation, self.consumer);
            match next {
                Ok(Some(delivery)) => return SubscriptionEvent::EventAppeared(delivery),
                Ok(None) => {}
                Err(cause) => return self.drop_with(cause),
            }

            if self.changes.changed().await.is_err() {
                return self.drop_with("event log closed".to_string());
            }
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<()> {
        self.ensure_live()?;
        self.settle(delivery, |_, _| {})?;
        debug!(
            consumer = self.consumer,
            event_id = %delivery.event_id(),
            "Delivery acknowledged"
        );
        Ok(())
    }

    async fn nack(&mut self, delivery: &Delivery, action: NackAction, reason: &str) -> Result<()> {
        self.ensure_live()?;
        self.settle(delivery, |group, settled| match action {
            NackAction::Skip => {}
            NackAction::Retry => group.requeue(settled),
            NackAction::Park => group.parked.push(settled),
        })?;
        warn!(
            consumer = self.consumer,
            event_id = %delivery.event_id(),
            action = ?action,
            reason = %reason,
            "Delivery negatively acknowledged"
        );

        if action != NackAction::Skip {
            self.shared.notify();
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.release();
        if self.dropped.is_none() {
            self.dropped = Some(CLOSED_BY_CLIENT.to_string());
        }
        Ok(())
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.release();
    }
}
