//! Persistent subscription step definitions.

use cucumber::{given, then, when};
use eventline::consumer::{Provisioned, SubscriptionProvisioner};
use eventline::model::{
    Delivery, StreamFilter, SubscriptionEvent, SubscriptionSettings, SubscriptionTarget,
};

use super::{EventLogWorld, SubscriptionHandle};

impl EventLogWorld {
    fn stream_target(&self, stream: &str) -> SubscriptionTarget {
        SubscriptionTarget::stream(self.scoped(stream))
    }

    async fn connect(&mut self, target: SubscriptionTarget, group: &str) {
        let handle = self
            .log()
            .subscribe(&target, &self.scoped(group))
            .await
            .expect("Failed to subscribe");
        self.subscription = Some(SubscriptionHandle(handle));
        self.last_delivery = None;
    }

    async fn expect_delivery(&mut self) -> Delivery {
        match self.recv().await {
            SubscriptionEvent::EventAppeared(delivery) => delivery,
            SubscriptionEvent::Dropped { cause } => panic!("Subscription dropped: {}", cause),
        }
    }
}

// --- Given steps ---

#[given(expr = "group {string} on stream {string}")]
async fn given_stream_group(world: &mut EventLogWorld, group: String, stream: String) {
    let provisioner = SubscriptionProvisioner::new(world.log());
    provisioner
        .ensure_stream_group(&world.scoped(&stream), &world.scoped(&group))
        .await
        .expect("Failed to provision group");
}

#[given(expr = "group {string} on $all with prefix {string}")]
async fn given_all_group(world: &mut EventLogWorld, group: String, prefix: String) {
    let provisioner = SubscriptionProvisioner::new(world.log());
    provisioner
        .ensure_all_group(&world.scoped(&group), [world.scoped(&prefix)])
        .await
        .expect("Failed to provision group");
}

// --- When steps ---

#[when(expr = "I ensure group {string} on stream {string}")]
async fn when_ensure_group(world: &mut EventLogWorld, group: String, stream: String) {
    let provisioner = SubscriptionProvisioner::new(world.log());
    let outcome = provisioner
        .ensure_stream_group(&world.scoped(&stream), &world.scoped(&group))
        .await
        .expect("Provisioning failed");
    world.last_provisioned = Some(outcome);
}

#[when(expr = "I create group {string} on stream {string} with a prefix filter")]
async fn when_create_filtered_stream_group(
    world: &mut EventLogWorld,
    group: String,
    stream: String,
) {
    let result = world
        .log()
        .create_subscription(
            &world.stream_target(&stream),
            &world.scoped(&group),
            &SubscriptionSettings::default().filter(StreamFilter::prefixes(["x-"])),
        )
        .await;
    world.last_create_rejected = result.is_err();
}

#[when(expr = "a consumer connects to group {string} on stream {string}")]
async fn when_consumer_connects(world: &mut EventLogWorld, group: String, stream: String) {
    let target = world.stream_target(&stream);
    world.connect(target, &group).await;
}

#[when(expr = "a consumer connects to group {string} on $all")]
async fn when_consumer_connects_all(world: &mut EventLogWorld, group: String) {
    world.connect(SubscriptionTarget::All, &group).await;
}

#[when(expr = "the consumer acknowledges {int} deliveries")]
async fn when_consumer_acks(world: &mut EventLogWorld, count: usize) {
    for _ in 0..count {
        let delivery = world.expect_delivery().await;
        world
            .subscription()
            .ack(&delivery)
            .await
            .expect("Ack failed");
    }
}

#[when("the consumer receives a delivery without acknowledging it")]
async fn when_consumer_holds(world: &mut EventLogWorld) {
    let delivery = world.expect_delivery().await;
    world.last_delivery = Some(delivery);
}

#[when("the consumer disconnects")]
async fn when_consumer_disconnects(world: &mut EventLogWorld) {
    if let Some(mut handle) = world.subscription.take() {
        handle.0.close().await.expect("Close failed");
        world.closed.push(handle);
    }
}

#[when(expr = "stream {string} gets {int} more event(s)")]
async fn when_more_events(world: &mut EventLogWorld, stream: String, count: u32) {
    world.append_events(&stream, count).await;
}

#[when(expr = "group {string} on stream {string} is deleted")]
async fn when_group_deleted(world: &mut EventLogWorld, group: String, stream: String) {
    world
        .log()
        .delete_subscription(&world.stream_target(&stream), &world.scoped(&group))
        .await
        .expect("Failed to delete group");
}

// --- Then steps ---

#[then("the group was created")]
async fn then_group_created(world: &mut EventLogWorld) {
    assert_eq!(world.last_provisioned, Some(Provisioned::Created));
}

#[then("the group already existed")]
async fn then_group_existed(world: &mut EventLogWorld) {
    assert_eq!(world.last_provisioned, Some(Provisioned::AlreadyExisted));
}

#[then("the group creation is rejected")]
async fn then_group_rejected(world: &mut EventLogWorld) {
    assert!(world.last_create_rejected);
}

#[then(expr = "the consumer receives revisions {int} to {int} in order")]
async fn then_receives_in_order(world: &mut EventLogWorld, first: u64, last: u64) {
    for expected in first..=last {
        let delivery = world.expect_delivery().await;
        assert_eq!(delivery.event.revision, expected);
        world
            .subscription()
            .ack(&delivery)
            .await
            .expect("Ack failed");
    }
}

#[then(expr = "the next delivery is revision {int} with retry count {int}")]
async fn then_next_delivery(world: &mut EventLogWorld, revision: u64, retry_count: u32) {
    let delivery = world.expect_delivery().await;
    assert_eq!(delivery.event.revision, revision);
    assert_eq!(delivery.retry_count, retry_count);
}

#[then(expr = "the held delivery is redelivered with retry count {int}")]
async fn then_held_redelivered(world: &mut EventLogWorld, retry_count: u32) {
    let held = world.last_delivery.take().expect("No delivery held");
    let delivery = world.expect_delivery().await;
    assert_eq!(delivery.event_id(), held.event_id());
    assert_eq!(delivery.event.revision, held.event.revision);
    assert_eq!(delivery.retry_count, retry_count);
}

#[then(expr = "the consumer receives events from {string} then {string}")]
async fn then_receives_from_streams(world: &mut EventLogWorld, first: String, second: String) {
    for expected in [first, second] {
        let delivery = world.expect_delivery().await;
        assert_eq!(world.unscoped(&delivery.event.stream), expected);
        world
            .subscription()
            .ack(&delivery)
            .await
            .expect("Ack failed");
    }
}

#[then("the closed consumer reports it was closed")]
async fn then_closed_consumer_dropped(world: &mut EventLogWorld) {
    let handle = world.closed.last_mut().expect("No consumer closed");
    match handle.0.recv().await {
        SubscriptionEvent::Dropped { cause } => assert!(cause.contains("closed")),
        SubscriptionEvent::EventAppeared(delivery) => {
            panic!("Closed consumer received revision {}", delivery.event.revision)
        }
    }
}

#[then("the consumer is dropped")]
async fn then_consumer_dropped(world: &mut EventLogWorld) {
    match world.recv().await {
        SubscriptionEvent::Dropped { cause } => assert!(!cause.is_empty()),
        SubscriptionEvent::EventAppeared(delivery) => {
            panic!("Unexpected delivery at revision {}", delivery.event.revision)
        }
    }
}

#[then(expr = "subscribing to group {string} on stream {string} fails with not found")]
async fn then_subscribe_not_found(world: &mut EventLogWorld, group: String, stream: String) {
    let result = world
        .log()
        .subscribe(&world.stream_target(&stream), &world.scoped(&group))
        .await;
    match result {
        Ok(_) => panic!("Subscribing to a missing group succeeded"),
        Err(e) => assert!(e.is_not_found(), "Unexpected error: {}", e),
    }
}
