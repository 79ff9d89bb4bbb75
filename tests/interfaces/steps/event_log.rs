//! Append and read step definitions.

use cucumber::{then, when};
use eventline::error::Error;
use eventline::model::{EventData, ExpectedRevision, ReadOptions, StreamPosition};
use eventline::producer::{ConditionalAppender, ReadOutcome, StreamReader};
use futures::TryStreamExt;

use super::EventLogWorld;

fn test_event() -> EventData {
    EventData::json(
        "TestEvent",
        &serde_json::json!({ "id": "1", "message": "hello" }),
    )
    .expect("Failed to encode event")
}

// --- When steps ---

#[when(expr = "I append an event to {string} expecting no stream")]
async fn when_append_no_stream(world: &mut EventLogWorld, stream: String) {
    let appender = ConditionalAppender::new(world.log());
    let result = appender
        .append(&world.scoped(&stream), ExpectedRevision::NoStream, test_event())
        .await;
    world.last_append = Some(result);
}

#[when(expr = "I append an event to {string} expecting revision {int}")]
async fn when_append_exact(world: &mut EventLogWorld, stream: String, revision: u64) {
    let appender = ConditionalAppender::new(world.log());
    let result = appender
        .append(
            &world.scoped(&stream),
            ExpectedRevision::Exact(revision),
            test_event(),
        )
        .await;
    world.last_append = Some(result);
}

#[when(expr = "I probe the tail of {string}")]
async fn when_probe_tail(world: &mut EventLogWorld, stream: String) {
    let appender = ConditionalAppender::new(world.log());
    let expected = appender
        .tail_revision(&world.scoped(&stream))
        .await
        .expect("Tail probe failed");
    world.last_expected = Some(expected);
}

#[when(expr = "I read {string} forward from the start")]
async fn when_read_forward(world: &mut EventLogWorld, stream: String) {
    let reader = StreamReader::new(world.log());
    let outcome = reader
        .read_to_end(&world.scoped(&stream), ReadOptions::default())
        .await;
    world.forward = Some(outcome.and_then(|o| match o {
        ReadOutcome::Events(events) => Ok(events),
        ReadOutcome::StreamNotFound => Err(Error::StreamNotFound(stream.clone())),
    }));
}

#[when(expr = "I read {int} events of {string} forward from revision {int}")]
async fn when_read_range(world: &mut EventLogWorld, count: usize, stream: String, from: u64) {
    let reader = StreamReader::new(world.log());
    let events = reader
        .read_forward(&world.scoped(&stream), StreamPosition::Revision(from), count)
        .await
        .expect("Read failed")
        .try_collect::<Vec<_>>()
        .await;
    world.forward = Some(events);
}

#[when(expr = "I read {string} backward from the end")]
async fn when_read_backward(world: &mut EventLogWorld, stream: String) {
    let reader = StreamReader::new(world.log());
    let events = reader
        .read_backward(&world.scoped(&stream), StreamPosition::End, usize::MAX)
        .await
        .expect("Read failed")
        .try_collect::<Vec<_>>()
        .await
        .expect("Backward read failed");
    world.backward = Some(events);
}

// --- Then steps ---

#[then(expr = "the append succeeds at revision {int}")]
async fn then_append_succeeds(world: &mut EventLogWorld, revision: u64) {
    match world.last_append.as_ref().expect("No append attempted") {
        Ok(actual) => assert_eq!(*actual, revision),
        Err(e) => panic!("Append failed: {}", e),
    }
}

#[then("the append fails with a concurrency conflict")]
async fn then_append_conflicts(world: &mut EventLogWorld) {
    match world.last_append.as_ref().expect("No append attempted") {
        Ok(revision) => panic!("Append unexpectedly succeeded at {}", revision),
        Err(e) => assert!(e.is_concurrency_conflict(), "Unexpected error: {}", e),
    }
}

#[then("the expected revision is no stream")]
async fn then_expected_no_stream(world: &mut EventLogWorld) {
    assert_eq!(world.last_expected, Some(ExpectedRevision::NoStream));
}

#[then(expr = "the expected revision is {int}")]
async fn then_expected_exact(world: &mut EventLogWorld, revision: u64) {
    assert_eq!(world.last_expected, Some(ExpectedRevision::Exact(revision)));
}

#[then("the stream is reported as not found")]
async fn then_stream_not_found(world: &mut EventLogWorld) {
    match world.forward.as_ref().expect("No read performed") {
        Ok(events) => panic!("Read returned {} events", events.len()),
        Err(e) => assert!(e.is_not_found(), "Unexpected error: {}", e),
    }
}

#[then(expr = "the read returns {int} events starting at revision {int}")]
async fn then_read_returns(world: &mut EventLogWorld, count: usize, first: u64) {
    let events = world
        .forward
        .as_ref()
        .expect("No read performed")
        .as_ref()
        .expect("Read failed");
    let revisions: Vec<u64> = events.iter().map(|e| e.revision).collect();
    let expected: Vec<u64> = (first..first + count as u64).collect();
    assert_eq!(revisions, expected);
}

#[then("the backward read is the reverse of the forward read")]
async fn then_backward_is_reverse(world: &mut EventLogWorld) {
    let forward = world
        .forward
        .as_ref()
        .expect("No forward read performed")
        .as_ref()
        .expect("Forward read failed");
    let mut backward = world.backward.clone().expect("No backward read performed");
    backward.reverse();
    assert!(!forward.is_empty());
    assert_eq!(forward, &backward);
}
