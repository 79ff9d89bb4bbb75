//! Eventline - event-log client layer
//!
//! Conditional appends, ranged stream reads and ack-tracked persistent
//! subscriptions over an external event-log service, with an in-process
//! log for development and tests.

pub mod codec;
pub mod config;
pub mod consumer;
pub mod demo;
pub mod error;
pub mod events;
pub mod interfaces;
pub mod model;
pub mod producer;
pub mod storage;
pub mod utils;

pub use error::{Error, Result};
