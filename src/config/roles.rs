//! Producer and consumer role configuration.

use std::time::Duration;

use backon::ExponentialBuilder;
use serde::Deserialize;

use crate::model::{
    StreamFilter, StreamPosition, SubscriptionSettings, SubscriptionTarget,
    DEFAULT_MAX_RETRY_COUNT,
};

/// Producer settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Stream the producer appends to.
    pub stream: String,
    /// Bounded retry for concurrency conflicts.
    pub retry: RetryConfig,
    /// Number of events read back after appending.
    pub read_back: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            stream: "some-stream".to_string(),
            retry: RetryConfig::default(),
            read_back: 10,
        }
    }
}

/// Exponential backoff settings for conflict retries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 10,
            max_delay_ms: 2000,
            max_attempts: 10,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.min_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_max_times(self.max_attempts)
            .with_jitter()
    }
}

/// Consumer settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Groups to provision at startup. The first one is consumed.
    pub subscriptions: Vec<SubscriptionConfig>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            subscriptions: vec![
                SubscriptionConfig {
                    stream: Some("some-stream".to_string()),
                    group: "some-stream-group".to_string(),
                    ..Default::default()
                },
                SubscriptionConfig {
                    prefixes: vec!["some-".to_string()],
                    group: "some-all-group".to_string(),
                    ..Default::default()
                },
            ],
        }
    }
}

/// One subscription group.
///
/// With `stream` set, the group follows that stream. Otherwise it follows
/// `$all`, filtered by `prefixes` when any are given.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    pub stream: Option<String>,
    pub prefixes: Vec<String>,
    pub group: String,
    /// `start`, `end`, or `revision: n` for stream groups. `$all` groups
    /// accept `start` and `end` only.
    pub start_from: StreamPosition,
    pub max_retry_count: u32,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            stream: None,
            prefixes: Vec::new(),
            group: String::new(),
            start_from: StreamPosition::Start,
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
        }
    }
}

impl SubscriptionConfig {
    pub fn target(&self) -> SubscriptionTarget {
        match &self.stream {
            Some(stream) => SubscriptionTarget::Stream(stream.clone()),
            None => SubscriptionTarget::All,
        }
    }

    pub fn settings(&self) -> SubscriptionSettings {
        let settings = SubscriptionSettings::default()
            .start_from(self.start_from)
            .max_retry_count(self.max_retry_count);
        if self.stream.is_none() && !self.prefixes.is_empty() {
            settings.filter(StreamFilter::prefixes(self.prefixes.iter().cloned()))
        } else {
            settings
        }
    }
}
