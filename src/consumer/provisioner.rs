//! Idempotent subscription group provisioning.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ConsumerConfig;
use crate::error::Result;
use crate::interfaces::EventLog;
use crate::model::{StreamFilter, SubscriptionSettings, SubscriptionTarget};

/// Outcome of ensuring a group exists. Both are success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    AlreadyExisted,
}

/// Ensures durable subscription groups exist.
#[derive(Clone)]
pub struct SubscriptionProvisioner {
    log: Arc<dyn EventLog>,
}

impl SubscriptionProvisioner {
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self { log }
    }

    /// Create the group unless it already exists.
    ///
    /// An existing group keeps its original settings.
    pub async fn ensure(
        &self,
        target: &SubscriptionTarget,
        group: &str,
        settings: &SubscriptionSettings,
    ) -> Result<Provisioned> {
        match self.log.create_subscription(target, group, settings).await {
            Ok(()) => {
                info!(subscription = %target, group = %group, "Subscription group created");
                Ok(Provisioned::Created)
            }
            Err(e) if e.is_already_exists() => {
                debug!(subscription = %target, group = %group, "Subscription group already exists");
                Ok(Provisioned::AlreadyExisted)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ensure a group on a single stream, starting from its beginning.
    pub async fn ensure_stream_group(&self, stream: &str, group: &str) -> Result<Provisioned> {
        self.ensure(
            &SubscriptionTarget::stream(stream),
            group,
            &SubscriptionSettings::default(),
        )
        .await
    }

    /// Ensure a group on `$all`, restricted to streams matching `prefixes`.
    pub async fn ensure_all_group<I, S>(&self, group: &str, prefixes: I) -> Result<Provisioned>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let settings = SubscriptionSettings::default().filter(StreamFilter::prefixes(prefixes));
        self.ensure(&SubscriptionTarget::All, group, &settings).await
    }

    /// Ensure every configured group, in order.
    pub async fn ensure_configured(&self, config: &ConsumerConfig) -> Result<Vec<Provisioned>> {
        let mut outcomes = Vec::with_capacity(config.subscriptions.len());
        for subscription in &config.subscriptions {
            let outcome = self
                .ensure(
                    &subscription.target(),
                    &subscription.group,
                    &subscription.settings(),
                )
                .await?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
