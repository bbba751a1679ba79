// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process broadcast channels.
//!
//! Every subscriber of a channel whose event filter matches receives each
//! message, including subscribers owned by the sender.

use std::sync::Mutex;

use async_trait::async_trait;
use notifly_core::traits::pubsub::{ChannelMessage, ChannelStatus, Subscription};
use notifly_core::{AdapterType, HealthStatus, NotiflyError, PluginAdapter, PubSub};
use tokio::sync::mpsc;
use tracing::trace;

struct Subscriber {
    channel: String,
    event: String,
    tx: mpsc::UnboundedSender<ChannelMessage>,
}

impl Subscriber {
    fn wants(&self, channel: &str, event: &str) -> bool {
        self.channel == channel && (self.event == "*" || self.event == event)
    }
}

#[derive(Default)]
pub struct LocalPubSub {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl LocalPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.retain(|s| !s.tx.is_closed());
        subs.iter().filter(|s| s.channel == channel).count()
    }
}

#[async_trait]
impl PluginAdapter for LocalPubSub {
    fn name(&self) -> &str {
        "local-pubsub"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::PubSub
    }

    async fn health_check(&self) -> Result<HealthStatus, NotiflyError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl PubSub for LocalPubSub {
    async fn subscribe(&self, channel: &str, event: &str) -> Result<Subscription, NotiflyError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscriber {
                channel: channel.to_string(),
                event: event.to_string(),
                tx,
            });
        Ok(Subscription {
            status: ChannelStatus::Subscribed,
            messages: rx,
        })
    }

    async fn send(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotiflyError> {
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        // Dropped receivers are pruned as they are discovered.
        subs.retain(|s| !s.tx.is_closed());
        let mut delivered = 0usize;
        for sub in subs.iter().filter(|s| s.wants(channel, event)) {
            let message = ChannelMessage {
                channel: channel.to_string(),
                event: event.to_string(),
                payload: payload.clone(),
            };
            if sub.tx.send(message).is_ok() {
                delivered += 1;
            }
        }
        trace!(channel, event, delivered, "broadcast sent");
        Ok(())
    }
}
