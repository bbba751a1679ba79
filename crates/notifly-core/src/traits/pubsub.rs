// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime pub/sub channel adapter trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::mpsc;

use crate::error::NotiflyError;
use crate::traits::adapter::PluginAdapter;

/// Subscription status reported by the channel on join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelStatus {
    Subscribed,
    TimedOut,
    Closed,
    ChannelError,
}

/// A broadcast received on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel: String,
    pub event: String,
    pub payload: serde_json::Value,
}

/// A live subscription: the join status plus the stream of matching messages.
///
/// Dropping the receiver ends the subscription.
#[derive(Debug)]
pub struct Subscription {
    pub status: ChannelStatus,
    pub messages: mpsc::UnboundedReceiver<ChannelMessage>,
}

/// Adapter for named broadcast channels.
#[async_trait]
pub trait PubSub: PluginAdapter {
    /// Join `channel` and receive messages whose event equals `event`
    /// (`"*"` receives every event).
    async fn subscribe(&self, channel: &str, event: &str) -> Result<Subscription, NotiflyError>;

    /// Broadcast `payload` as `event` on `channel`.
    async fn send(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotiflyError>;
}
