// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push relay adapter trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NotiflyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::Payload;

/// One message addressed to one device token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
}

/// The relay's verdict for a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushReceipt {
    /// Accepted for delivery.
    Ok { id: Option<String> },
    /// The token is no longer valid and should be forgotten.
    DeviceNotRegistered,
    /// Rejected for another reason.
    Error { message: String },
}

/// Adapter for the backend's push notification relay.
///
/// Transport failures are returned as `Err`; per-message rejections come
/// back as a [`PushReceipt`].
#[async_trait]
pub trait PushRelay: PluginAdapter {
    async fn send(&self, message: &PushMessage) -> Result<PushReceipt, NotiflyError>;
}
