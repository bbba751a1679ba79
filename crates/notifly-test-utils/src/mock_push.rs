// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock push relay for deterministic testing.
//!
//! `MockPushRelay` answers from per-token scripts and captures every message
//! it was asked to send.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use notifly_core::traits::push::{PushMessage, PushReceipt};
use notifly_core::{AdapterType, HealthStatus, NotiflyError, PluginAdapter, PushRelay};

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Scripted {
    Receipt(PushReceipt),
    /// The relay is unreachable; surfaces as a retryable delivery error.
    Unreachable(String),
}

/// A push relay that accepts everything unless told otherwise.
///
/// Per-token scripts are consumed front to back; once a token's script is
/// empty its sticky answer (if any) applies, then the default `Ok` receipt.
pub struct MockPushRelay {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Scripted>>>>,
    sticky: Arc<Mutex<HashMap<String, Scripted>>>,
    sent: Arc<Mutex<Vec<PushMessage>>>,
}

impl MockPushRelay {
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(Mutex::new(HashMap::new())),
            sticky: Arc::new(Mutex::new(HashMap::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer the next send to `token` with `answer`.
    pub async fn script(&self, token: &str, answer: Scripted) {
        self.scripts
            .lock()
            .await
            .entry(token.to_string())
            .or_default()
            .push_back(answer);
    }

    /// Answer every send to `token` with `answer` once its script is used up.
    pub async fn always(&self, token: &str, answer: Scripted) {
        self.sticky.lock().await.insert(token.to_string(), answer);
    }

    /// Every message passed to `send()`, in order.
    pub async fn sent_messages(&self) -> Vec<PushMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }
}

impl Default for MockPushRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockPushRelay {
    fn name(&self) -> &str {
        "mock-push"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::PushRelay
    }

    async fn health_check(&self) -> Result<HealthStatus, NotiflyError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl PushRelay for MockPushRelay {
    async fn send(&self, message: &PushMessage) -> Result<PushReceipt, NotiflyError> {
        self.sent.lock().await.push(message.clone());

        let scripted = self
            .scripts
            .lock()
            .await
            .get_mut(&message.to)
            .and_then(VecDeque::pop_front);
        let answer = match scripted {
            Some(answer) => Some(answer),
            None => self.sticky.lock().await.get(&message.to).cloned(),
        };

        match answer {
            None => Ok(PushReceipt::Ok {
                id: Some(format!("mock-ticket-{}", self.sent.lock().await.len())),
            }),
            Some(Scripted::Receipt(receipt)) => Ok(receipt),
            Some(Scripted::Unreachable(message)) => Err(NotiflyError::Delivery { message }),
        }
    }
}
