// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The queue's send operation.
//!
//! Checks run in order: category toggle, quiet hours, push-send window,
//! active tokens. Each device gets its own relay request, sent concurrently;
//! a token the relay no longer recognizes is pruned.

use std::sync::Arc;

use async_trait::async_trait;
use chrono_tz::Tz;
use futures::future::join_all;
use notifly_badge::BadgeManager;
use notifly_cache::{RateDecision, RateLimitedOperation, RateLimiter};
use notifly_core::traits::push::{PushMessage, PushReceipt};
use notifly_core::{Clock, NotiflyError, PendingDelivery, Priority, PushRelay};
use notifly_prefs::{SettingsService, TokenStore, next_available_time};
use notifly_queue::{DeferReason, DeliveryOutcome, DeliverySender, DeliveryStats};
use serde_json::Value;
use tracing::{debug, info, warn};

pub struct PushDispatcher {
    settings: Arc<SettingsService>,
    tokens: Arc<TokenStore>,
    relay: Arc<dyn PushRelay>,
    limiter: Arc<RateLimiter>,
    stats: Arc<DeliveryStats>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    sound: Option<String>,
    badge: Option<Arc<BadgeManager>>,
    local_user: Option<String>,
}

impl PushDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Arc<SettingsService>,
        tokens: Arc<TokenStore>,
        relay: Arc<dyn PushRelay>,
        limiter: Arc<RateLimiter>,
        stats: Arc<DeliveryStats>,
        clock: Arc<dyn Clock>,
        timezone: Tz,
        sound: Option<String>,
    ) -> Self {
        Self {
            settings,
            tokens,
            relay,
            limiter,
            stats,
            clock,
            timezone,
            sound,
            badge: None,
            local_user: None,
        }
    }

    /// Bump `badge` whenever a delivery to `local_user` succeeds.
    pub fn with_badge(mut self, badge: Arc<BadgeManager>, local_user: impl Into<String>) -> Self {
        self.badge = Some(badge);
        self.local_user = Some(local_user.into());
        self
    }

    fn is_local(&self, user_id: &str) -> bool {
        self.local_user.as_deref() == Some(user_id)
    }

    fn message_for(&self, item: &PendingDelivery, token: &str) -> PushMessage {
        let mut data = item.payload.clone();
        data.insert("delivery_id".into(), Value::String(item.id.clone()));
        data.insert("category".into(), Value::String(item.category.to_string()));
        let badge = match &self.badge {
            Some(badge) if self.is_local(&item.user_id) => Some(badge.current().saturating_add(1)),
            _ => None,
        };
        PushMessage {
            to: token.to_string(),
            title: item.title.clone(),
            body: item.body.clone(),
            data,
            badge,
            sound: self.sound.clone(),
        }
    }

    async fn dispatch(&self, item: &PendingDelivery) -> Result<DeliveryOutcome, NotiflyError> {
        let settings = self.settings.get_settings(&item.user_id).await?;
        if !settings.category_enabled(item.category) {
            debug!(id = %item.id, category = %item.category, "category disabled, dropping");
            return Ok(DeliveryOutcome::Suppressed);
        }

        if item.priority < Priority::Urgent {
            let now = self.clock.now();
            match next_available_time(&settings, now, self.timezone) {
                Ok(until) if until > now => {
                    return Ok(DeliveryOutcome::Deferred {
                        until,
                        reason: DeferReason::QuietHours,
                    });
                }
                Ok(_) => {}
                // Stored settings the user can no longer fix from here.
                Err(e) => warn!(user_id = %item.user_id, error = %e, "ignoring malformed quiet hours"),
            }
        }

        if let RateDecision::Denied { retry_at } =
            self.limiter.check(RateLimitedOperation::PushSend, &item.user_id)
        {
            return Ok(DeliveryOutcome::Deferred {
                until: retry_at,
                reason: DeferReason::RateLimited,
            });
        }

        let tokens = self.tokens.active_tokens(&item.user_id).await?;
        if tokens.is_empty() {
            debug!(id = %item.id, user_id = %item.user_id, "no active push tokens");
            return Ok(DeliveryOutcome::NoTargets);
        }

        let receipts = join_all(tokens.iter().map(|token| {
            let message = self.message_for(item, &token.token);
            async move { (token, self.relay.send(&message).await) }
        }))
        .await;

        let mut delivered = 0usize;
        let mut invalidated = 0u64;
        let mut last_error = None;
        for (token, receipt) in receipts {
            match receipt {
                Ok(PushReceipt::Ok { id }) => {
                    delivered += 1;
                    record_receipt("ok");
                    debug!(device_id = %token.device_id, ticket = ?id, "push accepted");
                }
                Ok(PushReceipt::DeviceNotRegistered) => {
                    invalidated += 1;
                    record_receipt("device_not_registered");
                    info!(device_id = %token.device_id, "push token no longer registered, removing");
                    if let Err(e) = self.tokens.remove_token(&token.token).await {
                        warn!(device_id = %token.device_id, error = %e, "failed to remove stale push token");
                    }
                }
                Ok(PushReceipt::Error { message }) => {
                    record_receipt("error");
                    warn!(device_id = %token.device_id, error = %message, "push rejected");
                    last_error = Some(message);
                }
                Err(e) => {
                    record_receipt("unreachable");
                    warn!(device_id = %token.device_id, error = %e, "push relay request failed");
                    last_error = Some(e.to_string());
                }
            }
        }
        self.stats.record_push(tokens.len() as u64, invalidated);

        if delivered == 0 {
            return Err(NotiflyError::Delivery {
                message: match last_error {
                    Some(e) => format!("no device accepted the push: {e}"),
                    None => "every push token was rejected as unregistered".into(),
                },
            });
        }

        if let Some(badge) = &self.badge
            && self.is_local(&item.user_id)
        {
            badge.increment(1).await;
        }
        Ok(DeliveryOutcome::Delivered { targets: delivered })
    }
}

#[async_trait]
impl DeliverySender for PushDispatcher {
    async fn send(&self, item: &PendingDelivery) -> Result<DeliveryOutcome, NotiflyError> {
        let outcome = self.dispatch(item).await;
        #[cfg(feature = "prometheus")]
        notifly_prometheus::record_outcome(match &outcome {
            Ok(DeliveryOutcome::Delivered { .. }) => "delivered",
            Ok(DeliveryOutcome::NoTargets) => "no_targets",
            Ok(DeliveryOutcome::Suppressed) => "suppressed",
            Ok(DeliveryOutcome::Deferred { .. }) => "deferred",
            Err(_) => "failed",
        });
        outcome
    }
}

#[cfg(feature = "prometheus")]
fn record_receipt(status: &'static str) {
    notifly_prometheus::record_push_receipt(status);
}

#[cfg(not(feature = "prometheus"))]
fn record_receipt(_status: &'static str) {}
