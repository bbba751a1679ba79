// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Badge state, OS badge updates, and the sync listener.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use notifly_config::BadgeConfig;
use notifly_core::traits::pubsub::{ChannelMessage, ChannelStatus};
use notifly_core::types::format_timestamp;
use notifly_core::{BadgeSetter, Clock, NotiflyError, PubSub, RowQuery, RowStore, spawn_periodic};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Backend table whose unread rows make up the badge.
pub const NOTIFICATIONS_TABLE: &str = "notifications";

/// Broadcast event carrying a [`BadgeSyncMessage`].
pub const BADGE_EVENT: &str = "badge_update";

/// Payload broadcast to a user's other devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeSyncMessage {
    pub count: u32,
    pub device_id: String,
    pub timestamp: String,
}

pub struct BadgeManager {
    rows: Arc<dyn RowStore>,
    pubsub: Arc<dyn PubSub>,
    setter: Arc<dyn BadgeSetter>,
    clock: Arc<dyn Clock>,
    user_id: String,
    device_id: String,
    channel: String,
    max_badge: u32,
    count: AtomicU32,
}

impl BadgeManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &BadgeConfig,
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        rows: Arc<dyn RowStore>,
        pubsub: Arc<dyn PubSub>,
        setter: Arc<dyn BadgeSetter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let user_id = user_id.into();
        Self {
            channel: format!("{}:{user_id}", config.channel_prefix),
            rows,
            pubsub,
            setter,
            clock,
            user_id,
            device_id: device_id.into(),
            max_badge: config.max_badge,
            count: AtomicU32::new(0),
        }
    }

    /// The broadcast channel shared by this user's devices.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn current(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    fn clamp(&self, count: u64) -> u32 {
        u32::try_from(count.min(u64::from(self.max_badge))).unwrap_or(self.max_badge)
    }

    async fn apply_os_badge(&self, count: u32) {
        if let Err(e) = self.setter.set_badge_count(count).await {
            warn!(count, error = %e, "failed to set OS badge");
        }
    }

    async fn broadcast(&self, count: u32) {
        let message = BadgeSyncMessage {
            count,
            device_id: self.device_id.clone(),
            timestamp: format_timestamp(self.clock.now()),
        };
        let payload = match serde_json::to_value(&message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode badge sync message");
                return;
            }
        };
        if let Err(e) = self.pubsub.send(&self.channel, BADGE_EVENT, payload).await {
            warn!(channel = %self.channel, error = %e, "badge broadcast failed");
        }
    }

    /// Recount unread notifications, then update the OS badge and the
    /// user's other devices.
    ///
    /// A failed count keeps the current value.
    pub async fn update_badge_count(&self) -> u32 {
        let query = RowQuery::table(NOTIFICATIONS_TABLE)
            .eq("user_id", self.user_id.as_str())
            .eq("read", false);
        let unread = match self.rows.count(&query).await {
            Ok(unread) => unread,
            Err(e) => {
                warn!(user_id = %self.user_id, error = %e, "failed to count unread notifications");
                return self.current();
            }
        };
        let count = self.clamp(unread);
        self.count.store(count, Ordering::SeqCst);
        debug!(unread, count, "badge recounted");
        self.apply_os_badge(count).await;
        self.broadcast(count).await;
        count
    }

    /// Apply a count broadcast by another device. Returns whether it was applied.
    pub async fn handle_badge_sync(&self, message: &BadgeSyncMessage) -> bool {
        if message.device_id == self.device_id {
            return false;
        }
        let count = self.clamp(u64::from(message.count));
        self.count.store(count, Ordering::SeqCst);
        debug!(from = %message.device_id, count, "badge synced from another device");
        self.apply_os_badge(count).await;
        true
    }

    async fn adjust(&self, f: impl Fn(u32) -> u32) -> u32 {
        let previous = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some(f(c)))
            .unwrap_or_else(|c| c);
        let count = f(previous);
        self.apply_os_badge(count).await;
        count
    }

    /// Optimistically add `n`, saturating at the maximum badge value.
    pub async fn increment(&self, n: u32) -> u32 {
        let max = self.max_badge;
        self.adjust(|c| c.saturating_add(n).min(max)).await
    }

    /// Optimistically subtract `n`, saturating at zero.
    pub async fn decrement(&self, n: u32) -> u32 {
        self.adjust(|c| c.saturating_sub(n)).await
    }

    /// Reset to zero here and on the user's other devices.
    pub async fn clear(&self) {
        self.count.store(0, Ordering::SeqCst);
        self.apply_os_badge(0).await;
        self.broadcast(0).await;
    }

    /// Recount every `period` until `cancel` fires, overwriting whatever the
    /// optimistic adjustments left behind.
    pub fn spawn_refresh(self: Arc<Self>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        spawn_periodic("badge-refresh", period, cancel, move || {
            let badge = self.clone();
            async move {
                badge.update_badge_count().await;
            }
        })
    }

    /// Subscribe to the user's badge channel and apply updates from other
    /// devices until `cancel` fires or the channel closes.
    pub async fn spawn_sync_listener(
        self: Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, NotiflyError> {
        let mut subscription = self.pubsub.subscribe(&self.channel, BADGE_EVENT).await?;
        if subscription.status != ChannelStatus::Subscribed {
            return Err(NotiflyError::backend(
                format!("badge channel {} reported {}", self.channel, subscription.status),
                true,
            ));
        }
        info!(channel = %self.channel, "badge sync listener subscribed");

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    message = subscription.messages.recv() => {
                        let Some(message) = message else {
                            warn!(channel = %self.channel, "badge channel closed");
                            break;
                        };
                        self.on_channel_message(&message).await;
                    }
                }
            }
            debug!(channel = %self.channel, "badge sync listener stopped");
        }))
    }

    async fn on_channel_message(&self, message: &ChannelMessage) {
        match serde_json::from_value::<BadgeSyncMessage>(message.payload.clone()) {
            Ok(sync) => {
                self.handle_badge_sync(&sync).await;
            }
            Err(e) => warn!(channel = %message.channel, error = %e, "ignoring malformed badge message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notifly_test_utils::{FlakyRowStore, LocalPubSub, RecordingBadgeSetter, fixed_clock, row};
    use serde_json::json;

    struct Fixture {
        rows: Arc<FlakyRowStore>,
        pubsub: Arc<LocalPubSub>,
        setter: Arc<RecordingBadgeSetter>,
        badge: Arc<BadgeManager>,
    }

    fn fixture(max_badge: u32) -> Fixture {
        let rows = Arc::new(FlakyRowStore::new());
        let pubsub = Arc::new(LocalPubSub::new());
        let setter = Arc::new(RecordingBadgeSetter::new());
        let config = BadgeConfig {
            max_badge,
            ..BadgeConfig::default()
        };
        let badge = Arc::new(BadgeManager::new(
            &config,
            "u1",
            "phone",
            rows.clone(),
            pubsub.clone(),
            setter.clone(),
            fixed_clock(),
        ));
        Fixture {
            rows,
            pubsub,
            setter,
            badge,
        }
    }

    fn seed_unread(rows: &FlakyRowStore, n: usize) {
        rows.inner().seed(
            NOTIFICATIONS_TABLE,
            (0..n).map(|i| row(json!({"id": format!("n{i}"), "user_id": "u1", "read": false}))),
        );
        rows.inner().seed(
            NOTIFICATIONS_TABLE,
            [
                row(json!({"id": "r1", "user_id": "u1", "read": true})),
                row(json!({"id": "o1", "user_id": "u2", "read": false})),
            ],
        );
    }

    #[tokio::test]
    async fn recount_sets_badge_and_broadcasts() {
        let f = fixture(99);
        seed_unread(&f.rows, 3);
        let mut peer = f.pubsub.subscribe("badge:u1", BADGE_EVENT).await.unwrap();

        assert_eq!(f.badge.update_badge_count().await, 3);
        assert_eq!(f.setter.last().await, Some(3));
        let message = peer.messages.recv().await.unwrap();
        let sync: BadgeSyncMessage = serde_json::from_value(message.payload).unwrap();
        assert_eq!(
            sync,
            BadgeSyncMessage {
                count: 3,
                device_id: "phone".into(),
                timestamp: "2026-05-01T12:00:00.000Z".into(),
            }
        );
    }

    #[tokio::test]
    async fn count_is_clamped() {
        let f = fixture(2);
        seed_unread(&f.rows, 5);
        assert_eq!(f.badge.update_badge_count().await, 2);
        assert_eq!(f.badge.increment(10).await, 2);
    }

    #[tokio::test]
    async fn optimistic_changes_saturate() {
        let f = fixture(99);
        assert_eq!(f.badge.increment(2).await, 2);
        assert_eq!(f.badge.decrement(5).await, 0);
        assert_eq!(f.setter.values().await, vec![2, 0]);
    }

    #[tokio::test]
    async fn own_broadcasts_are_ignored() {
        let f = fixture(99);
        let own = BadgeSyncMessage {
            count: 7,
            device_id: "phone".into(),
            timestamp: String::new(),
        };
        assert!(!f.badge.handle_badge_sync(&own).await);
        assert_eq!(f.badge.current(), 0);

        let other = BadgeSyncMessage {
            device_id: "tablet".into(),
            ..own
        };
        assert!(f.badge.handle_badge_sync(&other).await);
        assert_eq!(f.badge.current(), 7);
        assert_eq!(f.setter.last().await, Some(7));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn failures_are_logged_not_raised() {
        let f = fixture(99);
        f.badge.increment(4).await;
        f.rows.fail_table(NOTIFICATIONS_TABLE);
        f.setter.set_failing(true);
        assert_eq!(f.badge.update_badge_count().await, 4);
        f.badge.clear().await;
        assert_eq!(f.badge.current(), 0);
        assert!(logs_contain("failed to count unread notifications"));
        assert!(logs_contain("failed to set OS badge"));
    }

    #[tokio::test]
    async fn recount_sees_rows_added_by_the_backend() {
        let f = fixture(99);
        seed_unread(&f.rows, 1);
        assert_eq!(f.badge.update_badge_count().await, 1);

        f.rows.inner().seed(
            NOTIFICATIONS_TABLE,
            [row(json!({"id": "late", "user_id": "u1", "read": false}))],
        );
        assert_eq!(f.badge.update_badge_count().await, 2);
    }

    #[tokio::test]
    async fn refresh_loop_reconciles_optimistic_drift() {
        let f = fixture(99);
        seed_unread(&f.rows, 2);
        f.badge.increment(5).await;
        assert_eq!(f.badge.current(), 5);

        let cancel = CancellationToken::new();
        let handle = f
            .badge
            .clone()
            .spawn_refresh(Duration::from_millis(10), cancel.clone());
        for _ in 0..100 {
            if f.badge.current() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(f.badge.current(), 2);
        assert_eq!(f.setter.last().await, Some(2));
    }

    #[tokio::test]
    async fn listener_applies_peer_updates_until_cancelled() {
        let f = fixture(99);
        let cancel = CancellationToken::new();
        let handle = f.badge.clone().spawn_sync_listener(cancel.clone()).await.unwrap();

        // A second device of the same user.
        let tablet = BadgeManager::new(
            &BadgeConfig::default(),
            "u1",
            "tablet",
            f.rows.clone(),
            f.pubsub.clone(),
            Arc::new(RecordingBadgeSetter::new()),
            fixed_clock(),
        );
        seed_unread(&f.rows, 4);
        tablet.update_badge_count().await;

        for _ in 0..100 {
            if f.badge.current() == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(f.badge.current(), 4);

        // Malformed payloads are skipped.
        f.pubsub
            .send("badge:u1", BADGE_EVENT, json!({"count": "many"}))
            .await
            .unwrap();

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(f.badge.current(), 4);
    }
}
