// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builds every pipeline component once and runs the background loops.

use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use notifly_backend::{ExpoPushRelay, LocalPubSub, LogBadgeSetter, MemoryRowStore, RestRowStore};
use notifly_badge::{BadgeManager, NOTIFICATIONS_TABLE};
use notifly_cache::{CacheRegistry, CachedRowStore, RateLimiter};
use notifly_config::NotiflyConfig;
use notifly_config::model::DeviceConfig;
use notifly_core::traits::kv::{load_json, save_json};
use notifly_core::types::format_timestamp;
use notifly_core::{
    BadgeSetter, Clock, KvStore, NewDelivery, NotiflyError, PendingDelivery, Priority, PubSub,
    PushRelay, Row, RowQuery, RowStore, SystemClock,
};
use notifly_monitor::{MetricSample, MetricsSampler, Monitor, MonitorTick};
use notifly_prefs::{SettingsService, TokenStore, next_available_time};
use notifly_queue::{DeliveryStats, QueueManager, QueueStatus};
use notifly_storage::SqliteKvStore;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::PushDispatcher;

/// Key holding the generated device id when none is configured.
pub const DEVICE_ID_KEY: &str = "device.id";

/// The external collaborators the pipeline runs against.
pub struct PipelineAdapters {
    pub rows: Arc<dyn RowStore>,
    pub kv: Arc<dyn KvStore>,
    pub pubsub: Arc<dyn PubSub>,
    pub relay: Arc<dyn PushRelay>,
    pub badge_setter: Arc<dyn BadgeSetter>,
    pub clock: Arc<dyn Clock>,
}

impl PipelineAdapters {
    /// Production adapters: the REST backend when `backend.url` is set
    /// (otherwise an in-memory row store), SQLite for local state, and the
    /// configured push relay.
    pub async fn from_config(config: &NotiflyConfig) -> Result<Self, NotiflyError> {
        let rows: Arc<dyn RowStore> = if config.backend.url.is_some() {
            Arc::new(RestRowStore::new(&config.backend)?)
        } else {
            warn!("backend.url is not set, using an in-memory row store");
            Arc::new(MemoryRowStore::new())
        };
        Ok(Self {
            rows,
            kv: Arc::new(SqliteKvStore::open(config.storage.clone()).await?),
            pubsub: Arc::new(LocalPubSub::new()),
            relay: Arc::new(ExpoPushRelay::new(&config.push)?),
            badge_setter: Arc::new(LogBadgeSetter::new()),
            clock: Arc::new(SystemClock),
        })
    }
}

/// Point-in-time view for `notifly status`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub device_id: String,
    pub user_id: Option<String>,
    pub queue: QueueStatus,
    pub open_alerts: usize,
    pub badge: Option<u32>,
    pub latest_sample: Option<MetricSample>,
}

/// Handles of the spawned loops.
pub struct RunningPipeline {
    handles: Vec<JoinHandle<()>>,
}

impl RunningPipeline {
    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every loop to stop.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "pipeline task ended abnormally");
            }
        }
    }
}

pub struct NotificationPipeline {
    query_rows: Arc<dyn RowStore>,
    badge_refresh: Duration,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    user_id: Option<String>,
    device_id: String,
    monitor_enabled: bool,
    cache: Arc<CacheRegistry>,
    settings: Arc<SettingsService>,
    tokens: Arc<TokenStore>,
    queue: Arc<QueueManager>,
    dispatcher: Arc<PushDispatcher>,
    monitor: Arc<Monitor>,
    badge: Option<Arc<BadgeManager>>,
}

impl NotificationPipeline {
    /// Wire the pipeline over `adapters`. Nothing runs until [`start`](Self::start).
    pub async fn new(config: &NotiflyConfig, adapters: PipelineAdapters) -> Result<Self, NotiflyError> {
        let PipelineAdapters {
            rows,
            kv,
            pubsub,
            relay,
            badge_setter,
            clock,
        } = adapters;

        let timezone: Tz = config.device.timezone.parse().map_err(|e| {
            NotiflyError::Config(format!("device.timezone `{}`: {e}", config.device.timezone))
        })?;
        let device_id = resolve_device_id(&config.device, kv.as_ref()).await?;
        let user_id = config.device.user_id.clone();

        let cache = Arc::new(CacheRegistry::new(&config.cache, clock.clone()));
        let query_rows: Arc<dyn RowStore> = Arc::new(CachedRowStore::new(rows.clone(), cache.clone()));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone(), clock.clone()));
        let stats = Arc::new(DeliveryStats::new());
        let settings = Arc::new(SettingsService::new(
            rows.clone(),
            cache.clone(),
            limiter.clone(),
            clock.clone(),
        ));
        let tokens = Arc::new(TokenStore::new(
            rows.clone(),
            cache.clone(),
            limiter.clone(),
            clock.clone(),
        ));
        let queue = Arc::new(QueueManager::new(
            kv.clone(),
            &config.queue,
            clock.clone(),
            stats.clone(),
        ));

        let badge = match (&user_id, config.badge.enabled) {
            (Some(user), true) => Some(Arc::new(BadgeManager::new(
                &config.badge,
                user.as_str(),
                device_id.as_str(),
                rows.clone(),
                pubsub,
                badge_setter,
                clock.clone(),
            ))),
            (None, true) => {
                info!("device.user_id is not set, badge sync disabled");
                None
            }
            _ => None,
        };

        let mut dispatcher = PushDispatcher::new(
            settings.clone(),
            tokens.clone(),
            relay,
            limiter,
            stats.clone(),
            clock.clone(),
            timezone,
            config.push.sound.clone(),
        );
        if let (Some(badge), Some(user)) = (&badge, &user_id) {
            dispatcher = dispatcher.with_badge(badge.clone(), user.as_str());
        }

        let sampler = MetricsSampler::new(
            rows.clone(),
            stats,
            clock.clone(),
            config.monitor.sample_window(),
        );
        let monitor = Arc::new(Monitor::new(&config.monitor, sampler, kv, clock.clone()));

        Ok(Self {
            query_rows,
            badge_refresh: config.badge.refresh_interval(),
            clock,
            timezone,
            user_id,
            device_id,
            monitor_enabled: config.monitor.enabled,
            cache,
            settings,
            tokens,
            queue,
            dispatcher: Arc::new(dispatcher),
            monitor,
            badge,
        })
    }

    /// Build over the production adapters.
    pub async fn from_config(config: &NotiflyConfig) -> Result<Self, NotiflyError> {
        let adapters = PipelineAdapters::from_config(config).await?;
        Self::new(config, adapters).await
    }

    /// Restore persisted state without starting any loop.
    pub async fn load(&self) -> Result<(), NotiflyError> {
        let (pending, failed) = self.queue.load().await?;
        self.monitor.load().await?;
        info!(pending, failed, "pipeline state restored");
        Ok(())
    }

    /// Queue a notification.
    ///
    /// Disabled categories are rejected. Non-urgent items submitted during
    /// quiet hours are scheduled for the end of the quiet period.
    pub async fn submit(&self, mut delivery: NewDelivery) -> Result<PendingDelivery, NotiflyError> {
        let settings = self.settings.get_settings(&delivery.user_id).await?;
        if !settings.category_enabled(delivery.category) {
            return Err(NotiflyError::Validation(format!(
                "{} notifications are disabled for user {}",
                delivery.category, delivery.user_id
            )));
        }

        if delivery.priority < Priority::Urgent {
            let now = self.clock.now();
            let from = delivery.scheduled_for.map_or(now, |at| at.max(now));
            match next_available_time(&settings, from, self.timezone) {
                Ok(until) if until > from => {
                    debug!(user_id = %delivery.user_id, until = %until, "submitted during quiet hours");
                    delivery.scheduled_for = Some(until);
                }
                Ok(_) => {}
                Err(e) => warn!(user_id = %delivery.user_id, error = %e, "ignoring malformed quiet hours"),
            }
        }

        self.queue.enqueue(delivery).await
    }

    /// Mark the local user's notifications `ids` read and lower the badge.
    /// Returns how many were unread.
    pub async fn mark_read(&self, ids: &[String]) -> Result<u64, NotiflyError> {
        let Some(user_id) = &self.user_id else {
            return Err(NotiflyError::Config(
                "device.user_id must be set to mark notifications read".into(),
            ));
        };
        if ids.is_empty() {
            return Ok(0);
        }

        let query = RowQuery::table(NOTIFICATIONS_TABLE)
            .eq("user_id", user_id.as_str())
            .eq("read", false)
            .in_list("id", ids.iter().map(String::as_str));
        let mut patch = Row::new();
        patch.insert("read".into(), Value::Bool(true));
        patch.insert(
            "read_at".into(),
            Value::String(format_timestamp(self.clock.now())),
        );
        let updated = self.query_rows.update(&query, patch).await?;

        if updated > 0
            && let Some(badge) = &self.badge
        {
            badge
                .decrement(u32::try_from(updated).unwrap_or(u32::MAX))
                .await;
        }
        debug!(requested = ids.len(), updated, "notifications marked read");
        Ok(updated)
    }

    /// Unread notifications of the local user, served from the query cache.
    ///
    /// May lag the backend by up to the query TTL; reads made for the badge
    /// bypass the cache.
    pub async fn unread_count(&self) -> Result<u64, NotiflyError> {
        let Some(user_id) = &self.user_id else {
            return Err(NotiflyError::Config(
                "device.user_id must be set to count unread notifications".into(),
            ));
        };
        let query = RowQuery::table(NOTIFICATIONS_TABLE)
            .eq("user_id", user_id.as_str())
            .eq("read", false);
        self.query_rows.count(&query).await
    }

    /// Restore state and spawn the queue loop, the monitor loop, and the
    /// badge refresh and sync loops. Every loop stops when `cancel` fires.
    pub async fn start(&self, cancel: CancellationToken) -> Result<RunningPipeline, NotiflyError> {
        self.load().await?;

        let mut handles = vec![
            self.queue
                .clone()
                .spawn(self.dispatcher.clone(), cancel.clone()),
        ];

        if self.monitor_enabled {
            let observe = monitor_observer(self.queue.clone(), self.badge.clone());
            handles.push(self.monitor.clone().spawn(cancel.clone(), observe));
        }

        if let Some(badge) = &self.badge {
            badge.update_badge_count().await;
            handles.push(badge.clone().spawn_refresh(self.badge_refresh, cancel.clone()));
            match badge.clone().spawn_sync_listener(cancel.clone()).await {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!(error = %e, "badge sync unavailable"),
            }
        }

        info!(
            device_id = %self.device_id,
            tasks = handles.len(),
            "notification pipeline started"
        );
        Ok(RunningPipeline { handles })
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            device_id: self.device_id.clone(),
            user_id: self.user_id.clone(),
            queue: self.queue.status(),
            open_alerts: self.monitor.open_alerts().len(),
            badge: self.badge.as_ref().map(|b| b.current()),
            latest_sample: self.monitor.latest(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn queue(&self) -> &Arc<QueueManager> {
        &self.queue
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    pub fn settings(&self) -> &Arc<SettingsService> {
        &self.settings
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn badge(&self) -> Option<&Arc<BadgeManager>> {
        self.badge.as_ref()
    }

    pub fn cache(&self) -> &Arc<CacheRegistry> {
        &self.cache
    }

    pub fn dispatcher(&self) -> &Arc<PushDispatcher> {
        &self.dispatcher
    }
}

async fn resolve_device_id(device: &DeviceConfig, kv: &dyn KvStore) -> Result<String, NotiflyError> {
    if let Some(id) = &device.device_id {
        return Ok(id.clone());
    }
    if let Some(id) = load_json::<String>(kv, DEVICE_ID_KEY).await? {
        return Ok(id);
    }
    let id = uuid::Uuid::new_v4().to_string();
    save_json(kv, DEVICE_ID_KEY, &id).await?;
    info!(device_id = %id, "generated device id");
    Ok(id)
}

fn monitor_observer(
    queue: Arc<QueueManager>,
    badge: Option<Arc<BadgeManager>>,
) -> impl Fn(&MonitorTick) + Send + Sync + 'static {
    move |tick| {
        let status = queue.status();
        let badge_count = badge.as_ref().map(|b| b.current());
        debug!(
            pending = status.pending,
            failed = status.failed,
            fired = tick.fired.len(),
            badge = ?badge_count,
            "monitor pass"
        );

        #[cfg(feature = "prometheus")]
        {
            notifly_prometheus::set_queue_depth(status.pending, status.failed);
            for (metric, value) in &tick.sample.values {
                notifly_prometheus::set_metric_value(&metric.to_string(), *value);
            }
            for alert in &tick.fired {
                notifly_prometheus::record_alert(&alert.rule, &alert.severity.to_string());
            }
            if let Some(count) = badge_count {
                notifly_prometheus::set_badge_count(count);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notifly_core::{ManualClock, MemoryKvStore, NotificationCategory};
    use notifly_test_utils::{
        LocalPubSub, MemoryRowStore, MockPushRelay, RecordingBadgeSetter, fixed_clock, row,
    };
    use serde_json::json;

    struct Fixture {
        pipeline: NotificationPipeline,
        rows: Arc<MemoryRowStore>,
        kv: Arc<MemoryKvStore>,
        setter: Arc<RecordingBadgeSetter>,
        clock: Arc<ManualClock>,
    }

    async fn fixture(config: NotiflyConfig) -> Fixture {
        let rows = Arc::new(MemoryRowStore::new());
        let kv = Arc::new(MemoryKvStore::new());
        let setter = Arc::new(RecordingBadgeSetter::new());
        let clock = fixed_clock();
        let pipeline = NotificationPipeline::new(
            &config,
            PipelineAdapters {
                rows: rows.clone(),
                kv: kv.clone(),
                pubsub: Arc::new(LocalPubSub::new()),
                relay: Arc::new(MockPushRelay::new()),
                badge_setter: setter.clone(),
                clock: clock.clone(),
            },
        )
        .await
        .unwrap();
        Fixture {
            pipeline,
            rows,
            kv,
            setter,
            clock,
        }
    }

    fn config_for(user: &str) -> NotiflyConfig {
        let mut config = NotiflyConfig::default();
        config.device.user_id = Some(user.into());
        config
    }

    #[tokio::test]
    async fn device_id_is_generated_once() {
        let f = fixture(NotiflyConfig::default()).await;
        let generated = f.pipeline.device_id().to_string();
        assert!(!generated.is_empty());
        let stored: Option<String> = load_json(f.kv.as_ref(), DEVICE_ID_KEY).await.unwrap();
        assert_eq!(stored.as_deref(), Some(generated.as_str()));

        let again = resolve_device_id(&DeviceConfig::default(), f.kv.as_ref())
            .await
            .unwrap();
        assert_eq!(again, generated);

        let configured = DeviceConfig {
            device_id: Some("phone-1".into()),
            ..DeviceConfig::default()
        };
        assert_eq!(
            resolve_device_id(&configured, f.kv.as_ref()).await.unwrap(),
            "phone-1"
        );
    }

    #[tokio::test]
    async fn submit_rejects_disabled_categories() {
        let f = fixture(NotiflyConfig::default()).await;
        f.rows.seed(
            notifly_prefs::SETTINGS_TABLE,
            [row(json!({"user_id": "u1", "categories": {"like": false}}))],
        );
        let err = f
            .pipeline
            .submit(NewDelivery::new("u1", NotificationCategory::Like, "t", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotiflyError::Validation(_)));
        assert_eq!(f.pipeline.status().queue.pending, 0);
    }

    #[tokio::test]
    async fn submit_during_quiet_hours_schedules_for_the_end() {
        let f = fixture(NotiflyConfig::default()).await;
        f.rows.seed(
            notifly_prefs::SETTINGS_TABLE,
            [row(json!({
                "user_id": "u1",
                "quiet_hours_enabled": true,
                "quiet_hours_start": "11:00",
                "quiet_hours_end": "13:00",
            }))],
        );

        let deferred = f
            .pipeline
            .submit(NewDelivery::new("u1", NotificationCategory::Comment, "t", "b"))
            .await
            .unwrap();
        assert_eq!(
            deferred.scheduled_for,
            Some(f.clock.now() + chrono::TimeDelta::hours(1))
        );

        let urgent = f
            .pipeline
            .submit(
                NewDelivery::new("u1", NotificationCategory::System, "t", "b")
                    .with_priority(Priority::Urgent),
            )
            .await
            .unwrap();
        assert_eq!(urgent.scheduled_for, None);

        let status = f.pipeline.status();
        assert_eq!(status.queue.pending, 2);
        assert_eq!(status.queue.ready, 1);
    }

    #[tokio::test]
    async fn mark_read_updates_rows_and_lowers_badge() {
        let f = fixture(config_for("me")).await;
        f.rows.seed(
            NOTIFICATIONS_TABLE,
            [
                row(json!({"id": "n1", "user_id": "me", "read": false})),
                row(json!({"id": "n2", "user_id": "me", "read": false})),
                row(json!({"id": "n3", "user_id": "me", "read": true})),
                row(json!({"id": "n4", "user_id": "someone", "read": false})),
            ],
        );
        let badge = f.pipeline.badge().unwrap();
        assert_eq!(badge.update_badge_count().await, 2);

        let ids: Vec<String> = ["n1", "n3", "n4"].iter().map(|s| s.to_string()).collect();
        assert_eq!(f.pipeline.mark_read(&ids).await.unwrap(), 1);
        assert_eq!(badge.current(), 1);
        assert_eq!(f.setter.last().await, Some(1));

        let n1 = f
            .rows
            .rows(NOTIFICATIONS_TABLE)
            .into_iter()
            .find(|r| r["id"] == "n1")
            .unwrap();
        assert_eq!(n1["read"], true);
        assert_eq!(n1["read_at"], "2026-05-01T12:00:00.000Z");
        assert_eq!(f.pipeline.mark_read(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn badge_recount_reads_the_backend_not_the_query_cache() {
        let f = fixture(config_for("me")).await;
        f.rows.seed(
            NOTIFICATIONS_TABLE,
            [row(json!({"id": "n1", "user_id": "me", "read": false}))],
        );
        assert_eq!(f.pipeline.unread_count().await.unwrap(), 1);
        let badge = f.pipeline.badge().unwrap();
        assert_eq!(badge.update_badge_count().await, 1);

        f.rows.seed(
            NOTIFICATIONS_TABLE,
            [row(json!({"id": "n2", "user_id": "me", "read": false}))],
        );
        assert_eq!(badge.update_badge_count().await, 2);
        // The cached count lags until a write through the pipeline clears it.
        assert_eq!(f.pipeline.unread_count().await.unwrap(), 1);
        f.pipeline.mark_read(&["n1".into()]).await.unwrap();
        assert_eq!(f.pipeline.unread_count().await.unwrap(), 1);
        assert_eq!(badge.current(), 1);
    }

    #[tokio::test]
    async fn mark_read_needs_a_signed_in_user() {
        let f = fixture(NotiflyConfig::default()).await;
        assert!(f.pipeline.badge().is_none());
        let err = f.pipeline.mark_read(&["n1".into()]).await.unwrap_err();
        assert!(matches!(err, NotiflyError::Config(_)));
    }

    #[tokio::test]
    async fn start_spawns_every_loop_and_stops_on_cancel() {
        let f = fixture(config_for("me")).await;
        let cancel = CancellationToken::new();
        let running = f.pipeline.start(cancel.clone()).await.unwrap();
        assert_eq!(running.task_count(), 4);

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), running.join())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_timezone_is_a_config_error() {
        let mut config = NotiflyConfig::default();
        config.device.timezone = "Nowhere/Special".into();
        let result = NotificationPipeline::new(
            &config,
            PipelineAdapters {
                rows: Arc::new(MemoryRowStore::new()),
                kv: Arc::new(MemoryKvStore::new()),
                pubsub: Arc::new(LocalPubSub::new()),
                relay: Arc::new(MockPushRelay::new()),
                badge_setter: Arc::new(RecordingBadgeSetter::new()),
                clock: fixed_clock(),
            },
        )
        .await;
        assert!(matches!(result, Err(NotiflyError::Config(_))));
    }
}
