// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cached per-user notification settings.

use std::sync::Arc;

use notifly_cache::{CacheKind, CacheRegistry, RateLimitedOperation, RateLimiter};
use notifly_core::types::format_timestamp;
use notifly_core::{Clock, NotificationSettings, NotiflyError, RowQuery, RowStore, SettingsUpdate};
use serde_json::Value;
use tracing::{debug, info};

use crate::quiet_hours::parse_hhmm;
use crate::rows::{from_row, to_row};

/// Backend table holding one settings row per user.
pub const SETTINGS_TABLE: &str = "notification_settings";

pub struct SettingsService {
    rows: Arc<dyn RowStore>,
    cache: Arc<CacheRegistry>,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
}

impl SettingsService {
    pub fn new(
        rows: Arc<dyn RowStore>,
        cache: Arc<CacheRegistry>,
        limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rows,
            cache,
            limiter,
            clock,
        }
    }

    /// Settings for `user_id`: cache, then backend, then defaults.
    pub async fn get_settings(&self, user_id: &str) -> Result<NotificationSettings, NotiflyError> {
        if let Some(settings) = self.cache.get::<NotificationSettings>(CacheKind::Settings, user_id) {
            return Ok(settings);
        }

        let query = RowQuery::table(SETTINGS_TABLE).eq("user_id", user_id).limit(1);
        let settings = match self.rows.select(&query).await?.into_iter().next() {
            Some(row) => from_row(SETTINGS_TABLE, row)?,
            None => {
                debug!(user_id, "no settings row, using defaults");
                NotificationSettings::defaults_for(user_id)
            }
        };
        self.cache.set(CacheKind::Settings, user_id, &settings);
        Ok(settings)
    }

    /// Apply `update` to the user's settings and persist the result.
    ///
    /// Denied by the settings-update rate limit with
    /// [`NotiflyError::RateLimited`].
    pub async fn update_settings(
        &self,
        user_id: &str,
        update: &SettingsUpdate,
    ) -> Result<NotificationSettings, NotiflyError> {
        self.limiter
            .enforce(RateLimitedOperation::SettingsUpdate, user_id)?;

        let mut settings = self.get_settings(user_id).await?;
        update.apply_to(&mut settings);
        parse_hhmm(&settings.quiet_hours_start)?;
        parse_hhmm(&settings.quiet_hours_end)?;

        let mut row = to_row(&settings)?;
        row.insert(
            "updated_at".into(),
            Value::String(format_timestamp(self.clock.now())),
        );
        self.rows.upsert(SETTINGS_TABLE, row, &["user_id"]).await?;
        self.cache.invalidate(CacheKind::Settings, Some(user_id));

        info!(
            user_id,
            quiet_hours = settings.quiet_hours_enabled,
            "notification settings updated"
        );
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notifly_config::{CacheConfig, RateLimitConfig, WindowConfig};
    use notifly_core::NotificationCategory;
    use notifly_test_utils::{FlakyRowStore, MemoryRowStore, fixed_clock, row};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn service(rows: Arc<dyn RowStore>, max_updates: u32) -> SettingsService {
        let clock = fixed_clock();
        let limits = RateLimitConfig {
            settings_update: WindowConfig {
                max_requests: max_updates,
                window_secs: 60,
            },
            ..RateLimitConfig::default()
        };
        SettingsService::new(
            rows,
            Arc::new(CacheRegistry::new(&CacheConfig::default(), clock.clone())),
            Arc::new(RateLimiter::new(limits, clock.clone())),
            clock,
        )
    }

    #[tokio::test]
    async fn missing_row_yields_defaults() {
        let svc = service(Arc::new(MemoryRowStore::new()), 10);
        let settings = svc.get_settings("u1").await.unwrap();
        assert_eq!(settings, NotificationSettings::defaults_for("u1"));
    }

    #[tokio::test]
    async fn backend_row_is_cached() {
        let rows = Arc::new(FlakyRowStore::new());
        rows.inner().seed(
            SETTINGS_TABLE,
            [row(json!({
                "user_id": "u1",
                "quiet_hours_enabled": true,
                "quiet_hours_start": "23:00:00",
                "quiet_hours_end": "06:00:00",
                "categories": {"like": false}
            }))],
        );
        let svc = service(rows.clone(), 10);
        let first = svc.get_settings("u1").await.unwrap();
        assert!(first.quiet_hours_enabled);
        assert!(!first.category_enabled(NotificationCategory::Like));

        // A failing backend is not consulted while the entry is fresh.
        rows.fail_table(SETTINGS_TABLE);
        assert_eq!(svc.get_settings("u1").await.unwrap(), first);
        assert!(svc.get_settings("u2").await.is_err());
    }

    #[tokio::test]
    async fn update_persists_and_invalidates() {
        let rows = Arc::new(MemoryRowStore::new());
        let svc = service(rows.clone(), 10);
        svc.get_settings("u1").await.unwrap();

        let update = SettingsUpdate {
            quiet_hours_enabled: Some(true),
            categories: BTreeMap::from([(NotificationCategory::Comment, false)]),
            ..Default::default()
        };
        let updated = svc.update_settings("u1", &update).await.unwrap();
        assert!(updated.quiet_hours_enabled);

        let stored = rows.rows(SETTINGS_TABLE);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["categories"]["comment"], false);
        assert_eq!(stored[0]["updated_at"], "2026-05-01T12:00:00.000Z");

        let reread = svc.get_settings("u1").await.unwrap();
        assert!(!reread.category_enabled(NotificationCategory::Comment));

        // A second update merges into the same row.
        svc.update_settings(
            "u1",
            &SettingsUpdate {
                quiet_hours_end: Some("08:00".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(rows.rows(SETTINGS_TABLE).len(), 1);
        assert_eq!(svc.get_settings("u1").await.unwrap().quiet_hours_end, "08:00");
    }

    #[tokio::test]
    async fn malformed_time_is_rejected_without_writing() {
        let rows = Arc::new(MemoryRowStore::new());
        let svc = service(rows.clone(), 10);
        let err = svc
            .update_settings(
                "u1",
                &SettingsUpdate {
                    quiet_hours_start: Some("10pm".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NotiflyError::Validation(_)));
        assert!(rows.rows(SETTINGS_TABLE).is_empty());
    }

    #[tokio::test]
    async fn updates_are_rate_limited() {
        let svc = service(Arc::new(MemoryRowStore::new()), 2);
        let update = SettingsUpdate::default();
        svc.update_settings("u1", &update).await.unwrap();
        svc.update_settings("u1", &update).await.unwrap();
        let err = svc.update_settings("u1", &update).await.unwrap_err();
        assert!(matches!(err, NotiflyError::RateLimited { .. }));
        // Other users have their own window.
        svc.update_settings("u2", &update).await.unwrap();
    }
}
