// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the notification pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Opaque key-value data attached to a notification and forwarded to the push relay.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of external collaborator an adapter stands in for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    RowStore,
    PubSub,
    PushRelay,
    Badge,
    KeyValue,
    Metrics,
}

/// What kind of social event a notification is about.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationCategory {
    Like,
    Comment,
    Follow,
    Mention,
    Message,
    System,
}

/// Delivery priority. Only `Urgent` ignores quiet hours.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// A delivery request as submitted by a caller, before the queue assigns
/// its identity and bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDelivery {
    pub user_id: String,
    pub category: NotificationCategory,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Falls back to the queue's configured default when `None`.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl NewDelivery {
    /// Build a normal-priority delivery with an empty payload.
    pub fn new(
        user_id: impl Into<String>,
        category: NotificationCategory,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            category,
            title: title.into(),
            body: body.into(),
            payload: Payload::new(),
            priority: Priority::Normal,
            scheduled_for: None,
            max_attempts: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }
}

/// A notification owned by the queue, either pending or dead-lettered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDelivery {
    pub id: String,
    pub user_id: String,
    pub category: NotificationCategory,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub priority: Priority,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PendingDelivery {
    /// Whether the item may be sent at `now`.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_for.is_none_or(|at| at <= now)
    }

    /// When the item last became sendable: its schedule, or creation if it
    /// was never held back.
    pub fn ready_since(&self) -> DateTime<Utc> {
        self.scheduled_for
            .map_or(self.created_at, |at| at.max(self.created_at))
    }

    /// Whether the retry budget is used up.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Per-user notification preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub user_id: String,
    #[serde(default)]
    pub quiet_hours_enabled: bool,
    #[serde(default = "default_quiet_start")]
    pub quiet_hours_start: String,
    #[serde(default = "default_quiet_end")]
    pub quiet_hours_end: String,
    /// Explicit per-category toggles. Missing categories are enabled.
    #[serde(default)]
    pub categories: BTreeMap<NotificationCategory, bool>,
}

impl NotificationSettings {
    /// Settings used when the backend has no row for a user.
    pub fn defaults_for(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            quiet_hours_enabled: false,
            quiet_hours_start: default_quiet_start(),
            quiet_hours_end: default_quiet_end(),
            categories: BTreeMap::new(),
        }
    }

    pub fn category_enabled(&self, category: NotificationCategory) -> bool {
        self.categories.get(&category).copied().unwrap_or(true)
    }
}

fn default_quiet_start() -> String {
    "22:00".to_string()
}

fn default_quiet_end() -> String {
    "07:00".to_string()
}

/// Partial update of a user's settings; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub quiet_hours_enabled: Option<bool>,
    pub quiet_hours_start: Option<String>,
    pub quiet_hours_end: Option<String>,
    #[serde(default)]
    pub categories: BTreeMap<NotificationCategory, bool>,
}

impl SettingsUpdate {
    /// Apply this update on top of `settings`.
    pub fn apply_to(&self, settings: &mut NotificationSettings) {
        if let Some(enabled) = self.quiet_hours_enabled {
            settings.quiet_hours_enabled = enabled;
        }
        if let Some(start) = &self.quiet_hours_start {
            settings.quiet_hours_start = start.clone();
        }
        if let Some(end) = &self.quiet_hours_end {
            settings.quiet_hours_end = end.clone();
        }
        for (category, enabled) in &self.categories {
            settings.categories.insert(*category, *enabled);
        }
    }
}

/// Mobile platform a push token was issued for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Platform {
    Ios,
    Android,
    Web,
}

/// A device's push-delivery token, keyed by (user, device).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushToken {
    pub user_id: String,
    pub device_id: String,
    pub token: String,
    pub platform: Platform,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub updated_at: String,
}

fn default_active() -> bool {
    true
}

/// The named metrics sampled by the monitoring loop.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    /// Delivered / attempted, over the last sampling interval.
    DeliverySuccessRate,
    /// Mean milliseconds from enqueue to successful delivery.
    AverageDeliveryTime,
    /// Failed attempts / attempted.
    ErrorRate,
    /// Tokens rejected by the relay / messages sent to the relay.
    TokenInvalidationRate,
    /// Read notifications / notifications created, over the sample window.
    EngagementRate,
    /// Devices whose token was refreshed within the sample window.
    ActiveUsers,
    /// Notifications created within the sample window.
    Volume,
}

impl MetricKind {
    pub const ALL: [MetricKind; 7] = [
        MetricKind::DeliverySuccessRate,
        MetricKind::AverageDeliveryTime,
        MetricKind::ErrorRate,
        MetricKind::TokenInvalidationRate,
        MetricKind::EngagementRate,
        MetricKind::ActiveUsers,
        MetricKind::Volume,
    ];
}

/// Format a timestamp the way rows and persisted records store it.
///
/// The fixed-width layout keeps lexicographic and chronological order equal.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn missing_categories_default_to_enabled() {
        let mut settings = NotificationSettings::defaults_for("u1");
        assert!(settings.category_enabled(NotificationCategory::Like));
        settings.categories.insert(NotificationCategory::Like, false);
        assert!(!settings.category_enabled(NotificationCategory::Like));
        assert!(settings.category_enabled(NotificationCategory::Follow));
    }

    #[test]
    fn settings_deserialize_from_sparse_row() {
        let row = serde_json::json!({
            "id": 7,
            "user_id": "u1",
            "quiet_hours_enabled": true,
            "categories": { "comment": false },
        });
        let settings: NotificationSettings = serde_json::from_value(row).unwrap();
        assert!(settings.quiet_hours_enabled);
        assert_eq!(settings.quiet_hours_start, "22:00");
        assert_eq!(settings.quiet_hours_end, "07:00");
        assert!(!settings.category_enabled(NotificationCategory::Comment));
    }

    #[test]
    fn settings_update_only_touches_given_fields() {
        let mut settings = NotificationSettings::defaults_for("u1");
        let update = SettingsUpdate {
            quiet_hours_end: Some("06:30".into()),
            categories: BTreeMap::from([(NotificationCategory::System, false)]),
            ..Default::default()
        };
        update.apply_to(&mut settings);
        assert_eq!(settings.quiet_hours_start, "22:00");
        assert_eq!(settings.quiet_hours_end, "06:30");
        assert!(!settings.category_enabled(NotificationCategory::System));
    }

    #[test]
    fn readiness_respects_schedule() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut item = PendingDelivery {
            id: "d1".into(),
            user_id: "u1".into(),
            category: NotificationCategory::Like,
            title: "t".into(),
            body: "b".into(),
            payload: Payload::new(),
            priority: Priority::Normal,
            scheduled_for: None,
            attempts: 0,
            max_attempts: 3,
            created_at: now,
            last_attempt_at: None,
            last_error: None,
        };
        assert!(item.is_ready(now));
        item.scheduled_for = Some(now + chrono::TimeDelta::seconds(1));
        assert!(!item.is_ready(now));
        item.scheduled_for = Some(now);
        assert!(item.is_ready(now));
        assert_eq!(item.ready_since(), now);

        let later = now + chrono::TimeDelta::hours(9);
        item.scheduled_for = Some(later);
        assert_eq!(item.ready_since(), later);
        item.scheduled_for = Some(now - chrono::TimeDelta::hours(1));
        assert_eq!(item.ready_since(), now);
    }

    #[test]
    fn category_round_trips_through_strum() {
        use std::str::FromStr;
        assert_eq!(NotificationCategory::Mention.to_string(), "mention");
        assert_eq!(
            NotificationCategory::from_str("follow").unwrap(),
            NotificationCategory::Follow
        );
    }

    #[test]
    fn timestamps_sort_lexicographically() {
        let a = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        assert!(format_timestamp(a) < format_timestamp(b));
        assert_eq!(format_timestamp(a), "2026-03-01T09:00:00.000Z");
    }
}
