// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Notifly pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use notifly_core::MetricKind;
use serde::{Deserialize, Serialize};

/// Top-level Notifly configuration.
///
/// Loaded once at startup from TOML files following the XDG hierarchy, with
/// environment variable overrides. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotiflyConfig {
    /// Identity of this device and the signed-in account.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Backend row store (Postgres-over-REST) connection.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Push relay settings.
    #[serde(default)]
    pub push: PushConfig,

    /// Local persistence settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Delivery queue, retry and backoff settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Per-type cache capacity, TTL and eviction policy.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Per-operation request windows.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// App icon badge settings.
    #[serde(default)]
    pub badge: BadgeConfig,

    /// Metric sampling and alert rules.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Prometheus metrics exporter.
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// Device identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// The signed-in account this device receives notifications for.
    #[serde(default)]
    pub user_id: Option<String>,

    /// Stable identifier of this device. Generated and persisted locally when unset.
    #[serde(default)]
    pub device_id: Option<String>,

    /// IANA time zone used to evaluate quiet hours.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            device_id: None,
            timezone: default_timezone(),
            log_level: default_log_level(),
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Backend connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Project base URL, e.g. `https://xyz.example.co`. `None` runs against
    /// an in-memory row store.
    #[serde(default)]
    pub url: Option<String>,

    /// Public API key sent as the `apikey` header.
    #[serde(default)]
    pub api_key: Option<String>,

    /// User access token sent as the bearer token. Falls back to `api_key`.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            access_token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Push relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PushConfig {
    /// Relay endpoint accepting JSON push messages.
    #[serde(default = "default_push_endpoint")]
    pub endpoint: String,

    /// Optional relay access token.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Sound name attached to every message. `None` sends silently.
    #[serde(default = "default_push_sound")]
    pub sound: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            endpoint: default_push_endpoint(),
            access_token: None,
            sound: default_push_sound(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_push_endpoint() -> String {
    "https://exp.host/--/api/v2/push/send".to_string()
}

fn default_push_sound() -> Option<String> {
    Some("default".to_string())
}

/// Local persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("notifly").join("notifly.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("notifly.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Delivery queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Seconds between background batch runs.
    #[serde(default = "default_process_interval_secs")]
    pub process_interval_secs: u64,

    /// Items attempted per background batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Attempts before an item is dead-lettered, unless the item sets its own.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay schedule between attempts.
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            process_interval_secs: default_process_interval_secs(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl QueueConfig {
    pub fn process_interval(&self) -> Duration {
        Duration::from_secs(self.process_interval_secs)
    }
}

fn default_process_interval_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

/// How retry delays grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Delays read from `steps_ms`, then `ceiling_ms` once the table runs out.
    #[default]
    Table,
    /// `base_ms * multiplier^(attempt - 1)`, capped at `ceiling_ms`.
    Exponential,
}

/// Retry backoff configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffConfig {
    #[serde(default)]
    pub strategy: BackoffStrategy,

    /// Escalating delays for the table strategy, in milliseconds.
    #[serde(default = "default_backoff_steps_ms")]
    pub steps_ms: Vec<u64>,

    /// Upper bound on any delay, in milliseconds.
    #[serde(default = "default_backoff_ceiling_ms")]
    pub ceiling_ms: u64,

    /// First delay of the exponential strategy, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub base_ms: u64,

    /// Growth factor of the exponential strategy.
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::default(),
            steps_ms: default_backoff_steps_ms(),
            ceiling_ms: default_backoff_ceiling_ms(),
            base_ms: default_backoff_base_ms(),
            multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_backoff_steps_ms() -> Vec<u64> {
    vec![1_000, 5_000, 15_000]
}

fn default_backoff_ceiling_ms() -> u64 {
    60_000
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// Which entry a full cache bucket gives up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently accessed.
    #[default]
    Lru,
    /// Least frequently accessed.
    Lfu,
    /// Oldest inserted.
    Fifo,
}

/// One cache bucket's limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheBucketConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
    #[serde(default)]
    pub policy: EvictionPolicy,
}

impl CacheBucketConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Cache configuration, one bucket per cached data type.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Per-user notification settings.
    #[serde(default = "default_settings_bucket")]
    pub settings: CacheBucketConfig,

    /// Per-user push token lists.
    #[serde(default = "default_tokens_bucket")]
    pub tokens: CacheBucketConfig,

    /// Backend aggregate queries (counts used by the monitor).
    #[serde(default = "default_query_bucket")]
    pub query: CacheBucketConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            settings: default_settings_bucket(),
            tokens: default_tokens_bucket(),
            query: default_query_bucket(),
        }
    }
}

fn default_settings_bucket() -> CacheBucketConfig {
    CacheBucketConfig {
        capacity: 100,
        ttl_secs: 300,
        policy: EvictionPolicy::Lru,
    }
}

fn default_tokens_bucket() -> CacheBucketConfig {
    CacheBucketConfig {
        capacity: 200,
        ttl_secs: 600,
        policy: EvictionPolicy::Lru,
    }
}

fn default_query_bucket() -> CacheBucketConfig {
    CacheBucketConfig {
        capacity: 500,
        ttl_secs: 60,
        policy: EvictionPolicy::Lfu,
    }
}

/// A fixed request window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl WindowConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Rate limits per operation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default = "default_settings_update_window")]
    pub settings_update: WindowConfig,

    #[serde(default = "default_token_refresh_window")]
    pub token_refresh: WindowConfig,

    #[serde(default = "default_push_send_window")]
    pub push_send: WindowConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            settings_update: default_settings_update_window(),
            token_refresh: default_token_refresh_window(),
            push_send: default_push_send_window(),
        }
    }
}

fn default_settings_update_window() -> WindowConfig {
    WindowConfig {
        max_requests: 10,
        window_secs: 60,
    }
}

fn default_token_refresh_window() -> WindowConfig {
    WindowConfig {
        max_requests: 5,
        window_secs: 3600,
    }
}

fn default_push_send_window() -> WindowConfig {
    WindowConfig {
        max_requests: 60,
        window_secs: 60,
    }
}

/// App icon badge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BadgeConfig {
    /// Keep the badge in sync with the unread count.
    #[serde(default = "default_badge_enabled")]
    pub enabled: bool,

    /// Largest value shown on the badge.
    #[serde(default = "default_max_badge")]
    pub max_badge: u32,

    /// Broadcast channel name prefix; the channel is `<prefix>:<user_id>`.
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,

    /// Seconds between authoritative recounts of unread notifications.
    #[serde(default = "default_badge_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

impl Default for BadgeConfig {
    fn default() -> Self {
        Self {
            enabled: default_badge_enabled(),
            max_badge: default_max_badge(),
            channel_prefix: default_channel_prefix(),
            refresh_interval_secs: default_badge_refresh_interval_secs(),
        }
    }
}

impl BadgeConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

fn default_badge_enabled() -> bool {
    true
}

fn default_max_badge() -> u32 {
    99
}

fn default_channel_prefix() -> String {
    "badge".to_string()
}

fn default_badge_refresh_interval_secs() -> u64 {
    300
}

/// Comparison applied by an alert rule: `value <op> threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

impl Comparison {
    /// Whether `value <op> threshold` holds.
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Gt => value > threshold,
            Comparison::Gte => value >= threshold,
            Comparison::Lt => value < threshold,
            Comparison::Lte => value <= threshold,
            Comparison::Eq => (value - threshold).abs() < f64::EPSILON,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
            Comparison::Eq => "==",
        }
    }
}

impl std::fmt::Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// An alert rule evaluated against every metric sample.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AlertRuleConfig {
    pub name: String,
    pub metric: MetricKind,
    pub operator: Comparison,
    pub threshold: f64,
    /// Seconds after firing during which the rule stays silent.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl AlertRuleConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

fn default_cooldown_secs() -> u64 {
    900
}

/// Monitoring loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_enabled")]
    pub enabled: bool,

    /// Seconds between samples.
    #[serde(default = "default_monitor_interval_secs")]
    pub interval_secs: u64,

    /// Look-back window in seconds for backend-derived metrics.
    #[serde(default = "default_sample_window_secs")]
    pub sample_window_secs: u64,

    /// Metric samples kept in local history.
    #[serde(default = "default_history_retention")]
    pub history_retention: usize,

    /// Alerts kept in local history.
    #[serde(default = "default_alert_retention")]
    pub alert_retention: usize,

    #[serde(default = "default_alert_rules")]
    pub rules: Vec<AlertRuleConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_monitor_enabled(),
            interval_secs: default_monitor_interval_secs(),
            sample_window_secs: default_sample_window_secs(),
            history_retention: default_history_retention(),
            alert_retention: default_alert_retention(),
            rules: default_alert_rules(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn sample_window(&self) -> Duration {
        Duration::from_secs(self.sample_window_secs)
    }
}

fn default_monitor_enabled() -> bool {
    true
}

fn default_monitor_interval_secs() -> u64 {
    60
}

fn default_sample_window_secs() -> u64 {
    3600
}

fn default_history_retention() -> usize {
    1000
}

fn default_alert_retention() -> usize {
    100
}

fn default_alert_rules() -> Vec<AlertRuleConfig> {
    vec![
        AlertRuleConfig {
            name: "low_delivery_success".to_string(),
            metric: MetricKind::DeliverySuccessRate,
            operator: Comparison::Lt,
            threshold: 0.95,
            cooldown_secs: default_cooldown_secs(),
        },
        AlertRuleConfig {
            name: "high_error_rate".to_string(),
            metric: MetricKind::ErrorRate,
            operator: Comparison::Gt,
            threshold: 0.05,
            cooldown_secs: default_cooldown_secs(),
        },
        AlertRuleConfig {
            name: "slow_delivery".to_string(),
            metric: MetricKind::AverageDeliveryTime,
            operator: Comparison::Gt,
            threshold: 5_000.0,
            cooldown_secs: default_cooldown_secs(),
        },
        AlertRuleConfig {
            name: "token_churn".to_string(),
            metric: MetricKind::TokenInvalidationRate,
            operator: Comparison::Gt,
            threshold: 0.1,
            cooldown_secs: 3600,
        },
        AlertRuleConfig {
            name: "low_engagement".to_string(),
            metric: MetricKind::EngagementRate,
            operator: Comparison::Lt,
            threshold: 0.1,
            cooldown_secs: 3600,
        },
    ]
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Install the Prometheus recorder at startup.
    #[serde(default)]
    pub enabled: bool,

    /// Rewrite this file with the rendered metrics after every monitor pass,
    /// for a node-exporter textfile collector.
    #[serde(default)]
    pub textfile_path: Option<String>,
}
