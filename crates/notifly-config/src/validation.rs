// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.
//!
//! Every failure is collected; validation never stops at the first problem.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{BackoffStrategy, CacheBucketConfig, NotiflyConfig, WindowConfig};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
pub fn validate_config(config: &NotiflyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    validate_device(config, &mut errors);
    validate_urls(config, &mut errors);

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    validate_queue(config, &mut errors);

    for (name, bucket) in [
        ("settings", &config.cache.settings),
        ("tokens", &config.cache.tokens),
        ("query", &config.cache.query),
    ] {
        validate_bucket(name, bucket, &mut errors);
    }

    for (name, window) in [
        ("settings_update", &config.rate_limit.settings_update),
        ("token_refresh", &config.rate_limit.token_refresh),
        ("push_send", &config.rate_limit.push_send),
    ] {
        validate_window(name, window, &mut errors);
    }

    if config.badge.max_badge == 0 {
        errors.push(ConfigError::validation("badge.max_badge must be at least 1"));
    }
    if config.badge.channel_prefix.trim().is_empty() {
        errors.push(ConfigError::validation(
            "badge.channel_prefix must not be empty",
        ));
    }
    if config.badge.refresh_interval_secs == 0 {
        errors.push(ConfigError::validation(
            "badge.refresh_interval_secs must be at least 1",
        ));
    }

    validate_monitor(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_device(config: &NotiflyConfig, errors: &mut Vec<ConfigError>) {
    let device = &config.device;

    if let Some(user_id) = &device.user_id
        && user_id.trim().is_empty()
    {
        errors.push(ConfigError::validation(
            "device.user_id must not be blank when set",
        ));
    }
    if let Some(device_id) = &device.device_id
        && device_id.trim().is_empty()
    {
        errors.push(ConfigError::validation(
            "device.device_id must not be blank when set",
        ));
    }
    if device.timezone.parse::<chrono_tz::Tz>().is_err() {
        errors.push(ConfigError::validation(format!(
            "device.timezone `{}` is not an IANA time zone name",
            device.timezone
        )));
    }
    if !LOG_LEVELS.contains(&device.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ConfigError::validation(format!(
            "device.log_level `{}` must be one of: {}",
            device.log_level,
            LOG_LEVELS.join(", ")
        )));
    }
}

fn validate_urls(config: &NotiflyConfig, errors: &mut Vec<ConfigError>) {
    if let Some(url) = &config.backend.url
        && !is_http_url(url)
    {
        errors.push(ConfigError::validation(format!(
            "backend.url `{url}` must start with http:// or https://"
        )));
    }
    if config.backend.url.is_some() && config.backend.api_key.is_none() {
        errors.push(ConfigError::validation(
            "backend.api_key is required when backend.url is set",
        ));
    }
    if !is_http_url(&config.push.endpoint) {
        errors.push(ConfigError::validation(format!(
            "push.endpoint `{}` must start with http:// or https://",
            config.push.endpoint
        )));
    }
    for (key, secs) in [
        ("backend.request_timeout_secs", config.backend.request_timeout_secs),
        ("push.request_timeout_secs", config.push.request_timeout_secs),
    ] {
        if secs == 0 {
            errors.push(ConfigError::validation(format!("{key} must be at least 1")));
        }
    }
}

fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty())
}

fn validate_queue(config: &NotiflyConfig, errors: &mut Vec<ConfigError>) {
    let queue = &config.queue;
    if queue.process_interval_secs == 0 {
        errors.push(ConfigError::validation(
            "queue.process_interval_secs must be at least 1",
        ));
    }
    if queue.batch_size == 0 {
        errors.push(ConfigError::validation("queue.batch_size must be at least 1"));
    }
    if queue.max_attempts == 0 {
        errors.push(ConfigError::validation(
            "queue.max_attempts must be at least 1",
        ));
    }

    let backoff = &queue.backoff;
    if backoff.strategy == BackoffStrategy::Table && backoff.steps_ms.is_empty() {
        errors.push(ConfigError::validation(
            "queue.backoff.steps_ms must not be empty for the table strategy",
        ));
    }
    if backoff.steps_ms.windows(2).any(|w| w[1] < w[0]) {
        errors.push(ConfigError::validation(
            "queue.backoff.steps_ms must be non-decreasing",
        ));
    }
    if backoff.ceiling_ms == 0 {
        errors.push(ConfigError::validation(
            "queue.backoff.ceiling_ms must be at least 1",
        ));
    }
    if backoff.base_ms == 0 {
        errors.push(ConfigError::validation(
            "queue.backoff.base_ms must be at least 1",
        ));
    }
    if !backoff.multiplier.is_finite() || backoff.multiplier < 1.0 {
        errors.push(ConfigError::validation(format!(
            "queue.backoff.multiplier must be a finite number >= 1.0, got {}",
            backoff.multiplier
        )));
    }
}

fn validate_bucket(name: &str, bucket: &CacheBucketConfig, errors: &mut Vec<ConfigError>) {
    if bucket.capacity == 0 {
        errors.push(ConfigError::validation(format!(
            "cache.{name}.capacity must be at least 1"
        )));
    }
    if bucket.ttl_secs == 0 {
        errors.push(ConfigError::validation(format!(
            "cache.{name}.ttl_secs must be at least 1"
        )));
    }
}

fn validate_window(name: &str, window: &WindowConfig, errors: &mut Vec<ConfigError>) {
    if window.max_requests == 0 {
        errors.push(ConfigError::validation(format!(
            "rate_limit.{name}.max_requests must be at least 1"
        )));
    }
    if window.window_secs == 0 {
        errors.push(ConfigError::validation(format!(
            "rate_limit.{name}.window_secs must be at least 1"
        )));
    }
}

fn validate_monitor(config: &NotiflyConfig, errors: &mut Vec<ConfigError>) {
    let monitor = &config.monitor;
    for (key, value) in [
        ("interval_secs", monitor.interval_secs),
        ("sample_window_secs", monitor.sample_window_secs),
        ("history_retention", monitor.history_retention as u64),
        ("alert_retention", monitor.alert_retention as u64),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!(
                "monitor.{key} must be at least 1"
            )));
        }
    }

    let mut seen = HashSet::new();
    for (i, rule) in monitor.rules.iter().enumerate() {
        if rule.name.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "monitor.rules[{i}].name must not be empty"
            )));
        } else if !seen.insert(rule.name.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate alert rule name `{}` in [[monitor.rules]]",
                rule.name
            )));
        }
        if !rule.threshold.is_finite() {
            errors.push(ConfigError::validation(format!(
                "monitor.rules[{i}].threshold must be a finite number"
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AlertRuleConfig;
    use notifly_core::MetricKind;

    fn messages(config: &NotiflyConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&NotiflyConfig::default()).is_ok());
    }

    #[test]
    fn unknown_timezone_fails() {
        let mut config = NotiflyConfig::default();
        config.device.timezone = "Mars/Olympus_Mons".into();
        assert!(messages(&config).iter().any(|m| m.contains("device.timezone")));
    }

    #[test]
    fn named_timezone_passes() {
        let mut config = NotiflyConfig::default();
        config.device.timezone = "America/New_York".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn zero_values_are_all_reported() {
        let mut config = NotiflyConfig::default();
        config.queue.batch_size = 0;
        config.cache.tokens.capacity = 0;
        config.rate_limit.push_send.window_secs = 0;
        let msgs = messages(&config);
        assert_eq!(msgs.len(), 3);
        assert!(msgs.iter().any(|m| m.contains("queue.batch_size")));
        assert!(msgs.iter().any(|m| m.contains("cache.tokens.capacity")));
        assert!(msgs.iter().any(|m| m.contains("rate_limit.push_send.window_secs")));
    }

    #[test]
    fn backend_url_requires_scheme_and_key() {
        let mut config = NotiflyConfig::default();
        config.backend.url = Some("xyz.example.co".into());
        let msgs = messages(&config);
        assert!(msgs.iter().any(|m| m.contains("backend.url")));
        assert!(msgs.iter().any(|m| m.contains("backend.api_key")));
    }

    #[test]
    fn duplicate_rule_names_fail() {
        let mut config = NotiflyConfig::default();
        config.monitor.rules.push(AlertRuleConfig {
            name: "high_error_rate".into(),
            metric: MetricKind::ErrorRate,
            operator: crate::model::Comparison::Gt,
            threshold: 0.2,
            cooldown_secs: 60,
        });
        assert!(messages(&config).iter().any(|m| m.contains("duplicate alert rule")));
    }

    #[test]
    fn shrinking_backoff_steps_fail() {
        let mut config = NotiflyConfig::default();
        config.queue.backoff.steps_ms = vec![5_000, 1_000];
        assert!(messages(&config).iter().any(|m| m.contains("non-decreasing")));
    }
}
