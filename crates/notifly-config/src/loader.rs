// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered config loading with Figment.
//!
//! Lookup order, later layers winning: compiled defaults,
//! `/etc/notifly/notifly.toml`, `~/.config/notifly/notifly.toml`,
//! `./notifly.toml`, then `NOTIFLY_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use tracing::debug;

use crate::model::NotiflyConfig;

pub const SYSTEM_CONFIG_PATH: &str = "/etc/notifly/notifly.toml";
pub const LOCAL_CONFIG_PATH: &str = "notifly.toml";

/// Env var sections, most specific first so `queue_backoff_*` is matched
/// before `queue_*`.
const ENV_SECTIONS: &[(&str, &str)] = &[
    ("queue_backoff_", "queue.backoff."),
    ("cache_settings_", "cache.settings."),
    ("cache_tokens_", "cache.tokens."),
    ("cache_query_", "cache.query."),
    ("rate_limit_settings_update_", "rate_limit.settings_update."),
    ("rate_limit_token_refresh_", "rate_limit.token_refresh."),
    ("rate_limit_push_send_", "rate_limit.push_send."),
    ("device_", "device."),
    ("backend_", "backend."),
    ("push_", "push."),
    ("storage_", "storage."),
    ("queue_", "queue."),
    ("badge_", "badge."),
    ("monitor_", "monitor."),
    ("prometheus_", "prometheus."),
];

/// The user-level config file, if a config directory exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("notifly").join("notifly.toml"))
}

/// The full layered figment, before extraction.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new()
        .merge(Serialized::defaults(NotiflyConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH));
    if let Some(user) = user_config_path() {
        debug!(path = %user.display(), exists = user.exists(), "user config layer");
        figment = figment.merge(Toml::file(user));
    }
    figment
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Load from the standard hierarchy plus environment overrides.
pub fn load_config() -> Result<NotiflyConfig, figment::Error> {
    build_figment().extract()
}

/// Load from an inline TOML document over compiled defaults. No files or env.
pub fn load_config_from_str(toml_content: &str) -> Result<NotiflyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(NotiflyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load from one explicit file plus environment overrides.
pub fn load_config_from_path(path: &Path) -> Result<NotiflyConfig, figment::Error> {
    debug!(path = %path.display(), "loading config file");
    Figment::new()
        .merge(Serialized::defaults(NotiflyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// `NOTIFLY_QUEUE_BATCH_SIZE` becomes `queue.batch_size`.
///
/// Only the leading section name is turned into a dot, so underscores inside
/// key names survive.
fn env_provider() -> Env {
    Env::prefixed("NOTIFLY_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    ENV_SECTIONS
        .iter()
        .find_map(|(prefix, dotted)| {
            key.strip_prefix(prefix)
                .filter(|rest| !rest.is_empty())
                .map(|rest| format!("{dotted}{rest}"))
        })
        .unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_section_prefix_only() {
        assert_eq!(map_env_key("queue_batch_size"), "queue.batch_size");
        assert_eq!(map_env_key("device_user_id"), "device.user_id");
        assert_eq!(map_env_key("push_access_token"), "push.access_token");
    }

    #[test]
    fn maps_nested_tables() {
        assert_eq!(map_env_key("queue_backoff_ceiling_ms"), "queue.backoff.ceiling_ms");
        assert_eq!(map_env_key("cache_tokens_ttl_secs"), "cache.tokens.ttl_secs");
        assert_eq!(
            map_env_key("rate_limit_push_send_max_requests"),
            "rate_limit.push_send.max_requests"
        );
    }

    #[test]
    fn section_names_inside_keys_are_untouched() {
        // `push_` appears mid-key but is not the section.
        assert_eq!(map_env_key("badge_push_count"), "badge.push_count");
    }

    #[test]
    fn unknown_prefix_passes_through() {
        assert_eq!(map_env_key("nonsense"), "nonsense");
    }
}
