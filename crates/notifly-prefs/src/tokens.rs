// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push tokens, one per (user, device).

use std::sync::Arc;

use notifly_cache::{CacheKind, CacheRegistry, RateLimitedOperation, RateLimiter};
use notifly_core::types::format_timestamp;
use notifly_core::{Clock, NotiflyError, Platform, PushToken, Row, RowQuery, RowStore};
use serde_json::Value;
use tracing::{info, warn};

use crate::rows::{from_row, to_row};

/// Backend table holding push tokens.
pub const TOKENS_TABLE: &str = "push_tokens";

pub struct TokenStore {
    rows: Arc<dyn RowStore>,
    cache: Arc<CacheRegistry>,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
}

impl TokenStore {
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

    /// Store `token` as the active token for (user, device).
    pub async fn register_token(
        &self,
        user_id: &str,
        device_id: &str,
        token: &str,
        platform: Platform,
    ) -> Result<PushToken, NotiflyError> {
        if token.trim().is_empty() {
            return Err(NotiflyError::Validation("push token is empty".into()));
        }
        self.limiter.enforce(
            RateLimitedOperation::TokenRefresh,
            &format!("{user_id}:{device_id}"),
        )?;

        let record = PushToken {
            user_id: user_id.to_string(),
            device_id: device_id.to_string(),
            token: token.to_string(),
            platform,
            is_active: true,
            updated_at: format_timestamp(self.clock.now()),
        };
        self.rows
            .upsert(TOKENS_TABLE, to_row(&record)?, &["user_id", "device_id"])
            .await?;
        self.cache.invalidate(CacheKind::Tokens, Some(user_id));
        info!(user_id, device_id, %platform, "push token registered");
        Ok(record)
    }

    /// Active tokens for `user_id`, most recently refreshed first.
    pub async fn active_tokens(&self, user_id: &str) -> Result<Vec<PushToken>, NotiflyError> {
        if let Some(tokens) = self.cache.get::<Vec<PushToken>>(CacheKind::Tokens, user_id) {
            return Ok(tokens);
        }

        let query = RowQuery::table(TOKENS_TABLE)
            .eq("user_id", user_id)
            .eq("is_active", true)
            .order("updated_at", false);
        let tokens: Vec<PushToken> = self
            .rows
            .select(&query)
            .await?
            .into_iter()
            .filter_map(|row| match from_row::<PushToken>(TOKENS_TABLE, row) {
                Ok(token) => Some(token),
                Err(e) => {
                    warn!(user_id, error = %e, "skipping malformed token row");
                    None
                }
            })
            .collect();
        self.cache.set(CacheKind::Tokens, user_id, &tokens);
        Ok(tokens)
    }

    /// Delete every row carrying `token`. Returns the number removed.
    pub async fn remove_token(&self, token: &str) -> Result<u64, NotiflyError> {
        let removed = self
            .rows
            .delete(&RowQuery::table(TOKENS_TABLE).eq("token", token))
            .await?;
        // The owning user is unknown here.
        self.cache.invalidate(CacheKind::Tokens, None);
        if removed > 0 {
            info!(removed, "invalid push token removed");
        }
        Ok(removed)
    }

    /// Mark a device's token inactive, e.g. on sign-out.
    pub async fn deactivate_device(&self, user_id: &str, device_id: &str) -> Result<u64, NotiflyError> {
        let mut patch = Row::new();
        patch.insert("is_active".into(), Value::Bool(false));
        patch.insert(
            "updated_at".into(),
            Value::String(format_timestamp(self.clock.now())),
        );
        let updated = self
            .rows
            .update(
                &RowQuery::table(TOKENS_TABLE)
                    .eq("user_id", user_id)
                    .eq("device_id", device_id),
                patch,
            )
            .await?;
        self.cache.invalidate(CacheKind::Tokens, Some(user_id));
        Ok(updated)
    }
}
