// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A [`RowStore`] that answers repeated reads from the query cache.
//!
//! Reads are keyed by [`query_signature`]. Any write through this store
//! drops the whole query bucket; writes made elsewhere become visible when
//! entries expire.

use std::sync::Arc;

use async_trait::async_trait;
use notifly_core::{AdapterType, HealthStatus, NotiflyError, PluginAdapter, Row, RowQuery, RowStore};

use crate::registry::{CacheKind, CacheRegistry, query_signature};

pub struct CachedRowStore {
    inner: Arc<dyn RowStore>,
    cache: Arc<CacheRegistry>,
}

impl CachedRowStore {
    pub fn new(inner: Arc<dyn RowStore>, cache: Arc<CacheRegistry>) -> Self {
        Self { inner, cache }
    }

    fn invalidate(&self) {
        self.cache.invalidate(CacheKind::Query, None);
    }
}

#[async_trait]
impl PluginAdapter for CachedRowStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn version(&self) -> semver::Version {
        self.inner.version()
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::RowStore
    }

    async fn health_check(&self) -> Result<HealthStatus, NotiflyError> {
        self.inner.health_check().await
    }
}

#[async_trait]
impl RowStore for CachedRowStore {
    async fn select(&self, query: &RowQuery) -> Result<Vec<Row>, NotiflyError> {
        let key = format!("select:{}", query_signature(query));
        if let Some(rows) = self.cache.get::<Vec<Row>>(CacheKind::Query, &key) {
            return Ok(rows);
        }
        let rows = self.inner.select(query).await?;
        self.cache.set(CacheKind::Query, &key, &rows);
        Ok(rows)
    }

    async fn count(&self, query: &RowQuery) -> Result<u64, NotiflyError> {
        let key = format!("count:{}", query_signature(query));
        if let Some(n) = self.cache.get::<u64>(CacheKind::Query, &key) {
            return Ok(n);
        }
        let n = self.inner.count(query).await?;
        self.cache.set(CacheKind::Query, &key, &n);
        Ok(n)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, NotiflyError> {
        let stored = self.inner.insert(table, row).await;
        self.invalidate();
        stored
    }

    async fn upsert(&self, table: &str, row: Row, on_conflict: &[&str]) -> Result<Row, NotiflyError> {
        let stored = self.inner.upsert(table, row, on_conflict).await;
        self.invalidate();
        stored
    }

    async fn update(&self, query: &RowQuery, patch: Row) -> Result<u64, NotiflyError> {
        let updated = self.inner.update(query, patch).await;
        self.invalidate();
        updated
    }

    async fn delete(&self, query: &RowQuery) -> Result<u64, NotiflyError> {
        let deleted = self.inner.delete(query).await;
        self.invalidate();
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notifly_config::CacheConfig;
    use notifly_test_utils::{FlakyRowStore, MemoryRowStore, fixed_clock, row};
    use serde_json::json;
    use std::time::Duration;

    fn unread() -> RowQuery {
        RowQuery::table("notifications")
            .eq("user_id", "u1")
            .eq("read", false)
    }

    #[tokio::test]
    async fn repeated_reads_hit_the_cache_until_a_write() {
        let clock = fixed_clock();
        let inner = Arc::new(MemoryRowStore::new());
        let cache = Arc::new(CacheRegistry::new(&CacheConfig::default(), clock.clone()));
        let store = CachedRowStore::new(inner.clone(), cache.clone());
        inner.seed("notifications", [row(json!({"id": "n1", "user_id": "u1", "read": false}))]);

        assert_eq!(store.count(&unread()).await.unwrap(), 1);
        // Written behind the cache's back.
        inner.seed("notifications", [row(json!({"id": "n2", "user_id": "u1", "read": false}))]);
        assert_eq!(store.count(&unread()).await.unwrap(), 1);
        assert_eq!(cache.stats(CacheKind::Query).hits, 1);

        let patch = row(json!({"read": true}));
        store
            .update(&RowQuery::table("notifications").eq("id", "n1"), patch)
            .await
            .unwrap();
        assert_eq!(store.count(&unread()).await.unwrap(), 1);
        assert_eq!(store.select(&unread()).await.unwrap()[0]["id"], "n2");
    }

    #[tokio::test]
    async fn entries_expire_and_errors_are_not_cached() {
        let clock = fixed_clock();
        let inner = Arc::new(FlakyRowStore::new());
        let cache = Arc::new(CacheRegistry::new(&CacheConfig::default(), clock.clone()));
        let store = CachedRowStore::new(inner.clone(), cache);

        inner.fail_table("notifications");
        assert!(store.count(&unread()).await.is_err());
        inner.heal_table("notifications");
        assert_eq!(store.count(&unread()).await.unwrap(), 0);

        inner
            .inner()
            .seed("notifications", [row(json!({"user_id": "u1", "read": false}))]);
        assert_eq!(store.count(&unread()).await.unwrap(), 0);
        clock.advance(Duration::from_secs(CacheConfig::default().query.ttl_secs + 1));
        assert_eq!(store.count(&unread()).await.unwrap(), 1);
    }
}
