// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process row store.
//!
//! Stands in for the backend when no `backend.url` is configured, and backs
//! most tests. Queries are evaluated with [`RowQuery::apply`].

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use notifly_core::{AdapterType, HealthStatus, NotiflyError, PluginAdapter, Row, RowQuery, RowStore};
use serde_json::Value;

#[derive(Debug, Default)]
pub struct MemoryRowStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Row>>> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append rows to `table` as-is.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        self.lock()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Every row of `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock().get(table).cloned().unwrap_or_default()
    }
}

fn with_id(mut row: Row) -> Row {
    if !row.contains_key("id") {
        row.insert("id".into(), Value::String(uuid::Uuid::new_v4().to_string()));
    }
    row
}

#[async_trait]
impl PluginAdapter for MemoryRowStore {
    fn name(&self) -> &str {
        "memory-rows"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::RowStore
    }

    async fn health_check(&self) -> Result<HealthStatus, NotiflyError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn select(&self, query: &RowQuery) -> Result<Vec<Row>, NotiflyError> {
        let tables = self.lock();
        Ok(tables
            .get(&query.table)
            .map(|rows| query.apply(rows))
            .unwrap_or_default())
    }

    async fn count(&self, query: &RowQuery) -> Result<u64, NotiflyError> {
        let tables = self.lock();
        Ok(tables
            .get(&query.table)
            .map(|rows| rows.iter().filter(|r| query.matches(r)).count() as u64)
            .unwrap_or(0))
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, NotiflyError> {
        let row = with_id(row);
        self.lock()
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn upsert(
        &self,
        table: &str,
        row: Row,
        on_conflict: &[&str],
    ) -> Result<Row, NotiflyError> {
        let mut tables = self.lock();
        let rows = tables.entry(table.to_string()).or_default();
        let existing = rows.iter_mut().find(|existing| {
            !on_conflict.is_empty()
                && on_conflict
                    .iter()
                    .all(|col| existing.get(*col) == row.get(*col))
        });
        match existing {
            Some(existing) => {
                existing.extend(row);
                Ok(existing.clone())
            }
            None => {
                let row = with_id(row);
                rows.push(row.clone());
                Ok(row)
            }
        }
    }

    async fn update(&self, query: &RowQuery, patch: Row) -> Result<u64, NotiflyError> {
        let mut tables = self.lock();
        let mut updated = 0;
        if let Some(rows) = tables.get_mut(&query.table) {
            for row in rows.iter_mut().filter(|r| query.matches(r)) {
                row.extend(patch.clone());
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete(&self, query: &RowQuery) -> Result<u64, NotiflyError> {
        let mut tables = self.lock();
        let Some(rows) = tables.get_mut(&query.table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !query.matches(r));
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn upsert_merges_on_conflict_key() {
        let store = MemoryRowStore::new();
        store
            .upsert(
                "push_tokens",
                row(json!({"user_id": "u1", "device_id": "d1", "token": "a"})),
                &["user_id", "device_id"],
            )
            .await
            .unwrap();
        let merged = store
            .upsert(
                "push_tokens",
                row(json!({"user_id": "u1", "device_id": "d1", "token": "b"})),
                &["user_id", "device_id"],
            )
            .await
            .unwrap();
        assert_eq!(merged["token"], "b");
        assert!(merged.contains_key("id"));
        assert_eq!(store.rows("push_tokens").len(), 1);

        store
            .upsert(
                "push_tokens",
                row(json!({"user_id": "u1", "device_id": "d2", "token": "c"})),
                &["user_id", "device_id"],
            )
            .await
            .unwrap();
        assert_eq!(store.rows("push_tokens").len(), 2);
    }

    #[tokio::test]
    async fn update_count_and_delete_respect_filters() {
        let store = MemoryRowStore::new();
        store.seed(
            "notifications",
            [
                row(json!({"id": "n1", "user_id": "u1", "read": false})),
                row(json!({"id": "n2", "user_id": "u1", "read": false})),
                row(json!({"id": "n3", "user_id": "u2", "read": false})),
            ],
        );
        let unread = RowQuery::table("notifications").eq("user_id", "u1").eq("read", false);
        assert_eq!(store.count(&unread).await.unwrap(), 2);

        let n = store
            .update(
                &RowQuery::table("notifications").eq("id", "n1"),
                row(json!({"read": true})),
            )
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.count(&unread).await.unwrap(), 1);

        assert_eq!(store.delete(&RowQuery::table("notifications").eq("user_id", "u2")).await.unwrap(), 1);
        assert_eq!(store.delete(&RowQuery::table("missing")).await.unwrap(), 0);
    }
}
