// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row store that fails on demand.
//!
//! Wraps a [`MemoryRowStore`]; every operation on a table marked with
//! [`FlakyRowStore::fail_table`] returns a transient backend error.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use notifly_backend::MemoryRowStore;
use notifly_core::{AdapterType, HealthStatus, NotiflyError, PluginAdapter, Row, RowQuery, RowStore};

#[derive(Default)]
pub struct FlakyRowStore {
    inner: MemoryRowStore,
    failing: Mutex<HashSet<String>>,
}

impl FlakyRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The wrapped store, for seeding and inspection.
    pub fn inner(&self) -> &MemoryRowStore {
        &self.inner
    }

    pub fn fail_table(&self, table: &str) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(table.to_string());
    }

    pub fn heal_table(&self, table: &str) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(table);
    }

    fn check(&self, table: &str) -> Result<(), NotiflyError> {
        if self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(table)
        {
            Err(NotiflyError::backend(
                format!("{table}: connection reset by peer"),
                true,
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PluginAdapter for FlakyRowStore {
    fn name(&self) -> &str {
        "flaky-rows"
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
impl RowStore for FlakyRowStore {
    async fn select(&self, query: &RowQuery) -> Result<Vec<Row>, NotiflyError> {
        self.check(&query.table)?;
        self.inner.select(query).await
    }

    async fn count(&self, query: &RowQuery) -> Result<u64, NotiflyError> {
        self.check(&query.table)?;
        self.inner.count(query).await
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, NotiflyError> {
        self.check(table)?;
        self.inner.insert(table, row).await
    }

    async fn upsert(&self, table: &str, row: Row, on_conflict: &[&str]) -> Result<Row, NotiflyError> {
        self.check(table)?;
        self.inner.upsert(table, row, on_conflict).await
    }

    async fn update(&self, query: &RowQuery, patch: Row) -> Result<u64, NotiflyError> {
        self.check(&query.table)?;
        self.inner.update(query, patch).await
    }

    async fn delete(&self, query: &RowQuery) -> Result<u64, NotiflyError> {
        self.check(&query.table)?;
        self.inner.delete(query).await
    }
}
