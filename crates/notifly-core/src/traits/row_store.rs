// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relational row store adapter trait (the backend's Postgres-over-REST).

use async_trait::async_trait;

use crate::error::NotiflyError;
use crate::query::{Row, RowQuery};
use crate::traits::adapter::PluginAdapter;

/// Adapter for the backend's row-oriented table interface.
#[async_trait]
pub trait RowStore: PluginAdapter {
    /// Rows matching the query, ordered and ranged.
    async fn select(&self, query: &RowQuery) -> Result<Vec<Row>, NotiflyError>;

    /// Number of rows matching the query's filters (order and range ignored).
    async fn count(&self, query: &RowQuery) -> Result<u64, NotiflyError>;

    /// Insert a row and return it as stored.
    async fn insert(&self, table: &str, row: Row) -> Result<Row, NotiflyError>;

    /// Insert, or merge into the existing row with equal `on_conflict` columns.
    async fn upsert(
        &self,
        table: &str,
        row: Row,
        on_conflict: &[&str],
    ) -> Result<Row, NotiflyError>;

    /// Merge `patch` into every matching row. Returns the number updated.
    async fn update(&self, query: &RowQuery, patch: Row) -> Result<u64, NotiflyError>;

    /// Delete every matching row. Returns the number deleted.
    async fn delete(&self, query: &RowQuery) -> Result<u64, NotiflyError>;
}
