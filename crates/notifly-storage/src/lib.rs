// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for Notifly's device-local state.
//!
//! Queue contents, the dead-letter list, alert and metric history and the
//! generated device id are kept as JSON values in a single WAL-mode table,
//! exposed through the [`KvStore`](notifly_core::KvStore) trait.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteKvStore;
pub use database::Database;
