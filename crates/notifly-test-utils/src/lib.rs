// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Notifly integration tests.
//!
//! Provides scripted adapters and fixtures for fast, deterministic tests
//! without a live backend or push relay.
//!
//! # Components
//!
//! - [`MockPushRelay`] - push relay with scripted receipts and captured messages
//! - [`RecordingBadgeSetter`] - OS badge setter that records every value
//! - [`FlakyRowStore`] - in-memory row store whose tables can be made to fail
//! - [`fixed_clock`], [`row`] - fixtures

pub mod flaky_rows;
pub mod mock_badge;
pub mod mock_push;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use notifly_core::{ManualClock, Row};

pub use flaky_rows::FlakyRowStore;
pub use mock_badge::RecordingBadgeSetter;
pub use mock_push::{MockPushRelay, Scripted};
pub use notifly_backend::{LocalPubSub, MemoryRowStore};

/// A manual clock parked at 2026-05-01 12:00:00 UTC.
pub fn fixed_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0)
            .single()
            .unwrap_or_default(),
    ))
}

/// Build a row from a JSON object literal. Non-objects yield an empty row.
pub fn row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Row::new(),
    }
}
