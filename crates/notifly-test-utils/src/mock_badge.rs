// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OS badge setter that records what it was told.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use notifly_core::{AdapterType, BadgeSetter, HealthStatus, NotiflyError, PluginAdapter};

pub struct RecordingBadgeSetter {
    values: Arc<Mutex<Vec<u32>>>,
    failing: AtomicBool,
}

impl RecordingBadgeSetter {
    pub fn new() -> Self {
        Self {
            values: Arc::new(Mutex::new(Vec::new())),
            failing: AtomicBool::new(false),
        }
    }

    /// Make subsequent calls fail (and not be recorded).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every value set, oldest first.
    pub async fn values(&self) -> Vec<u32> {
        self.values.lock().await.clone()
    }

    pub async fn last(&self) -> Option<u32> {
        self.values.lock().await.last().copied()
    }
}

impl Default for RecordingBadgeSetter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for RecordingBadgeSetter {
    fn name(&self) -> &str {
        "recording-badge"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Badge
    }

    async fn health_check(&self) -> Result<HealthStatus, NotiflyError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl BadgeSetter for RecordingBadgeSetter {
    async fn set_badge_count(&self, count: u32) -> Result<(), NotiflyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotiflyError::Internal("badge permission revoked".into()));
        }
        self.values.lock().await.push(count);
        Ok(())
    }
}
