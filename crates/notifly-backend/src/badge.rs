// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Badge setter for hosts without an app icon.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use notifly_core::{AdapterType, BadgeSetter, HealthStatus, NotiflyError, PluginAdapter};
use tracing::info;

/// Logs badge changes and remembers the last value.
#[derive(Debug, Default)]
pub struct LogBadgeSetter {
    last: AtomicU32,
}

impl LogBadgeSetter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> u32 {
        self.last.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PluginAdapter for LogBadgeSetter {
    fn name(&self) -> &str {
        "log-badge"
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
impl BadgeSetter for LogBadgeSetter {
    async fn set_badge_count(&self, count: u32) -> Result<(), NotiflyError> {
        let previous = self.last.swap(count, Ordering::Relaxed);
        if previous != count {
            info!(count, previous, "badge updated");
        }
        Ok(())
    }
}
