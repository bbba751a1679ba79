// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics for the Notifly pipeline.
//!
//! Uses the metrics-rs facade with the Prometheus exporter. The rendered
//! text can be written out for a textfile collector.

pub mod recording;

use std::path::Path;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use notifly_core::{AdapterType, HealthStatus, NotiflyError, PluginAdapter};

pub use recording::{
    record_alert, record_outcome, record_push_receipt, set_badge_count, set_metric_value,
    set_queue_depth,
};

/// Installs the Prometheus recorder and renders collected metrics.
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Installs the recorder globally. Only one recorder can be installed
    /// per process; a second call returns an error.
    pub fn new() -> Result<Self, NotiflyError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            NotiflyError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// All collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Atomically replace `path` with the rendered metrics.
    pub fn write_textfile(&self, path: &Path) -> Result<(), NotiflyError> {
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, self.render())
            .and_then(|()| std::fs::rename(&tmp, path))
            .map_err(|e| NotiflyError::Storage {
                source: Box::new(e),
            })
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Metrics
    }

    async fn health_check(&self) -> Result<HealthStatus, NotiflyError> {
        Ok(HealthStatus::Healthy)
    }
}
