// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric sampling.
//!
//! Delivery rates come from the local counters, drained on every sample.
//! Engagement, volume, and active users are counted in the backend over the
//! configured look-back window; a count that fails is left out of the
//! sample rather than reported as zero.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use notifly_core::types::format_timestamp;
use notifly_core::{Clock, MetricKind, RowQuery, RowStore};
use notifly_queue::DeliveryStats;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Metric values observed at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<MetricKind, f64>,
}

impl MetricSample {
    pub fn get(&self, metric: MetricKind) -> Option<f64> {
        self.values.get(&metric).copied()
    }
}

pub struct MetricsSampler {
    rows: Arc<dyn RowStore>,
    stats: Arc<DeliveryStats>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl MetricsSampler {
    pub fn new(
        rows: Arc<dyn RowStore>,
        stats: Arc<DeliveryStats>,
        clock: Arc<dyn Clock>,
        window: Duration,
    ) -> Self {
        Self {
            rows,
            stats,
            clock,
            window,
        }
    }

    async fn count(&self, metric: MetricKind, query: RowQuery) -> Option<u64> {
        match self.rows.count(&query).await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(%metric, table = %query.table, error = %e, "metric query failed, omitting from sample");
                None
            }
        }
    }

    /// Distinct `user_id`s among the matching rows; a user with several
    /// devices counts once.
    async fn distinct_users(&self, query: RowQuery) -> Option<usize> {
        match self.rows.select(&query).await {
            Ok(rows) => Some(
                rows.iter()
                    .filter_map(|row| row.get("user_id").and_then(|v| v.as_str()))
                    .collect::<BTreeSet<_>>()
                    .len(),
            ),
            Err(e) => {
                warn!(metric = %MetricKind::ActiveUsers, table = %query.table, error = %e, "metric query failed, omitting from sample");
                None
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub async fn sample(&self) -> MetricSample {
        let now = self.clock.now();
        let deliveries = self.stats.take_snapshot();
        let mut values = BTreeMap::from([
            (MetricKind::DeliverySuccessRate, deliveries.success_rate()),
            (MetricKind::ErrorRate, deliveries.error_rate()),
            (MetricKind::AverageDeliveryTime, deliveries.average_latency_ms()),
            (MetricKind::TokenInvalidationRate, deliveries.token_invalidation_rate()),
        ]);

        let since = TimeDelta::from_std(self.window)
            .ok()
            .and_then(|w| now.checked_sub_signed(w))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let since = format_timestamp(since);
        let recent = RowQuery::table("notifications").gte("created_at", since.as_str());

        let volume = self.count(MetricKind::Volume, recent.clone()).await;
        if let Some(volume) = volume {
            values.insert(MetricKind::Volume, volume as f64);
        }
        let read = self
            .count(MetricKind::EngagementRate, recent.eq("read", true))
            .await;
        // Engagement is undefined without traffic.
        if let (Some(volume), Some(read)) = (volume, read)
            && volume > 0
        {
            values.insert(MetricKind::EngagementRate, read as f64 / volume as f64);
        }

        let active = RowQuery::table("push_tokens")
            .eq("is_active", true)
            .gte("updated_at", since.as_str());
        if let Some(users) = self.distinct_users(active).await {
            values.insert(MetricKind::ActiveUsers, users as f64);
        }

        debug!(metrics = values.len(), attempted = deliveries.attempted, "metrics sampled");
        MetricSample {
            timestamp: now,
            values,
        }
    }
}
