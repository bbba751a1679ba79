// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The periodic monitoring loop.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use notifly_config::MonitorConfig;
use notifly_core::traits::kv::{load_json, save_json};
use notifly_core::{Clock, KvStore, NotiflyError, SingleFlight, spawn_periodic};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alerts::{AlertEngine, AlertEvent, Severity};
use crate::metrics::{MetricSample, MetricsSampler};

/// Key holding persisted alerts.
pub const ALERTS_KEY: &str = "monitor.alerts";
/// Key holding persisted metric samples.
pub const HISTORY_KEY: &str = "monitor.history";

/// Result of one monitoring pass.
#[derive(Debug, Clone)]
pub struct MonitorTick {
    pub sample: MetricSample,
    pub fired: Vec<AlertEvent>,
}

pub struct Monitor {
    sampler: MetricsSampler,
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    engine: Mutex<AlertEngine>,
    history: Mutex<VecDeque<MetricSample>>,
    history_retention: usize,
    interval: std::time::Duration,
    flight: SingleFlight,
    persist_lock: tokio::sync::Mutex<()>,
}

impl Monitor {
    pub fn new(
        config: &MonitorConfig,
        sampler: MetricsSampler,
        kv: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sampler,
            kv,
            clock,
            engine: Mutex::new(AlertEngine::new(config.rules.clone(), config.alert_retention)),
            history: Mutex::new(VecDeque::new()),
            history_retention: config.history_retention,
            interval: config.interval(),
            flight: SingleFlight::new(),
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn engine(&self) -> std::sync::MutexGuard<'_, AlertEngine> {
        self.engine.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn history_guard(&self) -> std::sync::MutexGuard<'_, VecDeque<MetricSample>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Restore alerts and samples from storage.
    pub async fn load(&self) -> Result<(), NotiflyError> {
        let alerts: Vec<AlertEvent> = load_json(self.kv.as_ref(), ALERTS_KEY)
            .await?
            .unwrap_or_default();
        let samples: Vec<MetricSample> = load_json(self.kv.as_ref(), HISTORY_KEY)
            .await?
            .unwrap_or_default();
        let alert_count = alerts.len();
        self.engine().restore(alerts);
        {
            let mut history = self.history_guard();
            *history = samples.into();
            while history.len() > self.history_retention {
                history.pop_front();
            }
        }
        debug!(alerts = alert_count, "monitor history restored");
        Ok(())
    }

    async fn persist(&self) {
        let _write = self.persist_lock.lock().await;
        let alerts = self.engine().alerts();
        let samples: Vec<MetricSample> = self.history_guard().iter().cloned().collect();
        if let Err(e) = save_json(self.kv.as_ref(), ALERTS_KEY, &alerts).await {
            warn!(error = %e, "failed to persist alerts");
        }
        if let Err(e) = save_json(self.kv.as_ref(), HISTORY_KEY, &samples).await {
            warn!(error = %e, "failed to persist metric history");
        }
    }

    /// Sample metrics and evaluate rules once.
    ///
    /// Returns `None` if a pass is already running.
    pub async fn run_once(&self) -> Option<MonitorTick> {
        let _flight = self.flight.try_begin()?;
        let sample = self.sampler.sample().await;
        let fired = self.engine().evaluate(&sample, self.clock.now());
        {
            let mut history = self.history_guard();
            history.push_back(sample.clone());
            while history.len() > self.history_retention {
                history.pop_front();
            }
        }
        for alert in &fired {
            log_alert(alert);
        }
        self.persist().await;
        Some(MonitorTick { sample, fired })
    }

    /// Resolve alert `id` by hand.
    pub async fn resolve_alert(&self, id: &str) -> Result<AlertEvent, NotiflyError> {
        let alert = self.engine().resolve(id, self.clock.now())?;
        self.persist().await;
        info!(id, rule = %alert.rule, "alert resolved");
        Ok(alert)
    }

    pub fn alerts(&self) -> Vec<AlertEvent> {
        self.engine().alerts()
    }

    pub fn open_alerts(&self) -> Vec<AlertEvent> {
        self.engine().open_alerts()
    }

    /// Samples oldest first.
    pub fn history(&self) -> Vec<MetricSample> {
        self.history_guard().iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<MetricSample> {
        self.history_guard().back().cloned()
    }

    /// Run [`run_once`](Self::run_once) on the configured interval until
    /// `cancel` fires, passing every completed pass to `observe`.
    pub fn spawn<F>(self: Arc<Self>, cancel: CancellationToken, observe: F) -> JoinHandle<()>
    where
        F: Fn(&MonitorTick) + Send + Sync + 'static,
    {
        let observe = Arc::new(observe);
        let interval = self.interval;
        spawn_periodic("monitor", interval, cancel, move || {
            let monitor = self.clone();
            let observe = observe.clone();
            async move {
                if let Some(tick) = monitor.run_once().await {
                    observe(&tick);
                }
            }
        })
    }
}

fn log_alert(alert: &AlertEvent) {
    match alert.severity {
        Severity::Critical | Severity::High => error!(
            rule = %alert.rule,
            metric = %alert.metric,
            value = alert.value,
            threshold = alert.threshold,
            severity = %alert.severity,
            "alert fired"
        ),
        Severity::Medium | Severity::Low => warn!(
            rule = %alert.rule,
            metric = %alert.metric,
            value = alert.value,
            threshold = alert.threshold,
            severity = %alert.severity,
            "alert fired"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notifly_config::{AlertRuleConfig, Comparison};
    use notifly_core::{ManualClock, MemoryKvStore, MetricKind};
    use notifly_queue::DeliveryStats;
    use notifly_test_utils::{MemoryRowStore, fixed_clock};
    use std::time::Duration;

    struct Fixture {
        monitor: Monitor,
        stats: Arc<DeliveryStats>,
        kv: Arc<MemoryKvStore>,
        clock: Arc<ManualClock>,
    }

    fn config(history_retention: usize) -> MonitorConfig {
        MonitorConfig {
            history_retention,
            rules: vec![AlertRuleConfig {
                name: "high_error_rate".into(),
                metric: MetricKind::ErrorRate,
                operator: Comparison::Gt,
                threshold: 0.05,
                cooldown_secs: 900,
            }],
            ..MonitorConfig::default()
        }
    }

    fn fixture_with(kv: Arc<MemoryKvStore>, history_retention: usize) -> Fixture {
        let clock = fixed_clock();
        let stats = Arc::new(DeliveryStats::new());
        let sampler = MetricsSampler::new(
            Arc::new(MemoryRowStore::new()),
            stats.clone(),
            clock.clone(),
            Duration::from_secs(3600),
        );
        Fixture {
            monitor: Monitor::new(&config(history_retention), sampler, kv.clone(), clock.clone()),
            stats,
            kv,
            clock,
        }
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn failing_deliveries_raise_an_alert() {
        let f = fixture_with(Arc::new(MemoryKvStore::new()), 10);
        f.stats.record_delivered(Duration::from_millis(10));
        f.stats.record_failure(false);

        let tick = f.monitor.run_once().await.unwrap();
        assert_eq!(tick.sample.get(MetricKind::ErrorRate), Some(0.5));
        assert_eq!(tick.fired.len(), 1);
        assert_eq!(tick.fired[0].severity, Severity::Critical);
        assert!(logs_contain("alert fired"));
        assert!(logs_contain("high_error_rate"));

        // Healthy traffic in the next interval resolves it.
        f.clock.advance(Duration::from_secs(60));
        f.stats.record_delivered(Duration::from_millis(10));
        let tick = f.monitor.run_once().await.unwrap();
        assert!(tick.fired.is_empty());
        assert!(f.monitor.open_alerts().is_empty());
        assert_eq!(f.monitor.alerts().len(), 1);
    }

    #[tokio::test]
    async fn history_persists_and_is_bounded() {
        let kv = Arc::new(MemoryKvStore::new());
        let f = fixture_with(kv.clone(), 2);
        f.stats.record_failure(true);
        f.monitor.run_once().await.unwrap();
        for _ in 0..2 {
            f.clock.advance(Duration::from_secs(60));
            f.monitor.run_once().await.unwrap();
        }
        assert_eq!(f.monitor.history().len(), 2);
        assert_eq!(f.monitor.latest().unwrap().timestamp, f.clock.now());

        let restored = fixture_with(kv, 2);
        restored.monitor.load().await.unwrap();
        assert_eq!(restored.monitor.history(), f.monitor.history());
        assert_eq!(restored.monitor.alerts(), f.monitor.alerts());
        let stored: Vec<MetricSample> = load_json(f.kv.as_ref(), HISTORY_KEY).await.unwrap().unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn resolve_alert_by_id() {
        let f = fixture_with(Arc::new(MemoryKvStore::new()), 10);
        f.stats.record_failure(false);
        let tick = f.monitor.run_once().await.unwrap();
        let id = tick.fired[0].id.clone();

        let resolved = f.monitor.resolve_alert(&id).await.unwrap();
        assert!(resolved.resolved);
        assert_eq!(resolved.resolved_at, Some(f.clock.now()));
        assert!(f.monitor.resolve_alert("missing").await.is_err());
    }
}
