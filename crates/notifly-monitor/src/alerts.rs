// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Threshold rules, cooldowns, and alert lifecycle.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use notifly_config::AlertRuleConfig;
use notifly_core::clock::add_duration;
use notifly_core::{MetricKind, NotiflyError};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::metrics::MetricSample;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Severity from the relative deviation `|value - threshold| / |threshold|`.
///
/// Above 0.5 is critical, above 0.3 high, above 0.1 medium. A zero
/// threshold with any other value is critical.
pub fn severity_for(value: f64, threshold: f64) -> Severity {
    let deviation = (value - threshold).abs();
    if threshold == 0.0 {
        return if deviation == 0.0 {
            Severity::Low
        } else {
            Severity::Critical
        };
    }
    let relative = deviation / threshold.abs();
    if relative > 0.5 {
        Severity::Critical
    } else if relative > 0.3 {
        Severity::High
    } else if relative > 0.1 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: String,
    pub rule: String,
    pub metric: MetricKind,
    pub value: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Evaluates rules against samples and keeps the most recent alerts.
#[derive(Debug)]
pub struct AlertEngine {
    rules: Vec<AlertRuleConfig>,
    retention: usize,
    alerts: VecDeque<AlertEvent>,
    last_fired: HashMap<String, DateTime<Utc>>,
}

impl AlertEngine {
    pub fn new(rules: Vec<AlertRuleConfig>, retention: usize) -> Self {
        Self {
            rules,
            retention,
            alerts: VecDeque::new(),
            last_fired: HashMap::new(),
        }
    }

    /// Replace history with `alerts` (oldest first) and rebuild cooldowns from it.
    pub fn restore(&mut self, alerts: Vec<AlertEvent>) {
        self.last_fired.clear();
        for alert in &alerts {
            let entry = self
                .last_fired
                .entry(alert.rule.clone())
                .or_insert(alert.timestamp);
            if alert.timestamp > *entry {
                *entry = alert.timestamp;
            }
        }
        self.alerts = alerts.into();
        self.trim();
    }

    fn trim(&mut self) {
        while self.alerts.len() > self.retention {
            self.alerts.pop_front();
        }
    }

    fn in_cooldown(&self, rule: &AlertRuleConfig, now: DateTime<Utc>) -> bool {
        self.last_fired
            .get(&rule.name)
            .is_some_and(|fired| now < add_duration(*fired, rule.cooldown()))
    }

    /// Check every rule against `sample`. Returns the alerts that fired.
    ///
    /// Rules whose metric is missing from the sample are skipped. A rule
    /// that no longer holds resolves its open alerts.
    pub fn evaluate(&mut self, sample: &MetricSample, now: DateTime<Utc>) -> Vec<AlertEvent> {
        let mut fired = Vec::new();
        for rule in &self.rules {
            let Some(value) = sample.get(rule.metric) else {
                continue;
            };
            if !rule.operator.holds(value, rule.threshold) {
                for alert in self
                    .alerts
                    .iter_mut()
                    .filter(|a| a.rule == rule.name && !a.resolved)
                {
                    alert.resolved = true;
                    alert.resolved_at = Some(now);
                }
                continue;
            }
            if self.in_cooldown(rule, now) {
                continue;
            }
            fired.push(AlertEvent {
                id: uuid::Uuid::new_v4().to_string(),
                rule: rule.name.clone(),
                metric: rule.metric,
                value,
                threshold: rule.threshold,
                severity: severity_for(value, rule.threshold),
                timestamp: now,
                resolved: false,
                resolved_at: None,
            });
        }
        for alert in &fired {
            self.last_fired.insert(alert.rule.clone(), now);
            self.alerts.push_back(alert.clone());
        }
        self.trim();
        fired
    }

    /// Mark alert `id` resolved.
    pub fn resolve(&mut self, id: &str, now: DateTime<Utc>) -> Result<AlertEvent, NotiflyError> {
        let alert = self
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| NotiflyError::NotFound(format!("alert {id}")))?;
        if !alert.resolved {
            alert.resolved = true;
            alert.resolved_at = Some(now);
        }
        Ok(alert.clone())
    }

    /// Alerts oldest first.
    pub fn alerts(&self) -> Vec<AlertEvent> {
        self.alerts.iter().cloned().collect()
    }

    pub fn open_alerts(&self) -> Vec<AlertEvent> {
        self.alerts.iter().filter(|a| !a.resolved).cloned().collect()
    }

    pub fn rules(&self) -> &[AlertRuleConfig] {
        &self.rules
    }
}
