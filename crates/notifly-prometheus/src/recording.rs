// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade, so these are no-ops until a recorder is
//! installed.

use metrics::{describe_counter, describe_gauge};

/// Register all Notifly metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "notifly_deliveries_total",
        "Dispatch attempts, by outcome"
    );
    describe_counter!(
        "notifly_push_receipts_total",
        "Push relay receipts, by status"
    );
    describe_counter!("notifly_alerts_total", "Alerts fired, by severity");
    describe_gauge!("notifly_queue_pending", "Items waiting in the delivery queue");
    describe_gauge!("notifly_queue_dead_letter", "Items in the dead-letter list");
    describe_gauge!("notifly_badge_count", "Last known unread badge count");
    describe_gauge!(
        "notifly_metric_value",
        "Latest monitoring sample, by metric"
    );
}

/// Count one dispatch outcome.
pub fn record_outcome(outcome: &'static str) {
    metrics::counter!("notifly_deliveries_total", "outcome" => outcome).increment(1);
}

/// Count one push relay receipt.
pub fn record_push_receipt(status: &'static str) {
    metrics::counter!("notifly_push_receipts_total", "status" => status).increment(1);
}

pub fn record_alert(rule: &str, severity: &str) {
    metrics::counter!(
        "notifly_alerts_total",
        "rule" => rule.to_string(),
        "severity" => severity.to_string()
    )
    .increment(1);
}

pub fn set_queue_depth(pending: usize, dead_letter: usize) {
    metrics::gauge!("notifly_queue_pending").set(pending as f64);
    metrics::gauge!("notifly_queue_dead_letter").set(dead_letter as f64);
}

pub fn set_badge_count(count: u32) {
    metrics::gauge!("notifly_badge_count").set(f64::from(count));
}

pub fn set_metric_value(metric: &str, value: f64) {
    metrics::gauge!("notifly_metric_value", "metric" => metric.to_string()).set(value);
}
