// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Monitoring and alerting for the Notifly pipeline.
//!
//! A [`MetricsSampler`] turns local delivery counters and backend counts
//! into a [`MetricSample`]; an [`AlertEngine`] checks each sample against
//! threshold rules with cooldowns; the [`Monitor`] runs both on an interval
//! and keeps bounded, persisted history of samples and alerts.

pub mod alerts;
pub mod metrics;
pub mod monitor;

pub use alerts::{AlertEngine, AlertEvent, Severity, severity_for};
pub use metrics::{MetricSample, MetricsSampler};
pub use monitor::{ALERTS_KEY, HISTORY_KEY, Monitor, MonitorTick};
