// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `notifly alerts` subcommands.

use notifly_config::NotiflyConfig;
use notifly_core::NotiflyError;
use notifly_monitor::AlertEvent;

use crate::status::open_pipeline;

pub async fn run_list(config: &NotiflyConfig, all: bool, json: bool) -> Result<(), NotiflyError> {
    let pipeline = open_pipeline(config).await?;
    let mut alerts = if all {
        pipeline.monitor().alerts()
    } else {
        pipeline.monitor().open_alerts()
    };
    alerts.reverse();

    if json {
        let rendered = serde_json::to_string_pretty(&alerts)
            .map_err(|e| NotiflyError::Internal(format!("failed to encode alerts: {e}")))?;
        println!("{rendered}");
    } else if alerts.is_empty() {
        println!("no alerts");
    } else {
        for alert in &alerts {
            println!("{}", format_alert(alert));
        }
    }
    Ok(())
}

pub async fn run_resolve(config: &NotiflyConfig, id: &str) -> Result<(), NotiflyError> {
    let pipeline = open_pipeline(config).await?;
    let alert = pipeline.monitor().resolve_alert(id).await?;
    println!("resolved {} ({})", alert.id, alert.rule);
    Ok(())
}

fn format_alert(alert: &AlertEvent) -> String {
    let state = if alert.resolved { "resolved" } else { "open" };
    format!(
        "{id}  {severity:<8} {state:<8} {rule}: {metric}={value:.3} (threshold {threshold})  {at}",
        id = alert.id,
        severity = alert.severity.to_string(),
        rule = alert.rule,
        metric = alert.metric,
        value = alert.value,
        threshold = alert.threshold,
        at = alert.timestamp.to_rfc3339(),
    )
}
