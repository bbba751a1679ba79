// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `notifly status` command implementation.
//!
//! Reads the persisted queue and monitor state. Plain output is meant for
//! people; `--json` for scripts.

use notifly_config::NotiflyConfig;
use notifly_core::NotiflyError;
use notifly_dispatch::{NotificationPipeline, PipelineStatus};

/// Open the pipeline and restore its persisted state without starting it.
pub async fn open_pipeline(config: &NotiflyConfig) -> Result<NotificationPipeline, NotiflyError> {
    let pipeline = NotificationPipeline::from_config(config).await?;
    pipeline.load().await?;
    Ok(pipeline)
}

pub async fn run_status(config: &NotiflyConfig, json: bool) -> Result<(), NotiflyError> {
    let pipeline = open_pipeline(config).await?;
    let status = pipeline.status();
    if json {
        let rendered = serde_json::to_string_pretty(&status)
            .map_err(|e| NotiflyError::Internal(format!("failed to encode status: {e}")))?;
        println!("{rendered}");
    } else {
        print!("{}", format_status(&status));
    }
    Ok(())
}

fn format_status(status: &PipelineStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!("device:       {}\n", status.device_id));
    out.push_str(&format!(
        "user:         {}\n",
        status.user_id.as_deref().unwrap_or("(not signed in)")
    ));
    out.push_str(&format!(
        "queue:        {} pending ({} ready), {} dead-lettered\n",
        status.queue.pending, status.queue.ready, status.queue.failed
    ));
    out.push_str(&format!("open alerts:  {}\n", status.open_alerts));
    if let Some(badge) = status.badge {
        out.push_str(&format!("badge:        {badge}\n"));
    }
    match &status.latest_sample {
        Some(sample) => {
            out.push_str(&format!("last sample:  {}\n", sample.timestamp.to_rfc3339()));
            for (metric, value) in &sample.values {
                out.push_str(&format!("  {metric:<26} {value:.3}\n"));
            }
        }
        None => out.push_str("last sample:  none\n"),
    }
    out
}
