// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `notifly retry-failed` and `notifly purge-failed`.

use notifly_config::NotiflyConfig;
use notifly_core::NotiflyError;

use crate::status::open_pipeline;

pub async fn run_retry_failed(config: &NotiflyConfig) -> Result<(), NotiflyError> {
    let pipeline = open_pipeline(config).await?;
    let moved = pipeline.queue().retry_failed_notifications().await;
    println!("requeued {moved} failed notification(s)");
    Ok(())
}

pub async fn run_purge_failed(config: &NotiflyConfig) -> Result<(), NotiflyError> {
    let pipeline = open_pipeline(config).await?;
    let dropped = pipeline.queue().purge_failed().await;
    println!("purged {dropped} failed notification(s)");
    Ok(())
}
