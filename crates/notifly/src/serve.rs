// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `notifly serve` command implementation.
//!
//! Builds the pipeline from configuration, installs the Prometheus recorder
//! when enabled, and runs until a shutdown signal arrives.

use notifly_config::NotiflyConfig;
use notifly_core::NotiflyError;
use notifly_dispatch::{NotificationPipeline, install_signal_handler};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub async fn run_serve(config: NotiflyConfig) -> Result<(), NotiflyError> {
    init_tracing(&config.device.log_level);

    #[cfg(feature = "prometheus")]
    let prometheus = if config.prometheus.enabled {
        match notifly_prometheus::PrometheusAdapter::new() {
            Ok(adapter) => {
                info!("prometheus metrics enabled");
                Some(std::sync::Arc::new(adapter))
            }
            Err(e) => {
                warn!(error = %e, "failed to initialize prometheus, continuing without metrics");
                None
            }
        }
    } else {
        None
    };

    let pipeline = NotificationPipeline::from_config(&config).await?;
    let cancel = install_signal_handler();
    let running = pipeline.start(cancel.clone()).await?;

    #[cfg(feature = "prometheus")]
    let textfile = match (&prometheus, &config.prometheus.textfile_path) {
        (Some(adapter), Some(path)) => Some(spawn_textfile_writer(
            adapter.clone(),
            std::path::PathBuf::from(path),
            config.monitor.interval(),
            cancel.clone(),
        )),
        _ => None,
    };

    info!(device_id = %pipeline.device_id(), "notifly running, press Ctrl+C to stop");
    cancel.cancelled().await;

    info!("shutting down");
    running.join().await;
    #[cfg(feature = "prometheus")]
    if let Some(handle) = textfile {
        join_logged("metrics-textfile", handle).await;
    }
    info!("notifly stopped");
    Ok(())
}

/// Wait for a background task, logging a panic or cancellation instead of
/// dropping it.
async fn join_logged(task: &str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        warn!(task, error = %e, "background task ended abnormally");
    }
}

#[cfg(feature = "prometheus")]
fn spawn_textfile_writer(
    adapter: std::sync::Arc<notifly_prometheus::PrometheusAdapter>,
    path: std::path::PathBuf,
    period: std::time::Duration,
    cancel: tokio_util::sync::CancellationToken,
) -> JoinHandle<()> {
    notifly_core::spawn_periodic("metrics-textfile", period, cancel, move || {
        let adapter = adapter.clone();
        let path = path.clone();
        async move {
            if let Err(e) = adapter.write_textfile(&path) {
                warn!(path = %path.display(), error = %e, "failed to write metrics textfile");
            }
        }
    })
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("notifly={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn panicked_task_is_logged() {
        let handle = tokio::spawn(async { panic!("textfile writer exploded") });
        join_logged("metrics-textfile", handle).await;
        assert!(logs_contain("background task ended abnormally"));
        assert!(logs_contain("metrics-textfile"));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn clean_exit_is_silent() {
        join_logged("metrics-textfile", tokio::spawn(async {})).await;
        assert!(!logs_contain("ended abnormally"));
    }
}
