// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notifly - client-side push notification pipeline.
//!
//! This is the binary entry point. `serve` runs the pipeline until
//! SIGTERM or Ctrl+C; the other commands inspect and repair its persisted
//! state and should be run while `serve` is stopped.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod alerts;
mod queue;
mod serve;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use notifly_config::NotiflyConfig;

/// Notifly - client-side push notification pipeline.
#[derive(Parser, Debug)]
#[command(name = "notifly", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the delivery queue, monitor and badge sync until stopped.
    Serve,
    /// Show queue depth, open alerts and the latest metric sample.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Move every dead-lettered notification back to the pending queue.
    RetryFailed,
    /// Drop every dead-lettered notification.
    PurgeFailed,
    /// Inspect or resolve monitoring alerts.
    Alerts {
        #[command(subcommand)]
        action: AlertsCommand,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Subcommand, Debug)]
enum AlertsCommand {
    /// List alerts, newest first.
    List {
        /// Include resolved alerts.
        #[arg(long)]
        all: bool,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Mark an alert resolved.
    Resolve {
        /// Alert id as shown by `alerts list`.
        id: String,
    },
}

fn load_config(path: Option<&std::path::Path>) -> NotiflyConfig {
    let loaded = match path {
        Some(path) => notifly_config::load_and_validate_path(path),
        None => notifly_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            notifly_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Status { json }) => status::run_status(&config, json).await,
        Some(Commands::RetryFailed) => queue::run_retry_failed(&config).await,
        Some(Commands::PurgeFailed) => queue::run_purge_failed(&config).await,
        Some(Commands::Alerts { action }) => match action {
            AlertsCommand::List { all, json } => alerts::run_list(&config, all, json).await,
            AlertsCommand::Resolve { id } => alerts::run_resolve(&config, &id).await,
        },
        Some(Commands::Config) => match toml::to_string_pretty(&config) {
            Ok(rendered) => {
                print!("{rendered}");
                Ok(())
            }
            Err(e) => Err(notifly_core::NotiflyError::Internal(format!(
                "failed to render configuration: {e}"
            ))),
        },
        None => {
            println!("notifly: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("notifly: {e}");
        std::process::exit(1);
    }
}
