// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push dispatch and pipeline wiring.
//!
//! [`PushDispatcher`] is the queue's send operation: it applies the
//! recipient's preferences and fans a delivery out to their devices.
//! [`NotificationPipeline`] builds every component once from configuration
//! and runs the background loops until cancelled.

pub mod dispatcher;
pub mod pipeline;
pub mod shutdown;

pub use dispatcher::PushDispatcher;
pub use pipeline::{
    DEVICE_ID_KEY, NotificationPipeline, PipelineAdapters, PipelineStatus, RunningPipeline,
};
pub use shutdown::install_signal_handler;
