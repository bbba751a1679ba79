// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery queue for the Notifly pipeline.
//!
//! [`QueueManager`] owns the pending and dead-letter lists, persists them to
//! local key-value storage, and drives a [`DeliverySender`] in batches with
//! retry and backoff. [`DeliveryStats`] accumulates outcomes for the
//! monitoring loop.

pub mod backoff;
pub mod queue;
pub mod stats;

pub use backoff::BackoffPolicy;
pub use queue::{
    BatchReport, DeferReason, DeliveryOutcome, DeliverySender, FAILED_KEY, PENDING_KEY, QueueManager,
    QueueStatus,
};
pub use stats::{DeliverySnapshot, DeliveryStats};
