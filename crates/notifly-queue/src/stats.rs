// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery outcome counters, drained by each metric sample.

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome counts since the last drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverySnapshot {
    /// Items handed to the sender that ended in success or failure.
    pub attempted: u64,
    pub delivered: u64,
    /// Failed attempts, retried or not.
    pub failed: u64,
    pub dead_lettered: u64,
    /// Sum of enqueue-to-delivery latency over `delivered`.
    pub total_latency_ms: u64,
    /// Individual messages handed to the push relay.
    pub messages_sent: u64,
    pub tokens_invalidated: u64,
}

impl DeliverySnapshot {
    /// Delivered over attempted; 1.0 when nothing was attempted.
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            1.0
        } else {
            self.delivered as f64 / self.attempted as f64
        }
    }

    /// Failed over attempted; 0.0 when nothing was attempted.
    #[allow(clippy::cast_precision_loss)]
    pub fn error_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.failed as f64 / self.attempted as f64
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn average_latency_ms(&self) -> f64 {
        if self.delivered == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.delivered as f64
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn token_invalidation_rate(&self) -> f64 {
        if self.messages_sent == 0 {
            0.0
        } else {
            self.tokens_invalidated as f64 / self.messages_sent as f64
        }
    }
}

#[derive(Debug, Default)]
pub struct DeliveryStats {
    counts: Mutex<DeliverySnapshot>,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, f: impl FnOnce(&mut DeliverySnapshot)) {
        f(&mut self.counts.lock().unwrap_or_else(|e| e.into_inner()));
    }

    pub fn record_delivered(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.update(|c| {
            c.attempted += 1;
            c.delivered += 1;
            c.total_latency_ms = c.total_latency_ms.saturating_add(ms);
        });
    }

    pub fn record_failure(&self, dead_lettered: bool) {
        self.update(|c| {
            c.attempted += 1;
            c.failed += 1;
            if dead_lettered {
                c.dead_lettered += 1;
            }
        });
    }

    pub fn record_push(&self, sent: u64, invalidated: u64) {
        self.update(|c| {
            c.messages_sent += sent;
            c.tokens_invalidated += invalidated;
        });
    }

    /// Current counts without resetting them.
    pub fn snapshot(&self) -> DeliverySnapshot {
        *self.counts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current counts, resetting them to zero.
    pub fn take_snapshot(&self) -> DeliverySnapshot {
        std::mem::take(&mut *self.counts.lock().unwrap_or_else(|e| e.into_inner()))
    }
}
