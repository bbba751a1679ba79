// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pending and dead-letter lists with batch processing.
//!
//! Both lists live in memory behind a short-held mutex and are written to
//! the key-value store after every change. Persistence is best-effort: a
//! failed write is logged and the in-memory state stays authoritative.
//!
//! Items taken for a batch stay in the persisted snapshot until the batch
//! finishes, so a crash mid-batch replays them instead of losing them.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notifly_config::QueueConfig;
use notifly_core::clock::add_duration;
use notifly_core::traits::kv::{load_json, save_json};
use notifly_core::{Clock, KvStore, NewDelivery, NotiflyError, PendingDelivery, SingleFlight, spawn_periodic};
use serde::Serialize;
use strum::Display;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::stats::DeliveryStats;

/// Key holding the pending list.
pub const PENDING_KEY: &str = "queue.pending";
/// Key holding the dead-letter list.
pub const FAILED_KEY: &str = "queue.failed";

/// Why a send was postponed without counting as an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DeferReason {
    QuietHours,
    RateLimited,
}

/// What happened to one item handed to a [`DeliverySender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// At least one target accepted the message.
    Delivered { targets: usize },
    /// The recipient has no active push tokens.
    NoTargets,
    /// The recipient turned this category off.
    Suppressed,
    /// Try again at `until`; the attempt is not counted.
    Deferred {
        until: DateTime<Utc>,
        reason: DeferReason,
    },
}

/// The send operation the queue drives.
///
/// An `Err` counts as a failed attempt. Retryable errors are rescheduled
/// with backoff; others go straight to the dead-letter list.
#[async_trait]
pub trait DeliverySender: Send + Sync {
    async fn send(&self, item: &PendingDelivery) -> Result<DeliveryOutcome, NotiflyError>;
}

/// Tally of one [`QueueManager::process_batch`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub delivered: usize,
    pub retried: usize,
    pub deferred: usize,
    pub dead_lettered: usize,
    pub discarded: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub pending: usize,
    /// Pending items whose scheduled time has passed.
    pub ready: usize,
    pub failed: usize,
    pub processing: bool,
}

#[derive(Debug, Default)]
struct Lists {
    pending: Vec<PendingDelivery>,
    failed: Vec<PendingDelivery>,
}

pub struct QueueManager {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    stats: Arc<DeliveryStats>,
    backoff: BackoffPolicy,
    batch_size: usize,
    default_max_attempts: u32,
    interval: std::time::Duration,
    lists: Mutex<Lists>,
    /// Items taken by the running batch; still part of the persisted pending list.
    in_flight: Mutex<Vec<PendingDelivery>>,
    flight: SingleFlight,
    persist_lock: tokio::sync::Mutex<()>,
}

impl QueueManager {
    pub fn new(
        kv: Arc<dyn KvStore>,
        config: &QueueConfig,
        clock: Arc<dyn Clock>,
        stats: Arc<DeliveryStats>,
    ) -> Self {
        Self {
            kv,
            clock,
            stats,
            backoff: BackoffPolicy::from_config(&config.backoff),
            batch_size: config.batch_size,
            default_max_attempts: config.max_attempts,
            interval: config.process_interval(),
            lists: Mutex::new(Lists::default()),
            in_flight: Mutex::new(Vec::new()),
            flight: SingleFlight::new(),
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn lists(&self) -> std::sync::MutexGuard<'_, Lists> {
        self.lists.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn in_flight(&self) -> std::sync::MutexGuard<'_, Vec<PendingDelivery>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Restore both lists from storage, replacing what is in memory.
    ///
    /// Returns (pending, failed) counts.
    pub async fn load(&self) -> Result<(usize, usize), NotiflyError> {
        let pending: Vec<PendingDelivery> = load_json(self.kv.as_ref(), PENDING_KEY)
            .await?
            .unwrap_or_default();
        let failed: Vec<PendingDelivery> = load_json(self.kv.as_ref(), FAILED_KEY)
            .await?
            .unwrap_or_default();
        let counts = (pending.len(), failed.len());
        *self.lists() = Lists { pending, failed };
        info!(pending = counts.0, failed = counts.1, "delivery queue restored");
        Ok(counts)
    }

    async fn persist(&self) {
        let _write = self.persist_lock.lock().await;
        let (pending, failed) = {
            let lists = self.lists();
            let mut pending = self.in_flight().clone();
            pending.extend(lists.pending.iter().cloned());
            (pending, lists.failed.clone())
        };
        if let Err(e) = save_json(self.kv.as_ref(), PENDING_KEY, &pending).await {
            warn!(error = %e, "failed to persist pending deliveries");
        }
        if let Err(e) = save_json(self.kv.as_ref(), FAILED_KEY, &failed).await {
            warn!(error = %e, "failed to persist dead-letter list");
        }
    }

    /// Validate `delivery`, assign its identity, and append it to the pending list.
    pub async fn enqueue(&self, delivery: NewDelivery) -> Result<PendingDelivery, NotiflyError> {
        if delivery.user_id.trim().is_empty() {
            return Err(NotiflyError::Validation("delivery has no recipient".into()));
        }
        if delivery.title.trim().is_empty() {
            return Err(NotiflyError::Validation("delivery title is empty".into()));
        }
        let max_attempts = delivery.max_attempts.unwrap_or(self.default_max_attempts);
        if max_attempts == 0 {
            return Err(NotiflyError::Validation(
                "max_attempts must be at least 1".into(),
            ));
        }

        let item = PendingDelivery {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: delivery.user_id,
            category: delivery.category,
            title: delivery.title,
            body: delivery.body,
            payload: delivery.payload,
            priority: delivery.priority,
            scheduled_for: delivery.scheduled_for,
            attempts: 0,
            max_attempts,
            created_at: self.clock.now(),
            last_attempt_at: None,
            last_error: None,
        };
        self.lists().pending.push(item.clone());
        self.persist().await;
        debug!(
            id = %item.id,
            user_id = %item.user_id,
            category = %item.category,
            scheduled_for = ?item.scheduled_for,
            "delivery enqueued"
        );
        Ok(item)
    }

    /// Remove and return the oldest ready item.
    pub async fn dequeue(&self) -> Option<PendingDelivery> {
        let now = self.clock.now();
        let item = take_ready(&mut self.lists(), 1, now).pop()?;
        self.persist().await;
        Some(item)
    }

    /// Send up to `n` ready items through `sender`.
    ///
    /// Returns `None` without doing anything if another batch is running.
    pub async fn process_batch(&self, n: usize, sender: &dyn DeliverySender) -> Option<BatchReport> {
        let Some(_flight) = self.flight.try_begin() else {
            debug!("batch already in progress, skipping");
            return None;
        };

        let batch = {
            let mut lists = self.lists();
            let batch = take_ready(&mut lists, n, self.clock.now());
            *self.in_flight() = batch.clone();
            batch
        };
        let mut report = BatchReport {
            processed: batch.len(),
            ..BatchReport::default()
        };

        for mut item in batch {
            let result = sender.send(&item).await;
            let now = self.clock.now();
            self.in_flight().retain(|i| i.id != item.id);

            match result {
                Ok(DeliveryOutcome::Delivered { targets }) => {
                    let latency = (now - item.ready_since()).to_std().unwrap_or_default();
                    self.stats.record_delivered(latency);
                    report.delivered += 1;
                    debug!(id = %item.id, targets, latency_ms = latency.as_millis() as u64, "delivered");
                }
                Ok(DeliveryOutcome::NoTargets) => {
                    report.discarded += 1;
                    debug!(id = %item.id, user_id = %item.user_id, "no active push tokens, discarding");
                }
                Ok(DeliveryOutcome::Suppressed) => {
                    report.discarded += 1;
                    debug!(id = %item.id, category = %item.category, "category disabled, discarding");
                }
                Ok(DeliveryOutcome::Deferred { until, reason }) => {
                    item.scheduled_for = Some(until);
                    report.deferred += 1;
                    debug!(id = %item.id, %reason, %until, "delivery deferred");
                    self.lists().pending.push(item);
                }
                Err(e) => {
                    item.attempts += 1;
                    item.last_attempt_at = Some(now);
                    item.last_error = Some(e.to_string());
                    if e.is_retryable() && !item.is_exhausted() {
                        let delay = self.backoff.delay(item.attempts);
                        item.scheduled_for = Some(add_duration(now, delay));
                        self.stats.record_failure(false);
                        report.retried += 1;
                        debug!(
                            id = %item.id,
                            attempts = item.attempts,
                            retry_in_ms = delay.as_millis() as u64,
                            error = %e,
                            "delivery failed, retrying"
                        );
                        self.lists().pending.push(item);
                    } else {
                        self.stats.record_failure(true);
                        report.dead_lettered += 1;
                        warn!(
                            id = %item.id,
                            attempts = item.attempts,
                            retryable = e.is_retryable(),
                            error = %e,
                            "delivery moved to dead-letter list"
                        );
                        self.lists().failed.push(item);
                    }
                }
            }
        }

        self.in_flight().clear();
        if report.processed > 0 {
            self.persist().await;
        }
        Some(report)
    }

    /// One batch of the configured size.
    pub async fn process_pending(&self, sender: &dyn DeliverySender) -> Option<BatchReport> {
        self.process_batch(self.batch_size, sender).await
    }

    /// Move every dead-lettered item back to pending with a fresh attempt budget.
    pub async fn retry_failed_notifications(&self) -> usize {
        let moved = {
            let mut lists = self.lists();
            let mut failed = std::mem::take(&mut lists.failed);
            for item in &mut failed {
                item.attempts = 0;
                item.scheduled_for = None;
            }
            let moved = failed.len();
            lists.pending.extend(failed);
            moved
        };
        if moved > 0 {
            self.persist().await;
            info!(count = moved, "dead-lettered deliveries requeued");
        }
        moved
    }

    /// Drop every dead-lettered item.
    pub async fn purge_failed(&self) -> usize {
        let purged = std::mem::take(&mut self.lists().failed).len();
        if purged > 0 {
            self.persist().await;
            info!(count = purged, "dead-letter list purged");
        }
        purged
    }

    pub fn status(&self) -> QueueStatus {
        let now = self.clock.now();
        let lists = self.lists();
        let in_flight = self.in_flight().len();
        QueueStatus {
            pending: lists.pending.len() + in_flight,
            ready: lists.pending.iter().filter(|i| i.is_ready(now)).count(),
            failed: lists.failed.len(),
            processing: self.flight.is_busy(),
        }
    }

    /// Pending items, oldest first.
    pub fn pending(&self) -> Vec<PendingDelivery> {
        let mut items = self.lists().pending.clone();
        items.sort_by_key(|i| i.created_at);
        items
    }

    pub fn failed(&self) -> Vec<PendingDelivery> {
        self.lists().failed.clone()
    }

    /// Run [`process_pending`](Self::process_pending) on the configured
    /// interval until `cancel` fires.
    pub fn spawn(self: Arc<Self>, sender: Arc<dyn DeliverySender>, cancel: CancellationToken) -> JoinHandle<()> {
        let interval = self.interval;
        spawn_periodic("delivery-queue", interval, cancel, move || {
            let queue = self.clone();
            let sender = sender.clone();
            async move {
                if let Some(report) = queue.process_pending(sender.as_ref()).await
                    && report.processed > 0
                {
                    info!(
                        processed = report.processed,
                        delivered = report.delivered,
                        retried = report.retried,
                        deferred = report.deferred,
                        dead_lettered = report.dead_lettered,
                        discarded = report.discarded,
                        "delivery batch finished"
                    );
                }
            }
        })
    }
}

/// Remove up to `n` ready items, oldest first.
fn take_ready(lists: &mut Lists, n: usize, now: DateTime<Utc>) -> Vec<PendingDelivery> {
    let mut ready: Vec<usize> = lists
        .pending
        .iter()
        .enumerate()
        .filter(|(_, item)| item.is_ready(now))
        .map(|(i, _)| i)
        .collect();
    // Stable sort keeps insertion order among equal timestamps.
    ready.sort_by_key(|&i| lists.pending[i].created_at);
    ready.truncate(n);
    ready.sort_unstable_by(|a, b| b.cmp(a));
    let mut taken: Vec<PendingDelivery> = ready.into_iter().map(|i| lists.pending.remove(i)).collect();
    taken.sort_by_key(|item| item.created_at);
    taken
}
