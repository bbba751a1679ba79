// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-window request counters per (operation, subject).
//!
//! A window opens on the first request after the previous one ended and
//! lasts the configured duration. Every request inside it, allowed or not,
//! increments the count; a request is allowed while the count is within
//! `max_requests`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use notifly_config::{RateLimitConfig, WindowConfig};
use notifly_core::clock::add_duration;
use notifly_core::{Clock, NotiflyError};
use strum::{Display, EnumString};
use tracing::debug;

/// Tracked windows above which expired ones are swept before a new subject
/// is added.
const SWEEP_THRESHOLD: usize = 1024;

/// Operations with their own request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RateLimitedOperation {
    SettingsUpdate,
    TokenRefresh,
    PushSend,
}

/// The live window of one (operation, subject) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub request_count: u32,
    pub window_reset_at: DateTime<Utc>,
}

/// Outcome of [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Over budget until `retry_at`, when the window resets.
    Denied { retry_at: DateTime<Utc> },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

pub struct RateLimiter {
    limits: RateLimitConfig,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<(RateLimitedOperation, String), RateWindow>>,
}

impl RateLimiter {
    pub fn new(limits: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            limits,
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn limit(&self, operation: RateLimitedOperation) -> &WindowConfig {
        match operation {
            RateLimitedOperation::SettingsUpdate => &self.limits.settings_update,
            RateLimitedOperation::TokenRefresh => &self.limits.token_refresh,
            RateLimitedOperation::PushSend => &self.limits.push_send,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(RateLimitedOperation, String), RateWindow>> {
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count one request and decide whether it may proceed.
    pub fn check(&self, operation: RateLimitedOperation, subject: &str) -> RateDecision {
        let limit = *self.limit(operation);
        let now = self.clock.now();
        let mut windows = self.lock();

        let key = (operation, subject.to_string());
        if windows.len() >= SWEEP_THRESHOLD && !windows.contains_key(&key) {
            let before = windows.len();
            windows.retain(|_, w| now < w.window_reset_at);
            debug!(swept = before - windows.len(), "expired rate windows dropped");
        }

        let window = windows
            .entry(key)
            .and_modify(|w| {
                if now >= w.window_reset_at {
                    *w = RateWindow {
                        request_count: 1,
                        window_reset_at: add_duration(now, limit.window()),
                    };
                } else {
                    w.request_count = w.request_count.saturating_add(1);
                }
            })
            .or_insert_with(|| RateWindow {
                request_count: 1,
                window_reset_at: add_duration(now, limit.window()),
            });

        if window.request_count <= limit.max_requests {
            RateDecision::Allowed
        } else {
            debug!(%operation, subject, count = window.request_count, "rate limit exceeded");
            RateDecision::Denied {
                retry_at: window.window_reset_at,
            }
        }
    }

    /// [`check`](Self::check) for explicit user actions, where a denial is an error.
    pub fn enforce(&self, operation: RateLimitedOperation, subject: &str) -> Result<(), NotiflyError> {
        match self.check(operation, subject) {
            RateDecision::Allowed => Ok(()),
            RateDecision::Denied { retry_at } => Err(NotiflyError::RateLimited {
                operation: operation.to_string(),
                subject: subject.to_string(),
                retry_at,
            }),
        }
    }

    /// Requests still allowed in the current window, without counting one.
    pub fn remaining(&self, operation: RateLimitedOperation, subject: &str) -> u32 {
        let limit = self.limit(operation).max_requests;
        let now = self.clock.now();
        match self.lock().get(&(operation, subject.to_string())) {
            Some(w) if now < w.window_reset_at => limit.saturating_sub(w.request_count),
            _ => limit,
        }
    }

    /// Forget the window for (operation, subject).
    pub fn reset(&self, operation: RateLimitedOperation, subject: &str) {
        self.lock().remove(&(operation, subject.to_string()));
    }

    /// Number of (operation, subject) windows held, expired ones included.
    pub fn tracked(&self) -> usize {
        self.lock().len()
    }

    /// Current window, if one is open.
    pub fn window(&self, operation: RateLimitedOperation, subject: &str) -> Option<RateWindow> {
        let now = self.clock.now();
        self.lock()
            .get(&(operation, subject.to_string()))
            .filter(|w| now < w.window_reset_at)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use notifly_core::ManualClock;
    use proptest::prelude::*;
    use std::time::Duration;

    fn limiter(max_requests: u32, window_secs: u64, clock: Arc<ManualClock>) -> RateLimiter {
        let window = WindowConfig {
            max_requests,
            window_secs,
        };
        RateLimiter::new(
            RateLimitConfig {
                settings_update: window,
                token_refresh: window,
                push_send: window,
            },
            clock,
        )
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()))
    }

    #[test]
    fn denial_reports_window_reset() {
        let clock = clock();
        let start = clock.now();
        let rl = limiter(2, 60, clock.clone());
        assert!(rl.check(RateLimitedOperation::PushSend, "u1").is_allowed());
        clock.advance(Duration::from_secs(10));
        assert!(rl.check(RateLimitedOperation::PushSend, "u1").is_allowed());
        assert_eq!(
            rl.check(RateLimitedOperation::PushSend, "u1"),
            RateDecision::Denied {
                retry_at: start + chrono::TimeDelta::seconds(60)
            }
        );
    }

    #[test]
    fn subjects_and_operations_are_independent() {
        let rl = limiter(1, 60, clock());
        assert!(rl.check(RateLimitedOperation::PushSend, "u1").is_allowed());
        assert!(rl.check(RateLimitedOperation::PushSend, "u2").is_allowed());
        assert!(rl.check(RateLimitedOperation::TokenRefresh, "u1").is_allowed());
        assert!(!rl.check(RateLimitedOperation::PushSend, "u1").is_allowed());
    }

    #[test]
    fn remaining_and_reset() {
        let rl = limiter(3, 60, clock());
        assert_eq!(rl.remaining(RateLimitedOperation::SettingsUpdate, "u1"), 3);
        rl.check(RateLimitedOperation::SettingsUpdate, "u1");
        assert_eq!(rl.remaining(RateLimitedOperation::SettingsUpdate, "u1"), 2);
        // `remaining` does not consume.
        assert_eq!(rl.remaining(RateLimitedOperation::SettingsUpdate, "u1"), 2);
        rl.reset(RateLimitedOperation::SettingsUpdate, "u1");
        assert_eq!(rl.remaining(RateLimitedOperation::SettingsUpdate, "u1"), 3);
        assert!(rl.window(RateLimitedOperation::SettingsUpdate, "u1").is_none());
    }

    #[test]
    fn enforce_raises_rate_limited() {
        let rl = limiter(1, 60, clock());
        rl.enforce(RateLimitedOperation::SettingsUpdate, "u1").unwrap();
        let err = rl.enforce(RateLimitedOperation::SettingsUpdate, "u1").unwrap_err();
        assert!(matches!(err, NotiflyError::RateLimited { ref operation, .. } if operation == "settings_update"));
    }

    #[test]
    fn window_does_not_reset_retroactively() {
        let clock = clock();
        let rl = limiter(1, 60, clock.clone());
        assert!(rl.check(RateLimitedOperation::PushSend, "u1").is_allowed());
        clock.advance(Duration::from_secs(59));
        assert!(!rl.check(RateLimitedOperation::PushSend, "u1").is_allowed());
        // Denied requests do not push the reset time out.
        let window = rl.window(RateLimitedOperation::PushSend, "u1").unwrap();
        clock.advance(Duration::from_secs(1));
        assert!(clock.now() >= window.window_reset_at);
        assert!(rl.check(RateLimitedOperation::PushSend, "u1").is_allowed());
    }

    #[test]
    fn expired_windows_are_swept_when_the_map_is_large() {
        let clock = clock();
        let rl = limiter(5, 60, clock.clone());
        for i in 0..SWEEP_THRESHOLD {
            rl.check(RateLimitedOperation::PushSend, &format!("user-{i}"));
        }
        assert_eq!(rl.tracked(), SWEEP_THRESHOLD);

        // Still-open windows survive the sweep.
        clock.advance(Duration::from_secs(30));
        rl.check(RateLimitedOperation::TokenRefresh, "fresh");
        assert_eq!(rl.tracked(), SWEEP_THRESHOLD + 1);

        clock.advance(Duration::from_secs(31));
        rl.check(RateLimitedOperation::PushSend, "newcomer");
        assert_eq!(rl.tracked(), 2);
        assert_eq!(rl.remaining(RateLimitedOperation::TokenRefresh, "fresh"), 4);
    }

    proptest! {
        #[test]
        fn exactly_max_requests_pass_per_window(max in 1u32..30, window_secs in 1u64..600) {
            let clock = clock();
            let rl = limiter(max, window_secs, clock.clone());
            for _ in 0..max {
                prop_assert!(rl.check(RateLimitedOperation::TokenRefresh, "s").is_allowed());
            }
            prop_assert!(!rl.check(RateLimitedOperation::TokenRefresh, "s").is_allowed());

            clock.advance(Duration::from_secs(window_secs));
            prop_assert!(rl.check(RateLimitedOperation::TokenRefresh, "s").is_allowed());
        }
    }
}
