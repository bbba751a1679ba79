// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry delay schedule.

use std::time::Duration;

use notifly_config::{BackoffConfig, BackoffStrategy};

/// Delay before the next attempt, as a function of attempts made so far.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffPolicy {
    /// Step through a fixed table, then hold at the ceiling.
    Table { steps: Vec<Duration>, ceiling: Duration },
    /// `base * multiplier^(attempts - 1)`, capped at the ceiling.
    Exponential {
        base: Duration,
        multiplier: f64,
        ceiling: Duration,
    },
}

impl BackoffPolicy {
    pub fn from_config(config: &BackoffConfig) -> Self {
        let ceiling = Duration::from_millis(config.ceiling_ms);
        match config.strategy {
            BackoffStrategy::Table => Self::Table {
                steps: config.steps_ms.iter().copied().map(Duration::from_millis).collect(),
                ceiling,
            },
            BackoffStrategy::Exponential => Self::Exponential {
                base: Duration::from_millis(config.base_ms),
                multiplier: config.multiplier,
                ceiling,
            },
        }
    }

    /// Delay after the `attempts`-th failed attempt (1-based; 0 is treated as 1).
    pub fn delay(&self, attempts: u32) -> Duration {
        let index = attempts.max(1) - 1;
        match self {
            Self::Table { steps, ceiling } => steps
                .get(index as usize)
                .copied()
                .unwrap_or(*ceiling)
                .min(*ceiling),
            Self::Exponential {
                base,
                multiplier,
                ceiling,
            } => {
                let exponent = i32::try_from(index).unwrap_or(i32::MAX);
                let secs = base.as_secs_f64() * multiplier.powi(exponent);
                if secs.is_finite() && secs < ceiling.as_secs_f64() {
                    Duration::from_secs_f64(secs)
                } else {
                    *ceiling
                }
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}
