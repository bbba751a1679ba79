// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Notifly notification pipeline.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// The primary error type used across all Notifly adapter traits and pipeline operations.
#[derive(Debug, Error)]
pub enum NotiflyError {
    /// Configuration errors (invalid TOML, missing credentials, bad section values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Input rejected before any side effect (empty title, malformed "HH:MM", ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// Local persistence errors (SQLite, serialization of persisted state).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Remote backend errors (row store, realtime channel).
    ///
    /// `transient` distinguishes "backend unreachable / 5xx" from requests the
    /// backend rejected outright.
    #[error("backend error: {message}")]
    Backend {
        message: String,
        transient: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Push delivery failed for every target of a notification.
    #[error("delivery failed: {message}")]
    Delivery { message: String },

    /// A rate-limited operation was denied for an explicit user action.
    #[error("rate limited: {operation} for `{subject}`, retry at {retry_at}")]
    RateLimited {
        operation: String,
        subject: String,
        retry_at: DateTime<Utc>,
    },

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl NotiflyError {
    /// Shorthand for a backend error without an underlying source.
    pub fn backend(message: impl Into<String>, transient: bool) -> Self {
        Self::Backend {
            message: message.into(),
            transient,
            source: None,
        }
    }

    /// Whether a queued delivery that failed with this error should be retried.
    ///
    /// Configuration and validation problems will fail the same way on every
    /// attempt, so they go straight to the dead-letter list.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Delivery { .. } | Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Backend { transient, .. } => *transient,
            Self::Storage { .. } | Self::Internal(_) => true,
            Self::Config(_) | Self::Validation(_) | Self::NotFound(_) => false,
        }
    }
}
