// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user notification preferences for Notifly.
//!
//! - [`quiet_hours`]: pure quiet-hours evaluation in a device time zone
//! - [`SettingsService`]: cached settings with rate-limited updates
//! - [`TokenStore`]: push tokens keyed by (user, device)

pub mod quiet_hours;
pub mod settings;
pub mod tokens;

mod rows;

pub use quiet_hours::{QuietWindow, is_in_quiet_hours, is_quiet_at, next_available_time, parse_hhmm};
pub use settings::{SETTINGS_TABLE, SettingsService};
pub use tokens::{TOKENS_TABLE, TokenStore};
