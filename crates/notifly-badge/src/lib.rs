// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Unread badge count for the Notifly pipeline.
//!
//! The authoritative count is the number of unread notification rows.
//! Local changes are applied optimistically and overwritten by the next
//! authoritative read. Every device of a user shares its count over the
//! `<prefix>:<user_id>` broadcast channel.

pub mod manager;

pub use manager::{BADGE_EVENT, BadgeManager, BadgeSyncMessage, NOTIFICATIONS_TABLE};
