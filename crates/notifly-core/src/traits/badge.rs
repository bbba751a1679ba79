// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OS-level application badge adapter.

use async_trait::async_trait;

use crate::error::NotiflyError;
use crate::traits::adapter::PluginAdapter;

/// Sets the application icon badge. Platform support is best-effort.
#[async_trait]
pub trait BadgeSetter: PluginAdapter {
    async fn set_badge_count(&self, count: u32) -> Result<(), NotiflyError>;
}
