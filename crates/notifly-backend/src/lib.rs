// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapters for the pipeline's external collaborators.
//!
//! - [`RestRowStore`]: the backend's tables over PostgREST
//! - [`ExpoPushRelay`]: the Expo push API
//! - [`MemoryRowStore`], [`LocalPubSub`], [`LogBadgeSetter`]: in-process
//!   stand-ins for offline runs and tests

pub mod badge;
pub mod channel;
pub mod expo;
pub mod memory;
pub mod rest;

pub use badge::LogBadgeSetter;
pub use channel::LocalPubSub;
pub use expo::ExpoPushRelay;
pub use memory::MemoryRowStore;
pub use rest::RestRowStore;
