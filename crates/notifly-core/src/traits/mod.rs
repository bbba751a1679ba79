// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the external collaborators of the pipeline.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod badge;
pub mod kv;
pub mod pubsub;
pub mod push;
pub mod row_store;

// Re-export all traits at the traits module level for convenience.
pub use adapter::PluginAdapter;
pub use badge::BadgeSetter;
pub use kv::KvStore;
pub use pubsub::PubSub;
pub use push::PushRelay;
pub use row_store::RowStore;
