// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Notifly notification pipeline.
//!
//! This crate provides the error type, the shared data model, the adapter
//! traits standing in for the external backend (row store, pub/sub, push
//! relay, OS badge, local key-value storage), an injectable clock, and the
//! periodic single-flight task runner used by every background loop.

pub mod clock;
pub mod error;
pub mod memory;
pub mod periodic;
pub mod query;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::NotiflyError;
pub use memory::MemoryKvStore;
pub use periodic::{SingleFlight, spawn_periodic};
pub use query::{Row, RowQuery};
pub use types::{
    AdapterType, HealthStatus, MetricKind, NewDelivery, NotificationCategory, NotificationSettings, Payload,
    PendingDelivery, Platform, Priority, PushToken, SettingsUpdate,
};

// Re-export all adapter traits at crate root.
pub use traits::{BadgeSetter, KvStore, PluginAdapter, PubSub, PushRelay, RowStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_construct_and_classify() {
        assert!(!NotiflyError::Config("missing backend url".into()).is_retryable());
        assert!(!NotiflyError::Validation("empty title".into()).is_retryable());
        assert!(
            NotiflyError::Delivery {
                message: "relay 503".into()
            }
            .is_retryable()
        );
        assert!(NotiflyError::backend("connection refused", true).is_retryable());
        assert!(!NotiflyError::backend("row violates policy", false).is_retryable());
        assert!(
            NotiflyError::Timeout {
                duration: std::time::Duration::from_secs(10)
            }
            .is_retryable()
        );
        let storage = NotiflyError::Storage {
            source: Box::new(std::io::Error::other("disk full")),
        };
        assert!(storage.to_string().contains("disk full"));
    }

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        let variants = [
            AdapterType::RowStore,
            AdapterType::PubSub,
            AdapterType::PushRelay,
            AdapterType::Badge,
            AdapterType::KeyValue,
            AdapterType::Metrics,
        ];
        for variant in &variants {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(*variant, parsed);
        }
    }

    #[test]
    fn all_adapter_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_row_store<T: RowStore>() {}
        fn _assert_pubsub<T: PubSub>() {}
        fn _assert_push_relay<T: PushRelay>() {}
        fn _assert_badge_setter<T: BadgeSetter>() {}
        fn _assert_kv_store<T: KvStore>() {}
        _assert_kv_store::<MemoryKvStore>();
    }
}
