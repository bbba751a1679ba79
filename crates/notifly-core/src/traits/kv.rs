// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local persisted key-value storage adapter trait.
//!
//! Queue lists, alert history, and metric samples survive restarts by being
//! serialized as JSON under fixed keys.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::NotiflyError;
use crate::traits::adapter::PluginAdapter;

/// Adapter for device-local string key-value storage.
#[async_trait]
pub trait KvStore: PluginAdapter {
    async fn get(&self, key: &str) -> Result<Option<String>, NotiflyError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), NotiflyError>;

    async fn remove(&self, key: &str) -> Result<(), NotiflyError>;
}

/// Read and deserialize the JSON value stored under `key`.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, NotiflyError> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| NotiflyError::Storage {
                source: Box::new(e),
            }),
        None => Ok(None),
    }
}

/// Serialize `value` as JSON and store it under `key`.
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
) -> Result<(), NotiflyError> {
    let raw = serde_json::to_string(value).map_err(|e| NotiflyError::Storage {
        source: Box::new(e),
    })?;
    store.set(key, &raw).await
}
