// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the KvStore trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use notifly_config::model::StorageConfig;
use notifly_core::{AdapterType, HealthStatus, KvStore, NotiflyError, PluginAdapter};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed key-value store.
///
/// The database is opened by [`SqliteKvStore::initialize`]; every other call
/// fails until then.
pub struct SqliteKvStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteKvStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Create and initialize in one step.
    pub async fn open(config: StorageConfig) -> Result<Self, NotiflyError> {
        let store = Self::new(config);
        store.initialize().await?;
        Ok(store)
    }

    fn db(&self) -> Result<&Database, NotiflyError> {
        self.db.get().ok_or_else(|| NotiflyError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    pub async fn initialize(&self) -> Result<(), NotiflyError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| NotiflyError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite key-value store initialized");
        Ok(())
    }

    /// Checkpoint the WAL. The connection itself closes on drop.
    pub async fn checkpoint(&self) -> Result<(), NotiflyError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, NotiflyError> {
        queries::kv::keys_with_prefix(self.db()?, prefix).await
    }
}

#[async_trait]
impl PluginAdapter for SqliteKvStore {
    fn name(&self) -> &str {
        "sqlite-kv"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::KeyValue
    }

    async fn health_check(&self) -> Result<HealthStatus, NotiflyError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, NotiflyError> {
        queries::kv::get(self.db()?, key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), NotiflyError> {
        queries::kv::set(self.db()?, key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), NotiflyError> {
        queries::kv::remove(self.db()?, key).await.map(|_| ())
    }
}
