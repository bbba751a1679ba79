// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key-value table operations.

use notifly_core::NotiflyError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

pub async fn get(db: &Database, key: &str) -> Result<Option<String>, NotiflyError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or overwrite `key`.
pub async fn set(db: &Database, key: &str, value: &str) -> Result<(), NotiflyError> {
    let key = key.to_string();
    let value = value.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![key, value],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete `key`. Returns whether a row was removed.
pub async fn remove(db: &Database, key: &str) -> Result<bool, NotiflyError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            let removed = conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            Ok(removed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// All keys starting with `prefix`, sorted.
pub async fn keys_with_prefix(db: &Database, prefix: &str) -> Result<Vec<String>, NotiflyError> {
    let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT key FROM kv WHERE key LIKE ?1 ESCAPE '\\' ORDER BY key")?;
            let keys = stmt
                .query_map(params![pattern], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(keys)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_overwrites_and_remove_reports() {
        let db = Database::open_in_memory().await.unwrap();
        assert_eq!(get(&db, "queue.pending").await.unwrap(), None);

        set(&db, "queue.pending", "[]").await.unwrap();
        set(&db, "queue.pending", "[1]").await.unwrap();
        assert_eq!(get(&db, "queue.pending").await.unwrap().as_deref(), Some("[1]"));

        assert!(remove(&db, "queue.pending").await.unwrap());
        assert!(!remove(&db, "queue.pending").await.unwrap());
    }

    #[tokio::test]
    async fn prefix_listing_treats_underscore_literally() {
        let db = Database::open_in_memory().await.unwrap();
        for key in ["monitor.alerts", "monitor.samples", "monitorXalerts", "queue.failed"] {
            set(&db, key, "{}").await.unwrap();
        }
        assert_eq!(
            keys_with_prefix(&db, "monitor.").await.unwrap(),
            vec!["monitor.alerts".to_string(), "monitor.samples".to_string()]
        );
        set(&db, "a_b", "1").await.unwrap();
        set(&db, "axb", "1").await.unwrap();
        assert_eq!(keys_with_prefix(&db, "a_").await.unwrap(), vec!["a_b".to_string()]);
    }
}
