// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use notifly_core::{NotiflyError, Row};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub(crate) fn to_row<T: Serialize>(value: &T) -> Result<Row, NotiflyError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(other) => Err(NotiflyError::Internal(format!(
            "expected an object row, got {other}"
        ))),
        Err(e) => Err(NotiflyError::Internal(format!("failed to encode row: {e}"))),
    }
}

pub(crate) fn from_row<T: DeserializeOwned>(table: &str, row: Row) -> Result<T, NotiflyError> {
    serde_json::from_value(Value::Object(row))
        .map_err(|e| NotiflyError::backend(format!("malformed {table} row: {e}"), false))
}
