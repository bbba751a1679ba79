// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row store over the backend's PostgREST interface.
//!
//! Filters are rendered as `column=op.value` query parameters, ordering as
//! `order=col.asc,col.desc`, and ranges as `offset`/`limit`. Counts use a
//! `HEAD` request with `Prefer: count=exact` and read the total from the
//! `Content-Range` response header.

use std::time::Duration;

use async_trait::async_trait;
use notifly_config::model::BackendConfig;
use notifly_core::query::FilterOp;
use notifly_core::{AdapterType, HealthStatus, NotiflyError, PluginAdapter, Row, RowQuery, RowStore};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const RETURN_REPRESENTATION: &str = "return=representation";

/// PostgREST error body.
#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Clone)]
pub struct RestRowStore {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl RestRowStore {
    /// Build a client for `{url}/rest/v1`. Requires `backend.url` and `backend.api_key`.
    pub fn new(config: &BackendConfig) -> Result<Self, NotiflyError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| NotiflyError::Config("backend.url is not set".into()))?;
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| NotiflyError::Config("backend.api_key is not set".into()))?;
        let bearer = config.access_token.as_deref().unwrap_or(api_key);

        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(api_key, "backend.api_key")?);
        headers.insert(
            "authorization",
            header_value(&format!("Bearer {bearer}"), "backend.access_token")?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| NotiflyError::Backend {
                message: format!("failed to build HTTP client: {e}"),
                transient: false,
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: format!("{}/rest/v1", url.trim_end_matches('/')),
            timeout,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, NotiflyError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                NotiflyError::Timeout {
                    duration: self.timeout,
                }
            } else {
                NotiflyError::Backend {
                    message: format!("backend request failed: {e}"),
                    transient: true,
                    source: Some(Box::new(e)),
                }
            }
        })?;

        let status = response.status();
        debug!(status = %status, url = %response.url().path(), "backend response");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiError>(&body)
            .map(|e| e.message)
            .unwrap_or(body);
        Err(NotiflyError::backend(
            format!("backend returned {status}: {message}"),
            is_transient(status),
        ))
    }

    async fn rows(&self, request: RequestBuilder) -> Result<Vec<Row>, NotiflyError> {
        self.send(request)
            .await?
            .json::<Vec<Row>>()
            .await
            .map_err(|e| NotiflyError::Backend {
                message: format!("unreadable backend response: {e}"),
                transient: false,
                source: Some(Box::new(e)),
            })
    }
}

fn header_value(value: &str, key: &str) -> Result<HeaderValue, NotiflyError> {
    HeaderValue::from_str(value)
        .map_err(|e| NotiflyError::Config(format!("invalid header value for {key}: {e}")))
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || matches!(status.as_u16(), 408 | 429)
}

/// Render a scalar the way PostgREST expects it inside a filter.
fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn render_filter_value(op: FilterOp, value: &Value) -> String {
    match (op, value) {
        (FilterOp::In, Value::Array(items)) => {
            let items: Vec<String> = items
                .iter()
                .map(|v| match v {
                    Value::String(s) => format!("\"{}\"", s.replace('"', "\\\"")),
                    other => render_scalar(other),
                })
                .collect();
            format!("in.({})", items.join(","))
        }
        _ => format!("{op}.{}", render_scalar(value)),
    }
}

/// Query-string pairs for filters and ordering, plus `offset`/`limit` when
/// `with_range` is set.
pub fn query_params(query: &RowQuery, with_range: bool) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = query
        .filters
        .iter()
        .map(|f| (f.column.clone(), render_filter_value(f.op, &f.value)))
        .collect();

    if !query.order.is_empty() {
        let order: Vec<String> = query
            .order
            .iter()
            .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
            .collect();
        params.push(("order".into(), order.join(",")));
    }

    if with_range && let Some((from, to)) = query.range {
        let limit = if from > to { 0 } else { to - from + 1 };
        params.push(("offset".into(), from.to_string()));
        params.push(("limit".into(), limit.to_string()));
    }
    params
}

/// Total from a `Content-Range` header such as `0-24/312` or `*/312`.
fn parse_content_range_total(header: &str) -> Option<u64> {
    header.rsplit('/').next()?.trim().parse().ok()
}

#[async_trait]
impl PluginAdapter for RestRowStore {
    fn name(&self) -> &str {
        "postgrest"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::RowStore
    }

    async fn health_check(&self) -> Result<HealthStatus, NotiflyError> {
        match self.send(self.client.head(format!("{}/", self.base_url))).await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(NotiflyError::Backend { message, transient: false, .. }) => {
                Ok(HealthStatus::Degraded(message))
            }
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }
}

#[async_trait]
impl RowStore for RestRowStore {
    async fn select(&self, query: &RowQuery) -> Result<Vec<Row>, NotiflyError> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(query_params(query, true));
        self.rows(self.client.get(self.table_url(&query.table)).query(&params))
            .await
    }

    async fn count(&self, query: &RowQuery) -> Result<u64, NotiflyError> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(query_params(query, false));
        let response = self
            .send(
                self.client
                    .head(self.table_url(&query.table))
                    .query(&params)
                    .header("prefer", "count=exact"),
            )
            .await?;
        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| NotiflyError::backend("count response without Content-Range total", false))
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, NotiflyError> {
        let rows = self
            .rows(
                self.client
                    .post(self.table_url(table))
                    .header("prefer", RETURN_REPRESENTATION)
                    .json(&row),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| NotiflyError::backend(format!("insert into {table} returned no row"), false))
    }

    async fn upsert(
        &self,
        table: &str,
        row: Row,
        on_conflict: &[&str],
    ) -> Result<Row, NotiflyError> {
        let rows = self
            .rows(
                self.client
                    .post(self.table_url(table))
                    .query(&[("on_conflict", on_conflict.join(","))])
                    .header("prefer", format!("resolution=merge-duplicates,{RETURN_REPRESENTATION}"))
                    .json(&row),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| NotiflyError::backend(format!("upsert into {table} returned no row"), false))
    }

    async fn update(&self, query: &RowQuery, patch: Row) -> Result<u64, NotiflyError> {
        let rows = self
            .rows(
                self.client
                    .patch(self.table_url(&query.table))
                    .query(&query_params(query, false))
                    .header("prefer", RETURN_REPRESENTATION)
                    .json(&patch),
            )
            .await?;
        Ok(rows.len() as u64)
    }

    async fn delete(&self, query: &RowQuery) -> Result<u64, NotiflyError> {
        let rows = self
            .rows(
                self.client
                    .delete(self.table_url(&query.table))
                    .query(&query_params(query, false))
                    .header("prefer", RETURN_REPRESENTATION),
            )
            .await?;
        Ok(rows.len() as u64)
    }
}
