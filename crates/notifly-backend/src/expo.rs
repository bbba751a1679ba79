// SPDX-FileCopyrightText: 2026 Notifly Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push relay client for the Expo push API.
//!
//! One message per request. The response carries a single push ticket whose
//! `status` is `ok` or `error`; an error with `details.error` of
//! `DeviceNotRegistered` means the token should be dropped.

use std::time::Duration;

use async_trait::async_trait;
use notifly_config::PushConfig;
use notifly_core::traits::push::{PushMessage, PushReceipt};
use notifly_core::{AdapterType, HealthStatus, NotiflyError, PluginAdapter, PushRelay};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ExpoResponse {
    #[serde(default)]
    data: Option<TicketData>,
    #[serde(default)]
    errors: Vec<ExpoError>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TicketData {
    One(PushTicket),
    Many(Vec<PushTicket>),
}

#[derive(Debug, Deserialize)]
struct PushTicket {
    status: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<TicketDetails>,
}

#[derive(Debug, Deserialize)]
struct TicketDetails {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExpoError {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

impl PushTicket {
    fn into_receipt(self) -> PushReceipt {
        if self.status == "ok" {
            return PushReceipt::Ok { id: self.id };
        }
        let code = self.details.and_then(|d| d.error);
        if code.as_deref() == Some("DeviceNotRegistered") {
            return PushReceipt::DeviceNotRegistered;
        }
        PushReceipt::Error {
            message: match (code, self.message) {
                (Some(code), Some(message)) => format!("{code}: {message}"),
                (Some(code), None) => code,
                (None, Some(message)) => message,
                (None, None) => format!("push ticket status `{}`", self.status),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExpoPushRelay {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl ExpoPushRelay {
    pub fn new(config: &PushConfig) -> Result<Self, NotiflyError> {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("application/json"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        if let Some(token) = &config.access_token {
            headers.insert(
                "authorization",
                HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                    NotiflyError::Config(format!("invalid header value for push.access_token: {e}"))
                })?,
            );
        }

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
            endpoint: config.endpoint.clone(),
            timeout,
        })
    }
}

#[async_trait]
impl PluginAdapter for ExpoPushRelay {
    fn name(&self) -> &str {
        "expo-push"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::PushRelay
    }

    async fn health_check(&self) -> Result<HealthStatus, NotiflyError> {
        // The relay has no side-effect-free endpoint; report configuration only.
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl PushRelay for ExpoPushRelay {
    async fn send(&self, message: &PushMessage) -> Result<PushReceipt, NotiflyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(message)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotiflyError::Timeout {
                        duration: self.timeout,
                    }
                } else {
                    NotiflyError::Delivery {
                        message: format!("push relay unreachable: {e}"),
                    }
                }
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(status = %status, "push relay response");

        let parsed: Option<ExpoResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let detail = parsed
                .as_ref()
                .and_then(|r| r.errors.first())
                .map(|e| match &e.code {
                    Some(code) => format!("{code}: {}", e.message),
                    None => e.message.clone(),
                })
                .unwrap_or(body);
            return if status.is_server_error() || status.as_u16() == 429 {
                Err(NotiflyError::Delivery {
                    message: format!("push relay returned {status}: {detail}"),
                })
            } else {
                Err(NotiflyError::backend(
                    format!("push relay rejected request ({status}): {detail}"),
                    false,
                ))
            };
        }

        let ticket = match parsed.and_then(|r| r.data) {
            Some(TicketData::One(ticket)) => Some(ticket),
            Some(TicketData::Many(tickets)) => tickets.into_iter().next(),
            None => None,
        };
        match ticket {
            Some(ticket) => Ok(ticket.into_receipt()),
            None => {
                warn!("push relay response without a ticket");
                Err(NotiflyError::Delivery {
                    message: "push relay response without a ticket".into(),
                })
            }
        }
    }
}
