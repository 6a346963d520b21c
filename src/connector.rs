//! Client for the managed connector sync API.
//!
//! Only two calls are used: triggering a sync and reading a connector's
//! current sync state. Whatever the service reports is collapsed into a
//! two-valued [`SyncState`] for display in the workbook.

use crate::config::ConnectorConfig;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Sheet and cell the sync state is written to.
pub const STATUS_SHEET: &str = "Settings";
pub const STATUS_CELL: &str = "D2";

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("connector request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("connector API returned {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("unexpected connector response: {0}")]
    Response(String),
    #[error("invalid connector credential")]
    Credential,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Syncing,
    NotSyncing,
}

impl SyncState {
    /// `scheduled` means the connector is idle until its next run; every
    /// other reported state counts as syncing.
    pub fn from_status(status: &str) -> Self {
        if status.trim().eq_ignore_ascii_case("scheduled") {
            SyncState::NotSyncing
        } else {
            SyncState::Syncing
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Syncing => "Syncing",
            SyncState::NotSyncing => "Not Syncing",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ConnectorDetails {
    status: ConnectorStatus,
}

#[derive(Debug, Deserialize)]
struct ConnectorStatus {
    sync_state: String,
}

pub struct ConnectorClient {
    http: Client,
    base_url: String,
}

impl ConnectorClient {
    pub fn new(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        let http = Client::builder()
            .user_agent(concat!("xlbridge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(ConnectorClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn connector_url(&self, connector_id: &str) -> String {
        format!("{}/v1/connectors/{}", self.base_url, connector_id.trim())
    }

    /// `key:secret` goes out as HTTP Basic; anything else is taken to be an
    /// already encoded Basic token.
    fn authorize(&self, req: RequestBuilder, credential: &str) -> Result<RequestBuilder, ConnectorError> {
        let credential = credential.trim();
        match credential.split_once(':') {
            Some((key, secret)) => Ok(req.basic_auth(key, Some(secret))),
            None => {
                let mut value = HeaderValue::from_str(&format!("Basic {credential}"))
                    .map_err(|_| ConnectorError::Credential)?;
                value.set_sensitive(true);
                Ok(req.header(AUTHORIZATION, value))
            }
        }
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        req: RequestBuilder,
    ) -> Result<ApiResponse<T>, ConnectorError> {
        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
                .ok()
                .and_then(|r| r.message)
                .unwrap_or(body);
            return Err(ConnectorError::Status { status, message });
        }
        response
            .json::<ApiResponse<T>>()
            .await
            .map_err(|e| ConnectorError::Response(e.to_string()))
    }

    /// Asks the service to start a sync now.
    pub async fn trigger_sync(
        &self,
        connector_id: &str,
        credential: &str,
    ) -> Result<SyncState, ConnectorError> {
        let url = format!("{}/sync", self.connector_url(connector_id));
        let req = self.authorize(self.http.post(&url).json(&json!({ "force": false })), credential)?;
        let response: ApiResponse<serde_json::Value> = self.send(req).await?;
        log::info!(
            "sync triggered for connector {connector_id}: {}",
            response.message.as_deref().unwrap_or("ok")
        );
        Ok(SyncState::Syncing)
    }

    pub async fn status(
        &self,
        connector_id: &str,
        credential: &str,
    ) -> Result<SyncState, ConnectorError> {
        let url = self.connector_url(connector_id);
        let req = self.authorize(self.http.get(&url), credential)?;
        let response: ApiResponse<ConnectorDetails> = self.send(req).await?;
        let details = response.data.ok_or_else(|| {
            ConnectorError::Response(format!(
                "no connector data (code {})",
                response.code.as_deref().unwrap_or("unknown")
            ))
        })?;
        log::info!(
            "connector {connector_id} sync_state = {}",
            details.status.sync_state
        );
        Ok(SyncState::from_status(&details.status.sync_state))
    }
}
