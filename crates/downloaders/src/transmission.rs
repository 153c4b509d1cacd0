//! Transmission adapter (spec §4.5): JSON-RPC over `/transmission/rpc`.
//!
//! Grounded on the qBittorrent adapter's shape (config/circuit-breaker/port
//! impl), adapted for Transmission's CSRF-token handshake: a fresh session
//! sends one request without `X-Transmission-Session-Id`, gets 409 back with
//! the token in a response header, and retries exactly once with it attached.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reelforge_core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use reelforge_core::models::download::{ClientDownloadStatus, ClientKind, DownloadEntry};
use reelforge_core::ports::DownloadClientAdapter;
use reelforge_core::{CoreError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const SESSION_HEADER: &str = "X-Transmission-Session-Id";

#[derive(Debug, Clone)]
pub struct TransmissionConfig {
    pub client_id: String,
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            client_id: "transmission".to_string(),
            base_url: "http://localhost:9091".to_string(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug)]
pub struct TransmissionClient {
    config: TransmissionConfig,
    client: Client,
    rpc_url: Url,
    session_id: Arc<RwLock<Option<String>>>,
    circuit_breaker: CircuitBreaker,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    method: &'a str,
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    arguments: Value,
    result: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTorrent {
    #[serde(rename = "hashString")]
    hash_string: String,
    name: String,
    status: i32,
    #[serde(rename = "totalSize")]
    total_size: i64,
    #[serde(rename = "sizeWhenDone")]
    size_when_done: i64,
    #[serde(rename = "leftUntilDone")]
    left_until_done: i64,
    #[serde(rename = "rateDownload")]
    rate_download: i64,
    eta: i64,
    #[serde(rename = "downloadDir")]
    download_dir: String,
    #[serde(default, rename = "uploadRatio")]
    upload_ratio: Option<f64>,
    #[serde(default, rename = "secondsSeeding")]
    seconds_seeding: Option<i64>,
    #[serde(default)]
    error_string: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
}

impl TransmissionClient {
    pub fn new(config: TransmissionConfig) -> Result<Self> {
        let rpc_url = Url::parse(&config.base_url)
            .and_then(|u| u.join("transmission/rpc"))
            .map_err(|e| CoreError::ConfigurationError {
                field: "transmission.base_url".to_string(),
                message: e.to_string(),
            })?;

        let client = Client::builder().timeout(CALL_TIMEOUT).build().map_err(|e| CoreError::ExternalServiceError {
            service: config.client_id.clone(),
            error: e.to_string(),
        })?;

        let circuit_breaker = CircuitBreaker::new(CircuitBreakerConfig::new(config.client_id.clone()).with_request_timeout(CALL_TIMEOUT));

        Ok(Self {
            config,
            client,
            rpc_url,
            session_id: Arc::new(RwLock::new(None)),
            circuit_breaker,
        })
    }

    async fn rpc_call(&self, method: &str, arguments: Value) -> Result<Value> {
        let body = RpcRequest { method, arguments };
        let session_id = self.session_id.read().await.clone();

        let mut request = self.client.post(self.rpc_url.clone()).json(&body);
        if let Some(token) = &session_id {
            request = request.header(SESSION_HEADER, token);
        }
        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request.send().await.map_err(CoreError::from)?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            let token = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| CoreError::ExternalServiceError {
                    service: self.config.client_id.clone(),
                    error: "409 without session id header".to_string(),
                })?;
            debug!("captured transmission session id, retrying");
            *self.session_id.write().await = Some(token.clone());

            let mut retry = self.client.post(self.rpc_url.clone()).json(&body).header(SESSION_HEADER, &token);
            if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
                retry = retry.basic_auth(user, Some(pass));
            }
            let retried = retry.send().await.map_err(CoreError::from)?;
            return self.parse_rpc_response(retried).await;
        }

        self.parse_rpc_response(response).await
    }

    async fn parse_rpc_response(&self, response: reqwest::Response) -> Result<Value> {
        if !response.status().is_success() {
            return Err(CoreError::ExternalServiceError {
                service: self.config.client_id.clone(),
                error: format!("HTTP {}", response.status()),
            });
        }
        let parsed: RpcResponse = response.json().await.map_err(CoreError::from)?;
        if parsed.result != "success" {
            return Err(CoreError::ExternalServiceError {
                service: self.config.client_id.clone(),
                error: parsed.result,
            });
        }
        Ok(parsed.arguments)
    }

    async fn get_torrents(&self) -> Result<Vec<RawTorrent>> {
        let fields = json!({
            "fields": ["hashString", "name", "status", "totalSize", "sizeWhenDone", "leftUntilDone",
                       "rateDownload", "eta", "downloadDir", "uploadRatio", "secondsSeeding", "errorString", "labels"],
        });
        let arguments = self.circuit_breaker.call(self.rpc_call("torrent-get", fields)).await?;

        let torrents = arguments
            .get("torrents")
            .cloned()
            .ok_or_else(|| CoreError::ParseError {
                input: "transmission torrent-get".to_string(),
                message: "missing torrents array".to_string(),
            })?;
        serde_json::from_value(torrents).map_err(|e| CoreError::SerializationError(e.to_string()))
    }
}

fn map_status(status: i32) -> ClientDownloadStatus {
    match status {
        0 => ClientDownloadStatus::Paused,
        1..=3 => ClientDownloadStatus::Queued,
        4 => ClientDownloadStatus::Downloading,
        5 | 6 => ClientDownloadStatus::Completed,
        _ => ClientDownloadStatus::Unknown,
    }
}

impl From<RawTorrent> for DownloadEntry {
    fn from(raw: RawTorrent) -> Self {
        let downloaded = raw.size_when_done - raw.left_until_done;
        let progress = if raw.size_when_done > 0 {
            downloaded as f32 / raw.size_when_done as f32
        } else {
            0.0
        };
        let status = if raw.error_string.as_deref().is_some_and(|s| !s.is_empty()) {
            ClientDownloadStatus::Error
        } else {
            map_status(raw.status)
        };
        DownloadEntry {
            external_id: raw.hash_string,
            name: raw.name,
            size: raw.total_size,
            downloaded,
            progress,
            speed: raw.rate_download,
            eta_seconds: if raw.eta >= 0 { Some(raw.eta) } else { None },
            status,
            error_message: raw.error_string.filter(|s| !s.is_empty()),
            save_path: raw.download_dir,
            category: raw.labels.into_iter().next(),
            ratio: raw.upload_ratio,
            seeding_time_seconds: raw.seconds_seeding,
        }
    }
}

#[async_trait]
impl DownloadClientAdapter for TransmissionClient {
    fn client_id(&self) -> &str {
        &self.config.client_id
    }

    fn client_kind(&self) -> ClientKind {
        ClientKind::Torrent
    }

    async fn test_connection(&self) -> Result<()> {
        self.rpc_call("session-get", json!({})).await?;
        Ok(())
    }

    async fn list_downloads(&self) -> Result<Vec<DownloadEntry>> {
        Ok(self.get_torrents().await?.into_iter().map(DownloadEntry::from).collect())
    }

    async fn add_torrent(&self, url_or_magnet: &str, category: &str) -> Result<String> {
        let mut args = json!({ "filename": url_or_magnet });
        if !category.is_empty() {
            args["labels"] = json!([category]);
        }
        let arguments = self.rpc_call("torrent-add", args).await?;
        let added = arguments.get("torrent-added").or_else(|| arguments.get("torrent-duplicate"));
        added
            .and_then(|t| t.get("hashString"))
            .and_then(|h| h.as_str())
            .map(str::to_string)
            .ok_or_else(|| CoreError::ExternalServiceError {
                service: self.config.client_id.clone(),
                error: "torrent-add returned no hash".to_string(),
            })
    }

    async fn add_nzb(&self, _url: &str, _category: &str) -> Result<String> {
        Err(CoreError::DownloadClientError {
            client: self.config.client_id.clone(),
            message: reelforge_core::models::download::reasons::UNSUPPORTED_PROTOCOL.to_string(),
        })
    }

    async fn pause(&self, external_id: &str) -> Result<()> {
        self.rpc_call("torrent-stop", json!({ "ids": [external_id] })).await?;
        Ok(())
    }

    async fn resume(&self, external_id: &str) -> Result<()> {
        self.rpc_call("torrent-start", json!({ "ids": [external_id] })).await?;
        Ok(())
    }

    async fn delete(&self, external_id: &str, delete_files: bool) -> Result<()> {
        self.rpc_call(
            "torrent-remove",
            json!({ "ids": [external_id], "delete-local-data": delete_files }),
        )
        .await?;
        Ok(())
    }
}
