//! NZBGet adapter (spec §4.5): JSON-RPC 2.0 over HTTP basic auth.
//! `listgroups` covers the active queue, `history` covers completed items.
//!
//! Grounded on the Transmission adapter's RPC-envelope shape, adapted to
//! NZBGet's JSON-RPC 2.0 method/params convention instead of Transmission's
//! flat method/arguments body.

use std::time::Duration;

use async_trait::async_trait;
use reelforge_core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use reelforge_core::models::download::{ClientDownloadStatus, ClientKind, DownloadEntry};
use reelforge_core::ports::DownloadClientAdapter;
use reelforge_core::{CoreError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct NzbgetConfig {
    pub client_id: String,
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl Default for NzbgetConfig {
    fn default() -> Self {
        Self {
            client_id: "nzbget".to_string(),
            base_url: "http://localhost:6789".to_string(),
            username: "nzbget".to_string(),
            password: String::new(),
        }
    }
}

#[derive(Debug)]
pub struct NzbgetClient {
    config: NzbgetConfig,
    client: Client,
    rpc_url: Url,
    circuit_breaker: CircuitBreaker,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    method: &'a str,
    params: Value,
    id: u32,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Value,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawGroup {
    #[serde(rename = "NZBID")]
    nzbid: i64,
    #[serde(rename = "NZBName")]
    nzb_name: String,
    #[serde(rename = "FileSizeLo")]
    file_size_lo: i64,
    #[serde(rename = "RemainingSizeLo")]
    remaining_size_lo: i64,
    #[serde(rename = "DownloadRate")]
    download_rate: i64,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Category", default)]
    category: String,
    #[serde(rename = "DestDir", default)]
    dest_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawHistoryItem {
    #[serde(rename = "NZBID")]
    nzbid: i64,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "FileSizeLo")]
    file_size_lo: i64,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Category", default)]
    category: String,
    #[serde(rename = "DestDir", default)]
    dest_dir: String,
}

impl NzbgetClient {
    pub fn new(config: NzbgetConfig) -> Result<Self> {
        let rpc_url = Url::parse(&config.base_url)
            .and_then(|u| u.join("jsonrpc"))
            .map_err(|e| CoreError::ConfigurationError {
                field: "nzbget.base_url".to_string(),
                message: e.to_string(),
            })?;
        let client = Client::builder().timeout(CALL_TIMEOUT).build().map_err(|e| CoreError::ExternalServiceError {
            service: config.client_id.clone(),
            error: e.to_string(),
        })?;
        let circuit_breaker = CircuitBreaker::new(CircuitBreakerConfig::new(config.client_id.clone()).with_request_timeout(CALL_TIMEOUT));
        Ok(Self { config, client, rpc_url, circuit_breaker })
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value> {
        let body = JsonRpcRequest { method, params, id: 1 };
        let client = self.client.clone();
        let url = self.rpc_url.clone();
        let username = self.config.username.clone();
        let password = self.config.password.clone();
        let client_id = self.config.client_id.clone();

        self.circuit_breaker
            .call(async move {
                let response = client
                    .post(url)
                    .basic_auth(username, Some(password))
                    .json(&body)
                    .send()
                    .await
                    .map_err(CoreError::from)?;
                if !response.status().is_success() {
                    return Err(CoreError::ExternalServiceError { service: client_id, error: format!("HTTP {}", response.status()) });
                }
                let parsed: JsonRpcResponse = response.json().await.map_err(CoreError::from)?;
                if let Some(err) = parsed.error {
                    return Err(CoreError::ExternalServiceError { service: client_id, error: err.message });
                }
                Ok(parsed.result)
            })
            .await
    }
}

fn map_group_status(status: &str) -> ClientDownloadStatus {
    match status {
        "DOWNLOADING" => ClientDownloadStatus::Downloading,
        "PAUSED" | "PAUSED_QUEUE" => ClientDownloadStatus::Paused,
        "QUEUED" | "FETCHING" => ClientDownloadStatus::Queued,
        s if s.starts_with("FAILURE") => ClientDownloadStatus::Error,
        _ => ClientDownloadStatus::Unknown,
    }
}

impl From<RawGroup> for DownloadEntry {
    fn from(raw: RawGroup) -> Self {
        let downloaded = raw.file_size_lo - raw.remaining_size_lo;
        let progress = if raw.file_size_lo > 0 { downloaded as f32 / raw.file_size_lo as f32 } else { 0.0 };
        DownloadEntry {
            external_id: raw.nzbid.to_string(),
            name: raw.nzb_name,
            size: raw.file_size_lo,
            downloaded,
            progress,
            speed: raw.download_rate,
            eta_seconds: None,
            status: map_group_status(&raw.status),
            error_message: None,
            save_path: raw.dest_dir,
            category: if raw.category.is_empty() { None } else { Some(raw.category) },
            ratio: None,
            seeding_time_seconds: None,
        }
    }
}

impl From<RawHistoryItem> for DownloadEntry {
    fn from(raw: RawHistoryItem) -> Self {
        let status = if raw.status.starts_with("SUCCESS") {
            ClientDownloadStatus::Completed
        } else if raw.status.starts_with("FAILURE") {
            ClientDownloadStatus::Error
        } else {
            ClientDownloadStatus::Unknown
        };
        DownloadEntry {
            external_id: raw.nzbid.to_string(),
            name: raw.name,
            size: raw.file_size_lo,
            downloaded: raw.file_size_lo,
            progress: 1.0,
            speed: 0,
            eta_seconds: None,
            status,
            error_message: if status == ClientDownloadStatus::Error { Some(raw.status) } else { None },
            save_path: raw.dest_dir,
            category: if raw.category.is_empty() { None } else { Some(raw.category) },
            ratio: None,
            seeding_time_seconds: None,
        }
    }
}

#[async_trait]
impl DownloadClientAdapter for NzbgetClient {
    fn client_id(&self) -> &str {
        &self.config.client_id
    }

    fn client_kind(&self) -> ClientKind {
        ClientKind::Usenet
    }

    async fn test_connection(&self) -> Result<()> {
        self.rpc_call("version", json!([])).await?;
        Ok(())
    }

    async fn list_downloads(&self) -> Result<Vec<DownloadEntry>> {
        let groups = self.rpc_call("listgroups", json!([0])).await?;
        let groups: Vec<RawGroup> = serde_json::from_value(groups).map_err(|e| CoreError::SerializationError(e.to_string()))?;

        let history = self.rpc_call("history", json!([false])).await?;
        let history: Vec<RawHistoryItem> = serde_json::from_value(history).map_err(|e| CoreError::SerializationError(e.to_string()))?;

        let mut entries: Vec<DownloadEntry> = groups.into_iter().map(DownloadEntry::from).collect();
        entries.extend(history.into_iter().map(DownloadEntry::from));
        Ok(entries)
    }

    async fn add_torrent(&self, _url: &str, _category: &str) -> Result<String> {
        Err(CoreError::DownloadClientError {
            client: self.config.client_id.clone(),
            message: reelforge_core::models::download::reasons::UNSUPPORTED_PROTOCOL.to_string(),
        })
    }

    async fn add_nzb(&self, url: &str, category: &str) -> Result<String> {
        let params = json!(["", url, category, 0, false, false, "", 0, "SCORE", false]);
        let result = self.rpc_call("appendurl", params).await?;
        let nzb_id = result.as_i64().unwrap_or(0);
        if nzb_id <= 0 {
            return Err(CoreError::ExternalServiceError {
                service: self.config.client_id.clone(),
                error: "appendurl rejected".to_string(),
            });
        }
        Ok(nzb_id.to_string())
    }

    async fn pause(&self, external_id: &str) -> Result<()> {
        let id: i64 = external_id.parse().unwrap_or(0);
        self.rpc_call("editqueue", json!(["GroupPause", "", [id]])).await?;
        Ok(())
    }

    async fn resume(&self, external_id: &str) -> Result<()> {
        let id: i64 = external_id.parse().unwrap_or(0);
        self.rpc_call("editqueue", json!(["GroupResume", "", [id]])).await?;
        Ok(())
    }

    async fn delete(&self, external_id: &str, _delete_files: bool) -> Result<()> {
        let id: i64 = external_id.parse().unwrap_or(0);
        self.rpc_call("editqueue", json!(["GroupDelete", "", [id]])).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_group_status_variants() {
        assert_eq!(map_group_status("DOWNLOADING"), ClientDownloadStatus::Downloading);
        assert_eq!(map_group_status("PAUSED_QUEUE"), ClientDownloadStatus::Paused);
        assert_eq!(map_group_status("FAILURE/HEALTH"), ClientDownloadStatus::Error);
    }

    #[test]
    fn group_progress_derived_from_remaining_size() {
        let raw = RawGroup {
            nzbid: 42,
            nzb_name: "Test.Release".to_string(),
            file_size_lo: 1000,
            remaining_size_lo: 400,
            download_rate: 100,
            status: "DOWNLOADING".to_string(),
            category: "movies".to_string(),
            dest_dir: "/downloads".to_string(),
        };
        let entry: DownloadEntry = raw.into();
        assert_eq!(entry.downloaded, 600);
        assert!((entry.progress - 0.6).abs() < 1e-6);
    }
}
