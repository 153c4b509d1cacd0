//! SABnzbd adapter (spec §4.5): `?mode=queue` and `?mode=history` combined
//! into one `list_downloads` view; percent values parsed as floats.
//!
//! Grounded on the qBittorrent adapter's port-impl/circuit-breaker shape,
//! adapted to SABnzbd's query-string JSON API (no session cookie — every
//! call carries `apikey`).

use std::time::Duration;

use async_trait::async_trait;
use reelforge_core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use reelforge_core::models::download::{ClientDownloadStatus, ClientKind, DownloadEntry};
use reelforge_core::ports::DownloadClientAdapter;
use reelforge_core::{CoreError, Result};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SabnzbdConfig {
    pub client_id: String,
    pub base_url: String,
    pub api_key: String,
}

impl Default for SabnzbdConfig {
    fn default() -> Self {
        Self {
            client_id: "sabnzbd".to_string(),
            base_url: "http://localhost:8080".to_string(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug)]
pub struct SabnzbdClient {
    config: SabnzbdConfig,
    client: Client,
    base_url: Url,
    circuit_breaker: CircuitBreaker,
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    queue: QueueBody,
}

#[derive(Debug, Deserialize)]
struct QueueBody {
    slots: Vec<QueueSlot>,
}

#[derive(Debug, Deserialize)]
struct QueueSlot {
    nzo_id: String,
    filename: String,
    mb: String,
    mbleft: String,
    percentage: String,
    status: String,
    #[serde(default)]
    cat: String,
    timeleft: String,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    history: HistoryBody,
}

#[derive(Debug, Deserialize)]
struct HistoryBody {
    slots: Vec<HistorySlot>,
}

#[derive(Debug, Deserialize)]
struct HistorySlot {
    nzo_id: String,
    name: String,
    bytes: i64,
    status: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    storage: String,
    #[serde(default, rename = "fail_message")]
    fail_message: String,
}

impl SabnzbdClient {
    pub fn new(config: SabnzbdConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| CoreError::ConfigurationError {
            field: "sabnzbd.base_url".to_string(),
            message: e.to_string(),
        })?;
        let client = Client::builder().timeout(CALL_TIMEOUT).build().map_err(|e| CoreError::ExternalServiceError {
            service: config.client_id.clone(),
            error: e.to_string(),
        })?;
        let circuit_breaker = CircuitBreaker::new(CircuitBreakerConfig::new(config.client_id.clone()).with_request_timeout(CALL_TIMEOUT));
        Ok(Self { config, client, base_url, circuit_breaker })
    }

    fn api_url(&self, mode: &str, extra: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.join("api").map_err(|e| CoreError::ExternalServiceError {
            service: self.config.client_id.clone(),
            error: e.to_string(),
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("mode", mode);
            query.append_pair("apikey", &self.config.api_key);
            query.append_pair("output", "json");
            for (k, v) in extra {
                query.append_pair(k, v);
            }
        }
        Ok(url)
    }

    async fn fetch_queue(&self) -> Result<Vec<QueueSlot>> {
        let url = self.api_url("queue", &[])?;
        let client = self.client.clone();
        let client_id = self.config.client_id.clone();
        let body: QueueResponse = self
            .circuit_breaker
            .call(async move {
                let response = client.get(url).send().await.map_err(CoreError::from)?;
                if !response.status().is_success() {
                    return Err(CoreError::ExternalServiceError { service: client_id, error: format!("HTTP {}", response.status()) });
                }
                response.json::<QueueResponse>().await.map_err(CoreError::from)
            })
            .await?;
        Ok(body.queue.slots)
    }

    async fn fetch_history(&self) -> Result<Vec<HistorySlot>> {
        let url = self.api_url("history", &[])?;
        let client = self.client.clone();
        let client_id = self.config.client_id.clone();
        let body: HistoryResponse = self
            .circuit_breaker
            .call(async move {
                let response = client.get(url).send().await.map_err(CoreError::from)?;
                if !response.status().is_success() {
                    return Err(CoreError::ExternalServiceError { service: client_id, error: format!("HTTP {}", response.status()) });
                }
                response.json::<HistoryResponse>().await.map_err(CoreError::from)
            })
            .await?;
        Ok(body.history.slots)
    }
}

fn map_queue_status(status: &str) -> ClientDownloadStatus {
    match status.to_lowercase().as_str() {
        "downloading" => ClientDownloadStatus::Downloading,
        "paused" => ClientDownloadStatus::Paused,
        "queued" | "checking" | "grabbing" => ClientDownloadStatus::Queued,
        "failed" => ClientDownloadStatus::Error,
        _ => ClientDownloadStatus::Unknown,
    }
}

impl From<QueueSlot> for DownloadEntry {
    fn from(slot: QueueSlot) -> Self {
        let size = (slot.mb.parse::<f64>().unwrap_or(0.0) * 1024.0 * 1024.0) as i64;
        let left = (slot.mbleft.parse::<f64>().unwrap_or(0.0) * 1024.0 * 1024.0) as i64;
        let percent = slot.percentage.parse::<f32>().unwrap_or(0.0) / 100.0;
        DownloadEntry {
            external_id: slot.nzo_id,
            name: slot.filename,
            size,
            downloaded: size - left,
            progress: percent,
            speed: 0,
            eta_seconds: parse_sabnzbd_timeleft(&slot.timeleft),
            status: map_queue_status(&slot.status),
            error_message: None,
            save_path: String::new(),
            category: if slot.cat.is_empty() { None } else { Some(slot.cat) },
            ratio: None,
            seeding_time_seconds: None,
        }
    }
}

impl From<HistorySlot> for DownloadEntry {
    fn from(slot: HistorySlot) -> Self {
        let status = match slot.status.to_lowercase().as_str() {
            "completed" => ClientDownloadStatus::Completed,
            "failed" => ClientDownloadStatus::Error,
            _ => ClientDownloadStatus::Unknown,
        };
        DownloadEntry {
            external_id: slot.nzo_id,
            name: slot.name,
            size: slot.bytes,
            downloaded: slot.bytes,
            progress: 1.0,
            speed: 0,
            eta_seconds: None,
            status,
            error_message: if slot.fail_message.is_empty() { None } else { Some(slot.fail_message) },
            save_path: slot.storage,
            category: if slot.category.is_empty() { None } else { Some(slot.category) },
            ratio: None,
            seeding_time_seconds: None,
        }
    }
}

/// SABnzbd's `timeleft` is `H:MM:SS`; `0:00:00` or unparsable means unknown.
fn parse_sabnzbd_timeleft(timeleft: &str) -> Option<i64> {
    let parts: Vec<&str> = timeleft.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let (h, m, s) = (parts[0].parse::<i64>().ok()?, parts[1].parse::<i64>().ok()?, parts[2].parse::<i64>().ok()?);
    let total = h * 3600 + m * 60 + s;
    if total == 0 { None } else { Some(total) }
}

#[async_trait]
impl DownloadClientAdapter for SabnzbdClient {
    fn client_id(&self) -> &str {
        &self.config.client_id
    }

    fn client_kind(&self) -> ClientKind {
        ClientKind::Usenet
    }

    async fn test_connection(&self) -> Result<()> {
        self.fetch_queue().await?;
        Ok(())
    }

    async fn list_downloads(&self) -> Result<Vec<DownloadEntry>> {
        let mut entries: Vec<DownloadEntry> = self.fetch_queue().await?.into_iter().map(DownloadEntry::from).collect();
        entries.extend(self.fetch_history().await?.into_iter().map(DownloadEntry::from));
        Ok(entries)
    }

    async fn add_torrent(&self, _url: &str, _category: &str) -> Result<String> {
        Err(CoreError::DownloadClientError {
            client: self.config.client_id.clone(),
            message: reelforge_core::models::download::reasons::UNSUPPORTED_PROTOCOL.to_string(),
        })
    }

    async fn add_nzb(&self, url: &str, category: &str) -> Result<String> {
        let mut extra = vec![("name", url)];
        if !category.is_empty() {
            extra.push(("cat", category));
        }
        let add_url = self.api_url("addurl", &extra)?;
        let response = self.client.get(add_url).send().await.map_err(CoreError::from)?;
        if !response.status().is_success() {
            return Err(CoreError::ExternalServiceError {
                service: self.config.client_id.clone(),
                error: format!("HTTP {}", response.status()),
            });
        }
        Ok(url.to_string())
    }

    async fn pause(&self, external_id: &str) -> Result<()> {
        let url = self.api_url("queue", &[("name", "pause"), ("value", external_id)])?;
        self.client.get(url).send().await.map_err(CoreError::from)?;
        Ok(())
    }

    async fn resume(&self, external_id: &str) -> Result<()> {
        let url = self.api_url("queue", &[("name", "resume"), ("value", external_id)])?;
        self.client.get(url).send().await.map_err(CoreError::from)?;
        Ok(())
    }

    async fn delete(&self, external_id: &str, delete_files: bool) -> Result<()> {
        let del_files = if delete_files { "1" } else { "0" };
        let queue_url = self
            .api_url("queue", &[("name", "delete"), ("value", external_id), ("del_files", del_files)])
            .await?;
        self.client.get(queue_url).send().await.map_err(CoreError::from)?;

        let history_url = self
            .api_url("history", &[("name", "delete"), ("value", external_id), ("del_files", del_files)])
            .await?;
        self.client.get(history_url).send().await.map_err(CoreError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timeleft_into_seconds() {
        assert_eq!(parse_sabnzbd_timeleft("1:02:03"), Some(3723));
        assert_eq!(parse_sabnzbd_timeleft("0:00:00"), None);
        assert_eq!(parse_sabnzbd_timeleft("garbage"), None);
    }

    #[test]
    fn maps_queue_status_variants() {
        assert_eq!(map_queue_status("Downloading"), ClientDownloadStatus::Downloading);
        assert_eq!(map_queue_status("Paused"), ClientDownloadStatus::Paused);
        assert_eq!(map_queue_status("Failed"), ClientDownloadStatus::Error);
    }

    #[test]
    fn queue_slot_computes_progress_from_mb_fields() {
        let slot = QueueSlot {
            nzo_id: "SABnzbd_nzo_1".to_string(),
            filename: "Test.Release".to_string(),
            mb: "1000.0".to_string(),
            mbleft: "250.0".to_string(),
            percentage: "75".to_string(),
            status: "Downloading".to_string(),
            cat: "movies".to_string(),
            timeleft: "0:05:00".to_string(),
        };
        let entry: DownloadEntry = slot.into();
        assert!((entry.progress - 0.75).abs() < 1e-6);
        assert_eq!(entry.category, Some("movies".to_string()));
    }
}
