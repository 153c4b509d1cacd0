//! qBittorrent adapter (spec §4.5): cookie-session Web API client.
//!
//! Grounded on the teacher's `QBittorrentClient` (auth/session handling,
//! circuit breaker, transparent re-login on auth failure), retargeted to
//! implement `core::ports::DownloadClientAdapter` and emit
//! `core::models::download::DownloadEntry` instead of the teacher's own
//! `TorrentInfo`/`AddTorrentParams` surface.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use async_trait::async_trait;
use reelforge_core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use reelforge_core::models::download::{ClientDownloadStatus, ClientKind, DownloadEntry};
use reelforge_core::ports::DownloadClientAdapter;
use reelforge_core::{CoreError, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct QBittorrentConfig {
    pub client_id: String,
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl Default for QBittorrentConfig {
    fn default() -> Self {
        Self {
            client_id: "qbittorrent".to_string(),
            base_url: "http://localhost:8080".to_string(),
            username: "admin".to_string(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    authenticated: bool,
    last_auth_time: Option<std::time::Instant>,
}

#[derive(Debug)]
pub struct QBittorrentClient {
    config: QBittorrentConfig,
    client: Client,
    base_url: Url,
    session_state: Arc<RwLock<SessionState>>,
    circuit_breaker: CircuitBreaker,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTorrentInfo {
    hash: String,
    name: String,
    state: String,
    progress: f64,
    dlspeed: i64,
    size: i64,
    completed: i64,
    eta: i64,
    category: String,
    save_path: String,
    #[serde(default)]
    ratio: Option<f64>,
    #[serde(default)]
    seeding_time: Option<i64>,
}

impl QBittorrentClient {
    pub fn new(config: QBittorrentConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| CoreError::ConfigurationError {
            field: "qbittorrent.base_url".to_string(),
            message: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(CALL_TIMEOUT)
            .cookie_store(true)
            .build()
            .map_err(|e| CoreError::ExternalServiceError {
                service: config.client_id.clone(),
                error: e.to_string(),
            })?;

        let circuit_breaker_config = CircuitBreakerConfig::new(config.client_id.clone())
            .with_failure_threshold(3)
            .with_timeout(Duration::from_secs(30))
            .with_request_timeout(CALL_TIMEOUT)
            .with_success_threshold(1);

        Ok(Self {
            config,
            client,
            base_url,
            session_state: Arc::new(RwLock::new(SessionState::default())),
            circuit_breaker: CircuitBreaker::new(circuit_breaker_config),
        })
    }

    async fn needs_authentication(&self) -> bool {
        let state = self.session_state.read().await;
        match state.last_auth_time {
            Some(last) if state.authenticated => last.elapsed() > Duration::from_secs(30 * 60),
            _ => true,
        }
    }

    async fn ensure_authenticated(&self) -> Result<()> {
        if self.needs_authentication().await {
            self.login().await?;
        }
        Ok(())
    }

    async fn login(&self) -> Result<()> {
        let login_url = self.base_url.join("api/v2/auth/login").map_err(|e| CoreError::ExternalServiceError {
            service: self.config.client_id.clone(),
            error: e.to_string(),
        })?;

        let mut form = HashMap::new();
        form.insert("username", &self.config.username);
        form.insert("password", &self.config.password);

        debug!("logging in to qBittorrent");

        let response = self
            .client
            .post(login_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CoreError::ExternalServiceError {
                service: self.config.client_id.clone(),
                error: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(CoreError::ExternalServiceError {
                service: self.config.client_id.clone(),
                error: format!("login failed with status {}", response.status()),
            });
        }

        let text = response.text().await.unwrap_or_default();
        if text.to_lowercase().contains("fail") {
            return Err(CoreError::AuthenticationRequired {
                service: self.config.client_id.clone(),
                message: "invalid credentials".to_string(),
            });
        }

        let mut state = self.session_state.write().await;
        state.authenticated = true;
        state.last_auth_time = Some(std::time::Instant::now());
        info!("authenticated with qBittorrent");
        Ok(())
    }

    async fn reset_auth_state(&self) {
        let mut state = self.session_state.write().await;
        state.authenticated = false;
        state.last_auth_time = None;
    }

    fn is_auth_error(&self, error: &CoreError) -> bool {
        let s = error.to_string().to_lowercase();
        s.contains("forbidden") || s.contains("403") || s.contains("unauthorized")
    }

    /// Retry the given operation once after a fresh login, if it fails with an auth error.
    async fn with_reauth<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.ensure_authenticated().await?;
        match op().await {
            Ok(v) => Ok(v),
            Err(e) if self.is_auth_error(&e) => {
                warn!("qBittorrent session expired, re-authenticating");
                self.reset_auth_state().await;
                self.ensure_authenticated().await?;
                op().await
            }
            Err(e) => Err(e),
        }
    }

    async fn list_torrents(&self) -> Result<Vec<RawTorrentInfo>> {
        let url = self.base_url.join("api/v2/torrents/info").map_err(|e| CoreError::ExternalServiceError {
            service: self.config.client_id.clone(),
            error: e.to_string(),
        })?;
        let client = self.client.clone();
        let client_id = self.config.client_id.clone();
        self.circuit_breaker
            .call(async move {
                let response = client.get(url).send().await.map_err(CoreError::from)?;
                if !response.status().is_success() {
                    return Err(CoreError::ExternalServiceError {
                        service: client_id,
                        error: format!("HTTP {}", response.status()),
                    });
                }
                response.json::<Vec<RawTorrentInfo>>().await.map_err(CoreError::from)
            })
            .await
    }

    fn extract_hash_from_magnet(&self, magnet_url: &str) -> Option<String> {
        let start = magnet_url.find("xt=urn:btih:")? + "xt=urn:btih:".len();
        let rest = &magnet_url[start..];
        let hash = rest.split('&').next().unwrap_or(rest);
        Some(hash.to_uppercase())
    }
}

fn map_state(raw: &str) -> ClientDownloadStatus {
    match raw {
        "downloading" | "forcedDL" | "metaDL" | "stalledDL" => ClientDownloadStatus::Downloading,
        "uploading" | "forcedUP" | "stalledUP" => ClientDownloadStatus::Completed,
        s if s.starts_with("paused") => ClientDownloadStatus::Paused,
        s if s.starts_with("queued") || s.starts_with("checking") || s == "allocating" => ClientDownloadStatus::Queued,
        "error" | "missingFiles" => ClientDownloadStatus::Error,
        _ => ClientDownloadStatus::Unknown,
    }
}

impl From<RawTorrentInfo> for DownloadEntry {
    fn from(raw: RawTorrentInfo) -> Self {
        DownloadEntry {
            external_id: raw.hash,
            name: raw.name,
            size: raw.size,
            downloaded: raw.completed,
            progress: raw.progress as f32,
            speed: raw.dlspeed,
            eta_seconds: if raw.eta >= 0 { Some(raw.eta) } else { None },
            status: map_state(&raw.state),
            error_message: None,
            save_path: raw.save_path,
            category: if raw.category.is_empty() { None } else { Some(raw.category) },
            ratio: raw.ratio,
            seeding_time_seconds: raw.seeding_time,
        }
    }
}

#[async_trait]
impl DownloadClientAdapter for QBittorrentClient {
    fn client_id(&self) -> &str {
        &self.config.client_id
    }

    fn client_kind(&self) -> ClientKind {
        ClientKind::Torrent
    }

    async fn test_connection(&self) -> Result<()> {
        self.login().await?;
        self.list_torrents().await?;
        Ok(())
    }

    async fn list_downloads(&self) -> Result<Vec<DownloadEntry>> {
        let raw = self.with_reauth(|| self.list_torrents()).await?;
        Ok(raw.into_iter().map(DownloadEntry::from).collect())
    }

    async fn add_torrent(&self, url_or_magnet: &str, category: &str) -> Result<String> {
        let url_or_magnet = url_or_magnet.to_string();
        let category = category.to_string();
        self.with_reauth(|| {
            let url_or_magnet = url_or_magnet.clone();
            let category = category.clone();
            async move {
                let add_url = self.base_url.join("api/v2/torrents/add").map_err(|e| CoreError::ExternalServiceError {
                    service: self.config.client_id.clone(),
                    error: e.to_string(),
                })?;

                let mut form = reqwest::multipart::Form::new().text("urls", url_or_magnet.clone());
                if !category.is_empty() {
                    form = form.text("category", category.clone());
                }

                let response = self
                    .client
                    .post(add_url)
                    .multipart(form)
                    .send()
                    .await
                    .map_err(|e| CoreError::ExternalServiceError {
                        service: self.config.client_id.clone(),
                        error: e.to_string(),
                    })?;

                if !response.status().is_success() {
                    return Err(CoreError::ExternalServiceError {
                        service: self.config.client_id.clone(),
                        error: format!("add torrent failed with status {}", response.status()),
                    });
                }

                Ok(self
                    .extract_hash_from_magnet(&url_or_magnet)
                    .unwrap_or_else(|| url_or_magnet.clone()))
            }
        })
        .await
    }

    async fn add_nzb(&self, _url: &str, _category: &str) -> Result<String> {
        Err(CoreError::DownloadClientError {
            client: self.config.client_id.clone(),
            message: reelforge_core::models::download::reasons::UNSUPPORTED_PROTOCOL.to_string(),
        })
    }

    async fn pause(&self, external_id: &str) -> Result<()> {
        let hash = external_id.to_string();
        self.with_reauth(|| {
            let hash = hash.clone();
            async move {
                let url = self.base_url.join("api/v2/torrents/pause").map_err(|e| CoreError::ExternalServiceError {
                    service: self.config.client_id.clone(),
                    error: e.to_string(),
                })?;
                let mut form = HashMap::new();
                form.insert("hashes", hash.as_str());
                let response = self.client.post(url).form(&form).send().await.map_err(CoreError::from)?;
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(CoreError::ExternalServiceError {
                        service: self.config.client_id.clone(),
                        error: format!("pause failed with status {}", response.status()),
                    })
                }
            }
        })
        .await
    }

    async fn resume(&self, external_id: &str) -> Result<()> {
        let hash = external_id.to_string();
        self.with_reauth(|| {
            let hash = hash.clone();
            async move {
                let url = self.base_url.join("api/v2/torrents/resume").map_err(|e| CoreError::ExternalServiceError {
                    service: self.config.client_id.clone(),
                    error: e.to_string(),
                })?;
                let mut form = HashMap::new();
                form.insert("hashes", hash.as_str());
                let response = self.client.post(url).form(&form).send().await.map_err(CoreError::from)?;
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(CoreError::ExternalServiceError {
                        service: self.config.client_id.clone(),
                        error: format!("resume failed with status {}", response.status()),
                    })
                }
            }
        })
        .await
    }

    async fn delete(&self, external_id: &str, delete_files: bool) -> Result<()> {
        let hash = external_id.to_string();
        self.with_reauth(|| {
            let hash = hash.clone();
            async move {
                let url = self.base_url.join("api/v2/torrents/delete").map_err(|e| CoreError::ExternalServiceError {
                    service: self.config.client_id.clone(),
                    error: e.to_string(),
                })?;
                let mut form = HashMap::new();
                form.insert("hashes", hash.as_str());
                let delete_files_str = if delete_files { "true" } else { "false" };
                form.insert("deleteFiles", delete_files_str);
                let response = self.client.post(url).form(&form).send().await.map_err(CoreError::from)?;
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(CoreError::ExternalServiceError {
                        service: self.config.client_id.clone(),
                        error: format!("delete failed with status {}", response.status()),
                    })
                }
            }
        })
        .await
    }
}
