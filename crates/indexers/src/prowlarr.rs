//! Prowlarr proxy adapter (spec §4.3): HTTP GET to `/api/v1/search` using
//! `X-Api-Key`, returning a JSON array mapped directly to `SearchResult`.
//!
//! Grounded on the teacher's `ProwlarrClient` (rate limiter, config builder,
//! response handling), retargeted to implement `core::ports::IndexerAdapter`
//! and to emit `core::models::search::SearchResult` instead of its own
//! `SearchResponse` wrapper.

use crate::models::ProwlarrSearchResult;
use async_trait::async_trait;
use chrono::Utc;
use reelforge_core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use reelforge_core::models::search::{IndexerProtocol, ReleaseProtocol, SearchResult};
use reelforge_core::ports::{IndexerAdapter, SearchParams};
use reelforge_core::{CoreError, Result};
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ProwlarrConfig {
    pub base_url: String,
    pub api_key: String,
    pub indexer_id: String,
    pub priority: i32,
    pub max_requests_per_minute: u32,
    pub user_agent: String,
    pub verify_ssl: bool,
}

impl Default for ProwlarrConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9696".to_string(),
            api_key: String::new(),
            indexer_id: "prowlarr".to_string(),
            priority: 0,
            max_requests_per_minute: 60,
            user_agent: "reelforge/0.1".to_string(),
            verify_ssl: true,
        }
    }
}

#[derive(Debug)]
struct RateLimiter {
    max_requests: u32,
    window_duration: Duration,
    requests: Mutex<Vec<Instant>>,
}

impl RateLimiter {
    fn new(max_requests_per_minute: u32) -> Self {
        Self {
            max_requests: max_requests_per_minute,
            window_duration: Duration::from_secs(60),
            requests: Mutex::new(Vec::new()),
        }
    }

    async fn wait_if_needed(&self) {
        let mut requests = self.requests.lock().await;
        let now = Instant::now();
        requests.retain(|&time| now.duration_since(time) < self.window_duration);

        if requests.len() >= self.max_requests as usize {
            let oldest = requests[0];
            let wait_time = self.window_duration.saturating_sub(now.duration_since(oldest));
            if wait_time > Duration::from_secs(0) {
                debug!(?wait_time, "prowlarr rate limit reached");
                drop(requests);
                tokio::time::sleep(wait_time).await;
                requests = self.requests.lock().await;
                let now = Instant::now();
                requests.retain(|&time| now.duration_since(time) < self.window_duration);
            }
        }
        requests.push(Instant::now());
    }
}

#[derive(Debug)]
pub struct ProwlarrClient {
    config: ProwlarrConfig,
    client: Client,
    rate_limiter: RateLimiter,
    base_url: Url,
    circuit_breaker: CircuitBreaker,
}

impl ProwlarrClient {
    pub fn new(config: ProwlarrConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| CoreError::ConfigurationError {
            field: "prowlarr.base_url".to_string(),
            message: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(CALL_TIMEOUT)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| CoreError::ExternalServiceError {
                service: config.indexer_id.clone(),
                error: e.to_string(),
            })?;

        let rate_limiter = RateLimiter::new(config.max_requests_per_minute);
        let circuit_breaker_config = CircuitBreakerConfig::new(config.indexer_id.clone())
            .with_request_timeout(CALL_TIMEOUT);
        let circuit_breaker = CircuitBreaker::new(circuit_breaker_config);

        Ok(Self {
            config,
            client,
            rate_limiter,
            base_url,
            circuit_breaker,
        })
    }

    async fn search_raw(&self, params: &SearchParams) -> Result<Vec<ProwlarrSearchResult>> {
        self.rate_limiter.wait_if_needed().await;

        let mut url = self
            .base_url
            .join("/api/v1/search")
            .map_err(|e| CoreError::ExternalServiceError {
                service: self.config.indexer_id.clone(),
                error: e.to_string(),
            })?;

        {
            let mut query_pairs = url.query_pairs_mut();
            if !params.query.is_empty() {
                query_pairs.append_pair("query", &params.query);
            }
            if let Some(imdb_id) = &params.imdb_id {
                query_pairs.append_pair("imdbId", imdb_id);
            }
            if let Some(tmdb_id) = params.tmdb_id {
                query_pairs.append_pair("tmdbId", &tmdb_id.to_string());
            }
            if let Some(tvdb_id) = params.tvdb_id {
                query_pairs.append_pair("tvdbId", &tvdb_id.to_string());
            }
            if let Some(season) = params.season {
                query_pairs.append_pair("season", &season.to_string());
            }
            if let Some(episode) = params.episode {
                query_pairs.append_pair("episode", &episode.to_string());
            }
            if !params.categories.is_empty() {
                let categories = params.categories.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(",");
                query_pairs.append_pair("categories", &categories);
            }
            query_pairs.append_pair("indexerIds", &self.config.indexer_id);
        }

        debug!(%url, "searching prowlarr");

        let client = self.client.clone();
        let indexer_id = self.config.indexer_id.clone();
        let api_key = self.config.api_key.clone();

        self.circuit_breaker
            .call(async move {
                let response = client.get(url).header("X-Api-Key", &api_key).send().await.map_err(CoreError::from)?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(CoreError::ExternalServiceError {
                        service: indexer_id,
                        error: format!("HTTP {status}: {body}"),
                    });
                }

                response.json::<Vec<ProwlarrSearchResult>>().await.map_err(CoreError::from)
            })
            .await
    }
}

#[async_trait]
impl IndexerAdapter for ProwlarrClient {
    fn indexer_id(&self) -> &str {
        &self.config.indexer_id
    }

    fn priority(&self) -> i32 {
        self.config.priority
    }

    async fn test_connection(&self) -> Result<()> {
        let url = self.base_url.join("/api/v1/system/status").map_err(|e| CoreError::ExternalServiceError {
            service: self.config.indexer_id.clone(),
            error: e.to_string(),
        })?;
        let client = self.client.clone();
        let api_key = self.config.api_key.clone();
        let indexer_id = self.config.indexer_id.clone();

        self.circuit_breaker
            .call(async move {
                let response = client
                    .get(url)
                    .header("X-Api-Key", &api_key)
                    .timeout(Duration::from_secs(5))
                    .send()
                    .await
                    .map_err(CoreError::from)?;
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(CoreError::ExternalServiceError {
                        service: indexer_id,
                        error: format!("HTTP {}", response.status()),
                    })
                }
            })
            .await
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<SearchResult>> {
        let raw = self.search_raw(params).await?;
        Ok(raw.into_iter().map(|r| map_result(r, &self.config)).collect())
    }
}

fn map_result(raw: ProwlarrSearchResult, config: &ProwlarrConfig) -> SearchResult {
    let protocol = match raw.protocol.as_deref() {
        Some("usenet") => ReleaseProtocol::Usenet,
        _ => ReleaseProtocol::Torrent,
    };
    SearchResult {
        title: raw.title,
        guid: raw.guid.unwrap_or_else(|| raw.download_url.clone()),
        link: raw.download_url,
        magnet_link: raw.magnet_url,
        size: raw.size.unwrap_or(0),
        seeders: raw.seeders,
        leechers: raw.leechers,
        indexer_id: config.indexer_id.clone(),
        indexer_type: IndexerProtocol::Prowlarr,
        indexer_priority: config.priority,
        protocol,
        categories: raw.categories.into_iter().map(|c| c.id).collect(),
        publish_date: raw.publish_date.unwrap_or_else(Utc::now),
    }
}

pub struct ProwlarrConfigBuilder {
    config: ProwlarrConfig,
}

impl ProwlarrConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ProwlarrConfig::default(),
        }
    }

    pub fn base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn api_key<S: Into<String>>(mut self, key: S) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn indexer_id<S: Into<String>>(mut self, id: S) -> Self {
        self.config.indexer_id = id.into();
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.config.priority = priority;
        self
    }

    pub fn rate_limit(mut self, requests_per_minute: u32) -> Self {
        self.config.max_requests_per_minute = requests_per_minute;
        self
    }

    pub fn build(self) -> ProwlarrConfig {
        self.config
    }
}

impl Default for ProwlarrConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn from_env() -> Result<ProwlarrClient> {
    let base_url = std::env::var("PROWLARR_BASE_URL").unwrap_or_else(|_| "http://localhost:9696".to_string());
    let api_key = std::env::var("PROWLARR_API_KEY").map_err(|_| CoreError::ConfigurationError {
        field: "PROWLARR_API_KEY".to_string(),
        message: "environment variable not set".to_string(),
    })?;

    let config = ProwlarrConfigBuilder::new().base_url(base_url).api_key(api_key).build();
    ProwlarrClient::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder_sets_fields() {
        let config = ProwlarrConfigBuilder::new()
            .base_url("http://test:8080")
            .api_key("test-key")
            .indexer_id("prowlarr-1")
            .priority(5)
            .rate_limit(120)
            .build();

        assert_eq!(config.base_url, "http://test:8080");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.indexer_id, "prowlarr-1");
        assert_eq!(config.priority, 5);
        assert_eq!(config.max_requests_per_minute, 120);
    }

    #[tokio::test]
    async fn rate_limiter_delays_beyond_window() {
        let limiter = RateLimiter::new(2);
        limiter.wait_if_needed().await;
        limiter.wait_if_needed().await;

        let start = Instant::now();
        limiter.wait_if_needed().await;
        assert!(start.elapsed() >= Duration::from_secs(55));
    }

    #[test]
    fn maps_raw_result_into_search_result() {
        let config = ProwlarrConfig {
            indexer_id: "prowlarr-1".to_string(),
            priority: 3,
            ..ProwlarrConfig::default()
        };
        let raw = ProwlarrSearchResult {
            title: "Movie.2024.1080p.BluRay.x264-GROUP".to_string(),
            download_url: "http://example.test/dl/1".to_string(),
            magnet_url: None,
            info_url: None,
            indexer_id: 1,
            indexer: "TestIndexer".to_string(),
            size: Some(8_000_000_000),
            seeders: Some(20),
            leechers: Some(1),
            publish_date: Some(Utc::now()),
            categories: vec![],
            attributes: Default::default(),
            guid: Some("abc-123".to_string()),
            protocol: Some("torrent".to_string()),
        };
        let mapped = map_result(raw, &config);
        assert_eq!(mapped.indexer_id, "prowlarr-1");
        assert_eq!(mapped.indexer_priority, 3);
        assert_eq!(mapped.guid, "abc-123");
        assert_eq!(mapped.size, 8_000_000_000);
    }
}
