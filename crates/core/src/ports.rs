//! Ports: trait boundaries the orchestration services (C7, C11) depend on.
//! Concrete adapters live in sibling crates (indexers, downloaders, import,
//! infrastructure) and are wired together at the composition root (main.rs).
//! No process-wide singletons; everything is passed in explicitly (spec §9).

use crate::models::download::{ClientKind, DownloadEntry, DownloadEvent, DownloadState, TrackedDownload};
use crate::models::quality::{MediaQualityStatus, MediaType, QualityProfile};
use crate::models::search::{ScoredSearchResult, SearchResult};
use crate::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Filters accepted by `ListTracked` (inbound interface, spec §6).
#[derive(Debug, Clone, Default)]
pub struct TrackedDownloadFilter {
    pub states: Vec<DownloadState>,
    pub media_id: Option<Uuid>,
}

/// C6: durable store for TrackedDownload + its event log. Every multi-row
/// effect is transactional.
#[async_trait]
pub trait TrackedDownloadStore: Send + Sync {
    async fn create(&self, td: &TrackedDownload) -> Result<TrackedDownload>;
    async fn get(&self, id: Uuid) -> Result<Option<TrackedDownload>>;
    async fn get_by_external(&self, download_client_id: &str, external_id: &str) -> Result<Option<TrackedDownload>>;
    async fn list_active(&self) -> Result<Vec<TrackedDownload>>;
    async fn list_pending_import(&self) -> Result<Vec<TrackedDownload>>;
    async fn list_ready_to_remove(&self, min_ratio: f64, min_seed_time_s: i64, max_seed_time_s: i64) -> Result<Vec<TrackedDownload>>;
    async fn list(&self, filter: &TrackedDownloadFilter) -> Result<Vec<TrackedDownload>>;
    async fn update_progress(&self, id: Uuid, entry: &DownloadEntry) -> Result<()>;
    async fn transition(&self, id: Uuid, new_state: DownloadState, reason: Option<&str>, details: Option<serde_json::Value>) -> Result<TrackedDownload>;
    async fn append_warning(&self, id: Uuid, warning: &str) -> Result<()>;
    async fn append_error(&self, id: Uuid, error: &str) -> Result<()>;
    async fn events_for(&self, download_id: Uuid) -> Result<Vec<DownloadEvent>>;
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// C12: per-media currently-held quality.
#[async_trait]
pub trait QualityStatusStore: Send + Sync {
    async fn get(&self, media_id: Uuid, media_type: MediaType) -> Result<Option<MediaQualityStatus>>;
    async fn upsert(&self, status: &MediaQualityStatus) -> Result<()>;
}

/// C3: one adapter per indexer instance. `search` never aborts a fan-out on a
/// single adapter's failure; errors are returned to the caller (C4) instead.
#[async_trait]
pub trait IndexerAdapter: Send + Sync {
    fn indexer_id(&self) -> &str;
    fn priority(&self) -> i32;
    async fn test_connection(&self) -> Result<()>;
    async fn search(&self, params: &SearchParams) -> Result<Vec<SearchResult>>;
}

#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub query: String,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<i64>,
    pub tvdb_id: Option<i64>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Runtime of the requested media in minutes, supplied by the caller
    /// (the metadata-enrichment collaborator resolves this externally).
    /// `None` means the scorer skips the per-runtime-minute size check
    /// rather than reject on data it doesn't have.
    pub runtime_minutes: Option<u32>,
    pub categories: Vec<i32>,
}

/// C5: unified download-client contract. Operations unsupported by a given
/// `client_kind` fail with `CoreError::DownloadClientError` carrying the
/// `unsupported_protocol` reason rather than being absent from the trait.
#[async_trait]
pub trait DownloadClientAdapter: Send + Sync {
    fn client_id(&self) -> &str;
    fn client_kind(&self) -> ClientKind;
    async fn test_connection(&self) -> Result<()>;
    async fn list_downloads(&self) -> Result<Vec<DownloadEntry>>;
    async fn add_torrent(&self, url_or_magnet: &str, category: &str) -> Result<String>;
    async fn add_nzb(&self, url: &str, category: &str) -> Result<String>;
    async fn pause(&self, external_id: &str) -> Result<()>;
    async fn resume(&self, external_id: &str) -> Result<()>;
    async fn delete(&self, external_id: &str, delete_files: bool) -> Result<()>;
}

/// Outbound: request lifecycle notifications to the external request collaborator.
#[async_trait]
pub trait RequestNotifier: Send + Sync {
    async fn mark_processing(&self, request_id: Uuid) -> Result<()>;
    async fn mark_available(&self, request_id: Uuid) -> Result<()>;
    async fn mark_failed(&self, request_id: Uuid, reason: &str) -> Result<()>;
}

/// Result of running the import pipeline (C8+C9+C10+placement) against a
/// completed download. Implemented by the import crate.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub import_path: String,
    pub quality_status: MediaQualityStatus,
}

#[async_trait]
pub trait ImportExecutor: Send + Sync {
    async fn run(&self, td: &TrackedDownload, profile: &QualityProfile) -> Result<ImportOutcome>;
}

/// C4: fan-out search + ranking, consulted by the acquisition service for
/// `searchAlternative`.
#[async_trait]
pub trait IndexerManagerPort: Send + Sync {
    async fn search(&self, params: &SearchParams, profile: &QualityProfile) -> Result<Vec<ScoredSearchResult>>;
}
