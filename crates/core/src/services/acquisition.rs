//! Acquisition service orchestrator (C11): grabs releases, drives the import
//! pipeline on completion, and retries with an alternative release when an
//! import is blocked. Grounded on the teacher's queue service orchestration
//! shape, generalized over the `core::ports` traits.

use crate::blocklist::BlocklistIntegration;
use crate::models::download::{reasons, ClientKind, DownloadState, TrackedDownload};
use crate::models::quality::QualityProfile;
use crate::models::search::{ReleaseProtocol, ScoredSearchResult};
use crate::ports::{
    DownloadClientAdapter, ImportExecutor, IndexerManagerPort, RequestNotifier, SearchParams, TrackedDownloadStore,
};
use crate::retry::{retry_with_backoff, RetryConfig, RetryPolicy};
use crate::{CoreError, Result};
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// How an import-pipeline failure should be handled (spec §7's failure
/// taxonomy, applied to the subset of errors `ImportExecutor` can raise).
enum ImportFailureKind {
    /// Permanent at the release: no other run of the same release would
    /// succeed, but the release itself isn't bad enough to blocklist.
    /// Transitions to `import_blocked`, no blocklist report, no re-search.
    ImportBlocked,
    /// Permanent at the source: the release should be blocklisted and an
    /// alternative searched for. Transitions to `failed`.
    Failed,
}

fn classify_import_error(err: &CoreError) -> ImportFailureKind {
    match err {
        CoreError::NoValidVideo { .. } => ImportFailureKind::ImportBlocked,
        CoreError::ImportBlocked { .. } => ImportFailureKind::ImportBlocked,
        _ => ImportFailureKind::Failed,
    }
}

fn client_kind_for(protocol: ReleaseProtocol) -> ClientKind {
    match protocol {
        ReleaseProtocol::Torrent => ClientKind::Torrent,
        ReleaseProtocol::Usenet => ClientKind::Usenet,
    }
}

/// Tracks the last `searchAlternative` attempt per media so retries stay
/// bounded to one per hour (spec §4.11).
#[derive(Default)]
struct AlternativeSearchThrottle {
    last_attempt: Mutex<HashMap<Uuid, chrono::DateTime<Utc>>>,
}

impl AlternativeSearchThrottle {
    fn allow(&self, media_id: Uuid) -> bool {
        let mut guard = self.last_attempt.lock().unwrap();
        let now = Utc::now();
        match guard.get(&media_id) {
            Some(last) if now - *last < ChronoDuration::hours(1) => false,
            _ => {
                guard.insert(media_id, now);
                true
            }
        }
    }
}

pub struct AcquisitionService<S, I, N, E>
where
    S: TrackedDownloadStore,
    I: IndexerManagerPort,
    N: RequestNotifier,
    E: ImportExecutor,
{
    store: Arc<S>,
    download_clients: Vec<Arc<dyn DownloadClientAdapter>>,
    indexer_manager: Arc<I>,
    notifier: Arc<N>,
    importer: Arc<E>,
    blocklist: Arc<dyn BlocklistIntegration + Send + Sync>,
    import_timeout: Duration,
    throttle: AlternativeSearchThrottle,
}

impl<S, I, N, E> AcquisitionService<S, I, N, E>
where
    S: TrackedDownloadStore,
    I: IndexerManagerPort,
    N: RequestNotifier,
    E: ImportExecutor,
{
    pub fn new(
        store: Arc<S>,
        download_clients: Vec<Arc<dyn DownloadClientAdapter>>,
        indexer_manager: Arc<I>,
        notifier: Arc<N>,
        importer: Arc<E>,
        blocklist: Arc<dyn BlocklistIntegration + Send + Sync>,
        import_timeout: Duration,
    ) -> Self {
        Self {
            store,
            download_clients,
            indexer_manager,
            notifier,
            importer,
            blocklist,
            import_timeout,
            throttle: AlternativeSearchThrottle::default(),
        }
    }

    /// Selects an enabled download client whose kind matches the release's
    /// protocol (spec §4.11 step 1). The first matching client wins; callers
    /// that need load-balancing across multiple clients of the same kind
    /// should pre-filter the list passed to `new`.
    fn client_for(&self, protocol: ReleaseProtocol) -> Result<&Arc<dyn DownloadClientAdapter>> {
        let wanted = client_kind_for(protocol);
        self.download_clients
            .iter()
            .find(|c| c.client_kind() == wanted)
            .ok_or_else(|| CoreError::ConfigurationError {
                field: "download_clients".to_string(),
                message: format!("no download client configured for {wanted:?}"),
            })
    }

    /// GrabRelease: sends a scored result to the download client and creates
    /// its TrackedDownload row. Idempotent on `(download_client_id, external_id)`
    /// since the client assigns the external id on add.
    #[instrument(skip(self, scored))]
    pub async fn grab_release(&self, scored: &ScoredSearchResult, request_id: Option<Uuid>, media_id: Option<Uuid>) -> Result<TrackedDownload> {
        if scored.rejected {
            return Err(CoreError::Blocked {
                reason: scored.rejection_reasons.join(", "),
            });
        }

        let uri = scored
            .result
            .magnet_link
            .as_deref()
            .unwrap_or(&scored.result.link);

        let client = self.client_for(scored.result.protocol)?;

        let external_id = retry_with_backoff(RetryConfig::slow(), RetryPolicy::Transient, "grab_release", || async {
            match scored.result.protocol {
                crate::models::search::ReleaseProtocol::Torrent => client.add_torrent(uri, "acquired").await,
                crate::models::search::ReleaseProtocol::Usenet => client.add_nzb(uri, "acquired").await,
            }
        })
        .await?;

        let mut td = TrackedDownload::new(client.client_id(), external_id, client.client_kind(), scored.result.title.clone());
        td.request_id = request_id;
        td.media_id = media_id;
        td.indexer_id = Some(scored.result.indexer_id.clone());
        td.parsed_info = Some(scored.parsed.clone());
        td.size = scored.result.size;
        td.seeders = scored.result.seeders;
        td.custom_format_score = scored.custom_format_score;

        let created = self.store.create(&td).await?;
        if let Some(request_id) = request_id {
            self.notifier.mark_processing(request_id).await?;
        }
        info!(download_id = %created.id, "release grabbed");
        Ok(created)
    }

    /// OnReadyForImport: runs the import pipeline for a download the monitor
    /// loop has marked `import_pending`, bounded by a hard per-import timeout
    /// (spec §5). On success the request is marked available. On error the
    /// outcome depends on the failure's kind (spec §7): transient errors are
    /// retried in place, a release that will never import cleanly moves to
    /// `import_blocked`, and anything else is treated as permanent-at-source
    /// — `failed`, blocklisted, and followed by an alternative search.
    #[instrument(skip(self, profile))]
    pub async fn on_ready_for_import(&self, td: TrackedDownload, profile: &QualityProfile) -> Result<()> {
        let td = self.store.transition(td.id, DownloadState::Importing, None, None).await?;

        let run_result = tokio::time::timeout(
            self.import_timeout,
            retry_with_backoff(RetryConfig::quick(), RetryPolicy::Transient, "import_pipeline", || {
                self.importer.run(&td, profile)
            }),
        )
        .await;

        let result = match run_result {
            Ok(result) => result,
            Err(_elapsed) => {
                warn!(download_id = %td.id, timeout_secs = self.import_timeout.as_secs(), "import timed out");
                self.store
                    .transition(td.id, DownloadState::Failed, Some(reasons::IMPORT_TIMEOUT), None)
                    .await?;
                if let Some(media_id) = td.media_id {
                    self.search_alternative(media_id, request_id_or_none(&td), profile).await?;
                }
                return Err(CoreError::Timeout {
                    service: "import_pipeline".to_string(),
                    elapsed_ms: self.import_timeout.as_millis() as u64,
                });
            }
        };

        match result {
            Ok(outcome) => {
                let mut details = serde_json::Map::new();
                details.insert("import_path".to_string(), outcome.import_path.clone().into());
                self.store
                    .transition(td.id, DownloadState::Imported, None, Some(details.into()))
                    .await?;
                if let Some(request_id) = td.request_id {
                    self.notifier.mark_available(request_id).await?;
                }
                info!(download_id = %td.id, import_path = %outcome.import_path, "import completed");
                Ok(())
            }
            Err(err) => {
                let reason = err.reason_code().map(str::to_string).unwrap_or_else(|| err.to_string());
                match classify_import_error(&err) {
                    ImportFailureKind::ImportBlocked => {
                        warn!(download_id = %td.id, %err, "import blocked");
                        self.store
                            .transition(td.id, DownloadState::ImportBlocked, Some(&reason), None)
                            .await?;
                    }
                    ImportFailureKind::Failed => {
                        warn!(download_id = %td.id, %err, "import failed");
                        self.store
                            .transition(td.id, DownloadState::Failed, Some(&reason), None)
                            .await?;
                        let release_group =
                            td.parsed_info.as_ref().and_then(|p| p.release_group.as_deref());
                        if let Err(report_err) = self
                            .blocklist
                            .report_failure(
                                &td.external_id,
                                td.indexer_id.as_deref().unwrap_or("unknown"),
                                &err,
                                &td.title,
                                release_group,
                                td.media_id,
                            )
                            .await
                        {
                            warn!(download_id = %td.id, %report_err, "failed to record blocklist entry");
                        }
                        if let Some(media_id) = td.media_id {
                            self.search_alternative(media_id, request_id_or_none(&td), profile).await?;
                        }
                    }
                }
                Err(err)
            }
        }
    }

    /// Re-searches for a release when an import is blocked or a download
    /// fails outright. Bounded to one attempt per media per hour.
    #[instrument(skip(self, profile))]
    pub async fn search_alternative(&self, media_id: Uuid, request_id: Option<Uuid>, profile: &QualityProfile) -> Result<()> {
        if !self.throttle.allow(media_id) {
            info!(%media_id, "alternative search throttled, skipping");
            return Ok(());
        }

        let params = SearchParams::default();
        let results = self.indexer_manager.search(&params, profile).await?;

        let Some(best) = results.iter().find(|r| !r.rejected) else {
            warn!(%media_id, "no alternative release available");
            if let Some(request_id) = request_id {
                self.notifier.mark_failed(request_id, "no_alternative_available").await?;
            }
            return Ok(());
        };

        self.grab_release(best, request_id, Some(media_id)).await?;
        Ok(())
    }

    /// OnDownloadFailed: a terminal download failure triggers the same
    /// alternative-search path as a blocked import.
    #[instrument(skip(self, profile))]
    pub async fn on_download_failed(&self, td: &TrackedDownload, profile: &QualityProfile) -> Result<()> {
        if let Some(media_id) = td.media_id {
            self.search_alternative(media_id, td.request_id, profile).await?;
        } else if let Some(request_id) = td.request_id {
            self.notifier.mark_failed(request_id, "download_failed").await?;
        }
        Ok(())
    }
}

fn request_id_or_none(td: &TrackedDownload) -> Option<Uuid> {
    td.request_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_allows_first_attempt_then_blocks_within_hour() {
        let throttle = AlternativeSearchThrottle::default();
        let media_id = Uuid::new_v4();
        assert!(throttle.allow(media_id));
        assert!(!throttle.allow(media_id));
    }
}
