//! Indexer Manager (C4, spec §4.4): fans a search out to every enabled
//! adapter concurrently, merges/de-duplicates the results, then scores and
//! ranks them via the decision crate (C1+C2).
//!
//! Grounded on the teacher's `MultiIndexerService` (parallel per-indexer
//! tasks, per-indexer timeout, title-normalization dedup) generalized from
//! two hardcoded clients (HDBits/Prowlarr) to an arbitrary
//! `Vec<Arc<dyn IndexerAdapter>>`, and extended with the blocklist filter
//! and C1/C2 scoring pass the spec requires before results reach C11.

use reelforge_core::models::quality::QualityProfile;
use reelforge_core::models::search::{ScoredSearchResult, SearchResult};
use reelforge_core::ports::{IndexerAdapter, IndexerManagerPort, SearchParams};
use reelforge_core::progress::SearchProgressEvent;
use reelforge_core::{CoreError, Result};
use reelforge_decision::{parse_release_title, rank, score_release};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

const PER_INDEXER_LIMIT: usize = 100;
const PER_INDEXER_TIMEOUT: Duration = Duration::from_secs(30);

/// A release title or release-group the manager should silently drop,
/// e.g. backed by `core::blocklist::BlocklistRepository` at the composition
/// root. Kept as a trait here so the indexers crate never depends on a
/// concrete store implementation.
pub trait BlocklistFilter: Send + Sync {
    fn is_blocked(&self, title: &str, release_group: Option<&str>) -> bool;
}

/// A filter that blocks nothing; used when no blocklist is wired up.
pub struct NoopBlocklistFilter;
impl BlocklistFilter for NoopBlocklistFilter {
    fn is_blocked(&self, _title: &str, _release_group: Option<&str>) -> bool {
        false
    }
}

pub struct IndexerManager {
    indexers: Vec<Arc<dyn IndexerAdapter>>,
    blocklist: Arc<dyn BlocklistFilter>,
}

impl IndexerManager {
    pub fn new(indexers: Vec<Arc<dyn IndexerAdapter>>) -> Self {
        Self {
            indexers,
            blocklist: Arc::new(NoopBlocklistFilter),
        }
    }

    pub fn with_blocklist(mut self, blocklist: Arc<dyn BlocklistFilter>) -> Self {
        self.blocklist = blocklist;
        self
    }

    async fn fan_out(&self, params: &SearchParams, progress: Option<&mpsc::Sender<SearchProgressEvent>>) -> Vec<SearchResult> {
        if let Some(tx) = progress {
            let _ = tx.send(SearchProgressEvent::SearchStarted { indexer_count: self.indexers.len() }).await;
        }

        let mut tasks = Vec::with_capacity(self.indexers.len());
        for indexer in &self.indexers {
            let indexer = indexer.clone();
            let params = params.clone();
            let progress = progress.cloned();
            if let Some(tx) = &progress {
                let _ = tx.send(SearchProgressEvent::IndexerPending { indexer_id: indexer.indexer_id().to_string() }).await;
            }
            tasks.push(tokio::spawn(async move {
                let indexer_id = indexer.indexer_id().to_string();
                let outcome = match timeout(PER_INDEXER_TIMEOUT, indexer.search(&params)).await {
                    Ok(Ok(mut results)) => {
                        results.truncate(PER_INDEXER_LIMIT);
                        if let Some(tx) = &progress {
                            let _ = tx
                                .send(SearchProgressEvent::IndexerResult { indexer_id: indexer_id.clone(), result_count: results.len() })
                                .await;
                        }
                        results
                    }
                    Ok(Err(err)) => {
                        warn!(indexer = %indexer_id, error = %err, "indexer search failed");
                        if let Some(tx) = &progress {
                            let _ = tx
                                .send(SearchProgressEvent::IndexerFailed { indexer_id: indexer_id.clone(), error: err.to_string() })
                                .await;
                        }
                        Vec::new()
                    }
                    Err(_) => {
                        warn!(indexer = %indexer_id, "indexer search timed out");
                        if let Some(tx) = &progress {
                            let _ = tx
                                .send(SearchProgressEvent::IndexerFailed { indexer_id: indexer_id.clone(), error: "timed out".to_string() })
                                .await;
                        }
                        Vec::new()
                    }
                };
                outcome
            }));
        }

        let mut merged = Vec::new();
        for task in tasks {
            if let Ok(results) = task.await {
                merged.extend(results);
            }
        }

        if let Some(tx) = progress {
            let _ = tx.send(SearchProgressEvent::SearchComplete { total_results: merged.len() }).await;
        }
        merged
    }

    /// De-duplicate by (normalized title, size bucketed to ±5%), preferring
    /// more seeders for torrents and higher indexer priority for usenet.
    fn deduplicate(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        let mut groups: HashMap<(String, i64), SearchResult> = HashMap::new();

        for result in results {
            let key = (normalize_title(&result.title), size_bucket(result.size));
            match groups.get(&key) {
                Some(existing) if !prefers(&result, existing) => {}
                _ => {
                    groups.insert(key, result);
                }
            }
        }

        groups.into_values().collect()
    }

    fn filter_blocklist(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        results
            .into_iter()
            .filter(|r| {
                let group = parse_release_title(&r.title).release_group;
                !self.blocklist.is_blocked(&r.title, group.as_deref())
            })
            .collect()
    }
}

impl IndexerManager {
    /// Same as `IndexerManagerPort::search`, but reports fan-out progress on
    /// `progress` as each indexer completes (spec §4.4/§9).
    #[instrument(skip(self, profile, progress), fields(indexers = self.indexers.len()))]
    pub async fn search_with_progress(
        &self,
        params: &SearchParams,
        profile: &QualityProfile,
        progress: Option<mpsc::Sender<SearchProgressEvent>>,
    ) -> Result<Vec<ScoredSearchResult>> {
        if self.indexers.is_empty() {
            return Err(CoreError::ConfigurationError {
                field: "indexers".to_string(),
                message: "no indexers configured".to_string(),
            });
        }

        let merged = self.fan_out(params, progress.as_ref()).await;
        debug!(count = merged.len(), "fan-out complete");
        let deduped = self.deduplicate(merged);
        let filtered = self.filter_blocklist(deduped);

        let scored: Vec<ScoredSearchResult> = filtered
            .into_iter()
            .map(|result| {
                let parsed = parse_release_title(&result.title);
                score_release(result, parsed, profile, params.runtime_minutes)
            })
            .collect();

        Ok(rank(scored))
    }
}

#[async_trait::async_trait]
impl IndexerManagerPort for IndexerManager {
    async fn search(&self, params: &SearchParams, profile: &QualityProfile) -> Result<Vec<ScoredSearchResult>> {
        self.search_with_progress(params, profile, None).await
    }
}

fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Bucket size to ±5% by rounding to the nearest 10% step, so sizes within
/// 5% of each other land in the same bucket.
fn size_bucket(size: i64) -> i64 {
    if size <= 0 {
        return 0;
    }
    let step = (size as f64 * 0.05).max(1.0);
    (size as f64 / step).round() as i64
}

fn prefers(candidate: &SearchResult, existing: &SearchResult) -> bool {
    use reelforge_core::models::search::ReleaseProtocol;
    match candidate.protocol {
        ReleaseProtocol::Torrent => candidate.seeders.unwrap_or(0) > existing.seeders.unwrap_or(0),
        ReleaseProtocol::Usenet => candidate.indexer_priority > existing.indexer_priority,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reelforge_core::models::search::{IndexerProtocol, ReleaseProtocol};

    fn result(title: &str, size: i64, seeders: i32, priority: i32) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            guid: format!("{title}-{size}"),
            link: "http://example.test/1".to_string(),
            magnet_link: None,
            size,
            seeders: Some(seeders),
            leechers: Some(1),
            indexer_id: "idx".to_string(),
            indexer_type: IndexerProtocol::Torznab,
            indexer_priority: priority,
            protocol: ReleaseProtocol::Torrent,
            categories: vec![2000],
            publish_date: Utc::now(),
        }
    }

    #[test]
    fn title_normalization_ignores_punctuation_and_case() {
        assert_eq!(normalize_title("The Matrix (1999) - Extended Cut"), "the matrix 1999 extended cut");
    }

    #[test]
    fn dedup_prefers_higher_seeders_within_size_bucket() {
        let manager = IndexerManager::new(vec![]);
        let results = vec![
            result("Movie.Name.2024.1080p.BluRay.x264-A", 10_000_000_000, 5, 0),
            result("Movie.Name.2024.1080p.BluRay.x264-A", 10_050_000_000, 50, 0),
        ];
        let deduped = manager.deduplicate(results);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].seeders, Some(50));
    }

    #[test]
    fn dedup_keeps_distinct_titles_separate() {
        let manager = IndexerManager::new(vec![]);
        let results = vec![
            result("Movie.One.2024.1080p.BluRay.x264-A", 10_000_000_000, 5, 0),
            result("Movie.Two.2024.1080p.BluRay.x264-A", 10_000_000_000, 5, 0),
        ];
        assert_eq!(manager.deduplicate(results).len(), 2);
    }
}
