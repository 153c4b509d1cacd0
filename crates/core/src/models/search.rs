//! Indexer search results (C3 output) and scored results (C2+C4 output).

use super::release::ParsedRelease;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexerProtocol {
    Torznab,
    Newznab,
    Prowlarr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseProtocol {
    Torrent,
    Usenet,
}

/// Output of a single indexer adapter call (C3). `(indexer_id, guid)` is the
/// merge key the indexer manager (C4) uses to de-duplicate across indexers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub guid: String,
    pub link: String,
    pub magnet_link: Option<String>,
    pub size: i64,
    pub seeders: Option<i32>,
    pub leechers: Option<i32>,
    pub indexer_id: String,
    pub indexer_type: IndexerProtocol,
    pub indexer_priority: i32,
    pub protocol: ReleaseProtocol,
    pub categories: Vec<i32>,
    pub publish_date: DateTime<Utc>,
}

/// SearchResult enriched with C1/C2 output. Rejected results are retained
/// (not dropped) so a future presentation layer can show them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSearchResult {
    pub result: SearchResult,
    pub parsed: ParsedRelease,
    pub base_score: i64,
    pub custom_format_score: i64,
    pub total_score: i64,
    pub rejected: bool,
    pub rejection_reasons: Vec<String>,
}

impl ScoredSearchResult {
    /// Tie-break ordering per spec §4.2: total_score DESC, seeders DESC,
    /// size ASC, indexer_priority DESC, publish_date DESC.
    pub fn ranking_key(&self) -> (i64, i32, i64, i32, i64) {
        (
            -self.total_score,
            -self.result.seeders.unwrap_or(0),
            self.result.size,
            -self.result.indexer_priority,
            -self.result.publish_date.timestamp(),
        )
    }
}
