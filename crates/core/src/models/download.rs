//! TrackedDownload FSM, events, and the adapter-facing download entry (spec §3, §4.5, §4.7).

use super::quality::MediaType;
use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    Torrent,
    Usenet,
}

/// The FSM state of a TrackedDownload (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    Queued,
    Downloading,
    Paused,
    Stalled,
    Completed,
    ImportPending,
    Importing,
    ImportBlocked,
    Imported,
    Failed,
    Ignored,
}

impl DownloadState {
    /// The allowed-transitions table. Any pair not listed here is rejected.
    pub fn can_transition_to(&self, next: DownloadState) -> bool {
        use DownloadState::*;
        matches!(
            (self, next),
            (Queued, Downloading)
                | (Queued, Failed)
                | (Downloading, Completed)
                | (Downloading, Paused)
                | (Downloading, Stalled)
                | (Downloading, Failed)
                | (Paused, Downloading)
                | (Paused, Failed)
                | (Stalled, Downloading)
                | (Stalled, Failed)
                | (Stalled, Ignored)
                | (Completed, ImportPending)
                | (ImportPending, Importing)
                | (ImportPending, ImportBlocked)
                | (Importing, Imported)
                | (Importing, ImportBlocked)
                | (Importing, Failed)
                | (ImportBlocked, Importing)
                | (ImportBlocked, Ignored)
                | (Failed, Queued)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadState::Imported | DownloadState::Ignored)
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DownloadState::Queued
                | DownloadState::Downloading
                | DownloadState::Paused
                | DownloadState::Stalled
        )
    }
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Stalled => "stalled",
            Self::Completed => "completed",
            Self::ImportPending => "import_pending",
            Self::Importing => "importing",
            Self::ImportBlocked => "import_blocked",
            Self::Imported => "imported",
            Self::Failed => "failed",
            Self::Ignored => "ignored",
        };
        write!(f, "{s}")
    }
}

/// Status reported by a download-client adapter's `list_downloads`, collapsed
/// from client-specific vocabularies (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientDownloadStatus {
    Downloading,
    Completed,
    Paused,
    Queued,
    Error,
    Unknown,
}

/// A single entry returned by an adapter's `list_downloads` (unified contract, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadEntry {
    pub external_id: String,
    pub name: String,
    pub size: i64,
    pub downloaded: i64,
    pub progress: f32,
    pub speed: i64,
    pub eta_seconds: Option<i64>,
    pub status: ClientDownloadStatus,
    pub error_message: Option<String>,
    pub save_path: String,
    pub category: Option<String>,
    pub ratio: Option<f64>,
    pub seeding_time_seconds: Option<i64>,
}

/// Closed vocabulary of machine-readable rejection/transition reasons (spec §7).
pub mod reasons {
    pub const NO_VALID_VIDEO: &str = "no_valid_video";
    pub const NOT_AN_UPGRADE: &str = "not_an_upgrade";
    pub const IMPORT_TIMEOUT: &str = "import_timeout";
    pub const DISAPPEARED_FROM_CLIENT: &str = "disappeared_from_client";
    pub const CLIENT_ERROR: &str = "client_error";
    pub const DESTINATION_UNAVAILABLE: &str = "destination_unavailable";
    pub const UNSUPPORTED_PROTOCOL: &str = "unsupported_protocol";
    pub const STALLED_NO_PROGRESS: &str = "stalled_no_progress";
    pub const SAMPLE_DETECTED: &str = "sample_detected";
}

/// Durable entity (C6) tracking one accepted release through its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedDownload {
    pub id: Uuid,
    pub download_client_id: String,
    pub external_id: String,
    pub client_kind: ClientKind,

    pub request_id: Option<Uuid>,
    pub media_id: Option<Uuid>,
    pub media_type: Option<MediaType>,
    /// The indexer that supplied this release, for blocklist reporting on
    /// a permanent-at-source failure (spec §4.13). `None` for downloads
    /// added before this field existed.
    pub indexer_id: Option<String>,

    pub state: DownloadState,
    pub previous_state: Option<DownloadState>,
    pub state_changed_at: DateTime<Utc>,

    pub title: String,
    pub parsed_info: Option<super::release::ParsedRelease>,

    pub size: i64,
    pub downloaded: i64,
    pub progress: f32,
    pub speed: i64,
    pub eta_seconds: Option<i64>,
    pub seeders: Option<i32>,

    pub download_path: Option<String>,
    pub import_path: Option<String>,

    pub quality_summary: Option<String>,
    pub custom_format_score: i64,

    pub grabbed_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub imported_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,

    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub import_block_reason: Option<String>,

    pub ratio: Option<f64>,
    pub seeding_time_seconds: Option<i64>,
    pub can_remove: bool,
}

impl TrackedDownload {
    pub fn new(
        download_client_id: impl Into<String>,
        external_id: impl Into<String>,
        client_kind: ClientKind,
        title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            download_client_id: download_client_id.into(),
            external_id: external_id.into(),
            client_kind,
            request_id: None,
            media_id: None,
            media_type: None,
            indexer_id: None,
            state: DownloadState::Queued,
            previous_state: None,
            state_changed_at: now,
            title: title.into(),
            parsed_info: None,
            size: 0,
            downloaded: 0,
            progress: 0.0,
            speed: 0,
            eta_seconds: None,
            seeders: None,
            download_path: None,
            import_path: None,
            quality_summary: None,
            custom_format_score: 0,
            grabbed_at: now,
            completed_at: None,
            imported_at: None,
            updated_at: now,
            warnings: Vec::new(),
            errors: Vec::new(),
            import_block_reason: None,
            ratio: None,
            seeding_time_seconds: None,
            can_remove: false,
        }
    }

    /// Apply a state transition in-memory (the store performs the same check
    /// transactionally before persisting). Returns the written event's (from, to).
    pub fn apply_transition(
        &mut self,
        new_state: DownloadState,
        reason: Option<&str>,
    ) -> Result<(DownloadState, DownloadState), CoreError> {
        if !self.state.can_transition_to(new_state) {
            return Err(CoreError::InvalidTransition {
                from: self.state.to_string(),
                to: new_state.to_string(),
                reason: reason.unwrap_or("not in allowed-transitions table").to_string(),
            });
        }
        let from = self.state;
        self.previous_state = Some(from);
        self.state = new_state;
        self.state_changed_at = Utc::now();
        self.updated_at = self.state_changed_at;

        if new_state == DownloadState::Completed && self.completed_at.is_none() {
            self.completed_at = Some(self.state_changed_at);
        }
        if new_state == DownloadState::Imported && self.imported_at.is_none() {
            self.imported_at = Some(self.state_changed_at);
        }
        if new_state == DownloadState::ImportBlocked {
            self.import_block_reason = reason.map(|r| r.to_string());
        }
        Ok((from, new_state))
    }

    /// Seeding-threshold eligibility per spec §8: imported, and either the
    /// max seed time has elapsed or both the min ratio and min seed time are met.
    pub fn can_remove_from_client(&self, min_ratio: f64, min_seed_time_s: i64, max_seed_time_s: i64) -> bool {
        if self.state != DownloadState::Imported {
            return false;
        }
        let seeding_time = self.seeding_time_seconds.unwrap_or(0);
        let ratio = self.ratio.unwrap_or(0.0);
        seeding_time >= max_seed_time_s || (ratio >= min_ratio && seeding_time >= min_seed_time_s)
    }
}

/// Append-only log of state transitions (spec §3), written atomically with every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadEvent {
    pub id: Uuid,
    pub download_id: Uuid,
    pub from_state: Option<DownloadState>,
    pub to_state: DownloadState,
    pub reason: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl DownloadEvent {
    pub fn new(
        download_id: Uuid,
        from_state: Option<DownloadState>,
        to_state: DownloadState,
        reason: Option<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            download_id,
            from_state,
            to_state,
            reason,
            details,
            created_at: Utc::now(),
        }
    }
}
