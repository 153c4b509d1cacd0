//! QueueStats (spec §3A): a read-model aggregating the TrackedDownload
//! store's active rows by state, for operational visibility. Not user-facing
//! on its own; any future presentation layer calls `compute` directly.

use crate::models::download::DownloadState;
use crate::ports::{TrackedDownloadFilter, TrackedDownloadStore};
use crate::Result;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QueueStats {
    pub by_state: HashMap<String, usize>,
    pub total_size: i64,
    pub total_downloaded: i64,
    pub aggregate_speed: i64,
}

/// Computes `QueueStats` over every non-terminal tracked download plus any
/// row still sitting in the import pipeline.
pub async fn compute(store: &dyn TrackedDownloadStore) -> Result<QueueStats> {
    let active = store.list_active().await?;
    let pending_import = store.list_pending_import().await?;
    let importing = store
        .list(&TrackedDownloadFilter {
            states: vec![DownloadState::Importing, DownloadState::ImportBlocked],
            media_id: None,
        })
        .await?;

    let mut stats = QueueStats::default();
    for td in active.iter().chain(pending_import.iter()).chain(importing.iter()) {
        *stats.by_state.entry(td.state.to_string()).or_insert(0) += 1;
        stats.total_size += td.size;
        stats.total_downloaded += td.downloaded;
        stats.aggregate_speed += td.speed;
    }
    Ok(stats)
}
