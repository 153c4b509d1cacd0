//! Search-progress channel (spec §4.4, §9): a bounded channel of progress
//! events returned by `SearchReleases`. The producer closes it on completion
//! or cancellation; consumers pull until `SearchComplete`.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

const PROGRESS_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SearchProgressEvent {
    SearchStarted { indexer_count: usize },
    IndexerPending { indexer_id: String },
    IndexerResult { indexer_id: String, result_count: usize },
    IndexerFailed { indexer_id: String, error: String },
    SearchComplete { total_results: usize },
}

pub fn search_progress_channel() -> (mpsc::Sender<SearchProgressEvent>, mpsc::Receiver<SearchProgressEvent>) {
    mpsc::channel(PROGRESS_CHANNEL_CAPACITY)
}
