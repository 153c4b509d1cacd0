//! Bridges the fully-async `core::blocklist::BlocklistService` to the
//! synchronous `reelforge_indexers::manager::BlocklistFilter` the indexer
//! manager consults on its search hot path.
//!
//! The manager's filter call happens inline while scoring search results
//! and can't await a database round trip per candidate, so this keeps a
//! refreshed in-memory snapshot of active blocklist entries instead,
//! normalized the same way `IndexerManager::deduplicate` normalizes
//! titles.

use reelforge_core::blocklist::{BlocklistQuery, BlocklistRepository, BlocklistService};
use reelforge_indexers::BlocklistFilter;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

const SNAPSHOT_LIMIT: i32 = 5_000;

fn normalize(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct RefreshingBlocklistFilter<R: BlocklistRepository> {
    service: Arc<BlocklistService<R>>,
    auto_block_after: u32,
    snapshot: RwLock<HashSet<String>>,
    blocked_groups: RwLock<HashSet<String>>,
}

impl<R: BlocklistRepository + 'static> RefreshingBlocklistFilter<R> {
    pub fn new(service: Arc<BlocklistService<R>>, auto_block_after: u32) -> Arc<Self> {
        Arc::new(Self {
            service,
            auto_block_after,
            snapshot: RwLock::new(HashSet::new()),
            blocked_groups: RwLock::new(HashSet::new()),
        })
    }

    async fn refresh_once(&self) {
        let query = BlocklistQuery {
            active_only: true,
            limit: SNAPSHOT_LIMIT,
            ..Default::default()
        };
        match self.service.search_blocked_releases(&query).await {
            Ok(entries) => {
                if entries.len() as i32 == SNAPSHOT_LIMIT {
                    warn!(limit = SNAPSHOT_LIMIT, "blocklist snapshot may be truncated");
                }

                let mut group_counts: HashMap<String, u32> = HashMap::new();
                for entry in &entries {
                    if let Some(group) = &entry.release_group {
                        *group_counts.entry(normalize(group)).or_insert(0) += 1;
                    }
                }
                let blocked_groups: HashSet<String> = group_counts
                    .into_iter()
                    .filter(|(_, count)| *count >= self.auto_block_after)
                    .map(|(group, _)| group)
                    .collect();

                let titles: HashSet<String> = entries.iter().map(|e| normalize(&e.release_title)).collect();
                let count = titles.len();
                let blocked_group_count = blocked_groups.len();
                *self.snapshot.write().unwrap() = titles;
                *self.blocked_groups.write().unwrap() = blocked_groups;
                info!(count, blocked_group_count, "refreshed blocklist snapshot");
            }
            Err(err) => {
                error!(%err, "failed to refresh blocklist snapshot, keeping previous one");
            }
        }
    }

    /// Runs the periodic refresh until `stop_rx` reports `true`, refreshing
    /// once immediately on start so the first search isn't served against an
    /// empty snapshot.
    pub async fn run(self: Arc<Self>, interval: Duration, mut stop_rx: watch::Receiver<bool>) {
        self.refresh_once().await;
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => self.refresh_once().await,
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

impl<R: BlocklistRepository + 'static> BlocklistFilter for RefreshingBlocklistFilter<R> {
    fn is_blocked(&self, title: &str, release_group: Option<&str>) -> bool {
        if self.snapshot.read().unwrap().contains(&normalize(title)) {
            return true;
        }
        release_group
            .map(|group| self.blocked_groups.read().unwrap().contains(&normalize(group)))
            .unwrap_or(false)
    }
}
