//! Monitoring loop (C7): periodically reconciles download-client state with
//! tracked state and drives the TrackedDownload FSM. Grounded on the
//! concurrent-per-client polling shape of the teacher's queue processor.

use crate::models::download::{ClientDownloadStatus, DownloadEntry, DownloadState, TrackedDownload, reasons};
use crate::ports::{DownloadClientAdapter, TrackedDownloadStore};
use crate::retry::{retry_with_backoff, RetryConfig, RetryPolicy};
use crate::Result;
use chrono::Utc;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub stalled_threshold: Duration,
    pub disappeared_threshold: Duration,
    pub callback_concurrency: usize,
    pub seeding_min_ratio: f64,
    pub seeding_min_time: Duration,
    pub seeding_max_time: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            stalled_threshold: Duration::from_secs(6 * 3600),
            disappeared_threshold: Duration::from_secs(10 * 60),
            callback_concurrency: 4,
            seeding_min_ratio: 1.0,
            seeding_min_time: Duration::from_secs(24 * 3600),
            seeding_max_time: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

type ReadyCallback = Arc<
    dyn Fn(TrackedDownload) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync,
>;

/// Drives the TrackedDownload FSM by polling every enabled download client on
/// a fixed tick. Callbacks are unidirectional function fields (spec §9) so
/// the monitor never holds a back-reference to the orchestrator.
pub struct MonitoringLoop<S: TrackedDownloadStore> {
    store: Arc<S>,
    clients: Vec<Arc<dyn DownloadClientAdapter>>,
    config: MonitorConfig,
    on_ready_for_import: Option<ReadyCallback>,
    on_ready_to_remove: Option<ReadyCallback>,
    callback_semaphore: Arc<Semaphore>,
}

impl<S: TrackedDownloadStore + 'static> MonitoringLoop<S> {
    pub fn new(store: Arc<S>, clients: Vec<Arc<dyn DownloadClientAdapter>>, config: MonitorConfig) -> Self {
        let callback_semaphore = Arc::new(Semaphore::new(config.callback_concurrency));
        Self {
            store,
            clients,
            config,
            on_ready_for_import: None,
            on_ready_to_remove: None,
            callback_semaphore,
        }
    }

    pub fn on_ready_for_import<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(TrackedDownload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_ready_for_import = Some(Arc::new(move |td| Box::pin(f(td))));
        self
    }

    pub fn on_ready_to_remove<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(TrackedDownload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_ready_to_remove = Some(Arc::new(move |td| Box::pin(f(td))));
        self
    }

    /// Runs until `stop_rx` reports `true`. Exits after the current tick;
    /// in-flight callbacks are awaited before returning (no force-kill).
    pub async fn run(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.clone().tick().await {
                        error!(%err, "monitoring tick failed");
                    }
                }
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        info!("monitoring loop received stop signal, exiting after current tick");
                        break;
                    }
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn tick(self: Arc<Self>) -> Result<()> {
        let handles: Vec<_> = self
            .clients
            .iter()
            .cloned()
            .map(|client| {
                let this = self.clone();
                tokio::spawn(async move { this.poll_client(client).await })
            })
            .collect();

        for handle in handles {
            if let Err(join_err) = handle.await {
                error!(%join_err, "client poll task panicked");
            }
        }

        self.sweep_ready_to_remove().await?;
        Ok(())
    }

    /// One client's worth of work for a tick: never overlaps with the
    /// previous tick's poll of the same client (enforced by awaiting to
    /// completion here rather than spawning a concurrent duplicate).
    async fn poll_client(&self, client: Arc<dyn DownloadClientAdapter>) -> Result<()> {
        let entries = retry_with_backoff(
            RetryConfig::quick(),
            RetryPolicy::Transient,
            &format!("list_downloads[{}]", client.client_id()),
            || {
                let client = client.clone();
                async move { client.list_downloads().await }
            },
        )
        .await?;

        let by_external_id: HashMap<&str, &DownloadEntry> =
            entries.iter().map(|e| (e.external_id.as_str(), e)).collect();

        let active = self.store.list_active().await?;
        for td in active.into_iter().filter(|td| td.download_client_id == client.client_id()) {
            if let Some(entry) = by_external_id.get(td.external_id.as_str()) {
                self.reconcile_present(&td, entry).await?;
            } else {
                self.reconcile_absent(&td).await?;
            }
        }
        Ok(())
    }

    async fn reconcile_present(&self, td: &TrackedDownload, entry: &DownloadEntry) -> Result<()> {
        self.store.update_progress(td.id, entry).await?;

        match entry.status {
            ClientDownloadStatus::Downloading => {
                if td.state != DownloadState::Downloading {
                    self.store.transition(td.id, DownloadState::Downloading, None, None).await?;
                } else if self.is_stalled(td, entry) {
                    self.store
                        .transition(td.id, DownloadState::Stalled, Some(reasons::STALLED_NO_PROGRESS), None)
                        .await?;
                }
            }
            ClientDownloadStatus::Paused => {
                if td.state != DownloadState::Paused {
                    self.store.transition(td.id, DownloadState::Paused, None, None).await?;
                }
            }
            ClientDownloadStatus::Queued => {
                if td.state != DownloadState::Queued {
                    let _ = self.store.transition(td.id, DownloadState::Queued, None, None).await;
                }
            }
            ClientDownloadStatus::Completed => {
                let updated = self.store.transition(td.id, DownloadState::Completed, None, None).await?;
                let updated = self
                    .store
                    .transition(updated.id, DownloadState::ImportPending, None, None)
                    .await?;
                self.fire_ready_for_import(updated).await;
            }
            ClientDownloadStatus::Error => {
                if let Some(msg) = &entry.error_message {
                    self.store.append_error(td.id, msg).await?;
                }
                self.store
                    .transition(td.id, DownloadState::Failed, Some(reasons::CLIENT_ERROR), None)
                    .await?;
            }
            ClientDownloadStatus::Unknown => {
                debug!(download_id = %td.id, "client reported unknown status, leaving state unchanged");
            }
        }
        Ok(())
    }

    fn is_stalled(&self, td: &TrackedDownload, entry: &DownloadEntry) -> bool {
        entry.speed == 0
            && (Utc::now() - td.state_changed_at)
                .to_std()
                .map(|elapsed| elapsed >= self.config.stalled_threshold)
                .unwrap_or(false)
    }

    async fn reconcile_absent(&self, td: &TrackedDownload) -> Result<()> {
        if !td.state.is_active() {
            return Ok(());
        }
        let elapsed = (Utc::now() - td.state_changed_at).to_std().unwrap_or(Duration::ZERO);
        if elapsed >= self.config.disappeared_threshold {
            warn!(download_id = %td.id, "download disappeared from client");
            self.store
                .transition(td.id, DownloadState::Failed, Some(reasons::DISAPPEARED_FROM_CLIENT), None)
                .await?;
        }
        Ok(())
    }

    async fn sweep_ready_to_remove(&self) -> Result<()> {
        let Some(callback) = self.on_ready_to_remove.clone() else { return Ok(()) };
        let candidates = self
            .store
            .list_ready_to_remove(
                self.config.seeding_min_ratio,
                self.config.seeding_min_time.as_secs() as i64,
                self.config.seeding_max_time.as_secs() as i64,
            )
            .await?;
        for td in candidates {
            self.dispatch(callback.clone(), td).await;
        }
        Ok(())
    }

    async fn fire_ready_for_import(&self, td: TrackedDownload) {
        if let Some(callback) = self.on_ready_for_import.clone() {
            self.dispatch(callback, td).await;
        }
    }

    /// Runs a callback in the bounded worker pool; exceptions are logged and
    /// recorded onto the TrackedDownload, never propagated to the loop.
    async fn dispatch(&self, callback: ReadyCallback, td: TrackedDownload) {
        let permit = self.callback_semaphore.clone().acquire_owned().await;
        let store = self.store.clone();
        let td_id = td.id;
        tokio::spawn(async move {
            let _permit = permit;
            let result = std::panic::AssertUnwindSafe(callback(td)).catch_unwind().await;
            if let Err(panic) = result {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "callback panicked".to_string());
                error!(download_id = %td_id, %message, "monitoring callback panicked");
                let _ = store.append_error(td_id, &message).await;
            }
        });
    }
}
