//! Composition root: wires every adapter crate behind the `core::ports`
//! traits, then runs the monitoring loop until asked to stop.
//!
//! This binary is deliberately not an HTTP server: the JSON/HTTP
//! presentation layer, authentication, and the web client are external
//! collaborators (spec's out-of-scope list) that would talk to this
//! process's store/adapters through their own process, not through this
//! one.

mod blocklist_filter;
mod config;
mod notifier;

use crate::blocklist_filter::RefreshingBlocklistFilter;
use crate::config::AppConfig;
use crate::notifier::LoggingRequestNotifier;
use reelforge_core::blocklist::BlocklistService;
use reelforge_core::models::quality::QualityProfile;
use reelforge_core::ports::{DownloadClientAdapter, IndexerAdapter};
use reelforge_core::services::acquisition::AcquisitionService;
use reelforge_core::services::monitor::{MonitorConfig, MonitoringLoop};
use reelforge_downloaders::{NzbgetClient, QBittorrentClient, SabnzbdClient, TransmissionClient};
use reelforge_import::{ImportPipeline, ImportPipelineConfig};
use reelforge_indexers::{IndexerManager, ProwlarrClient, TorznabClient};
use reelforge_infrastructure::{
    create_pool, migrate, PostgresBlocklistRepository, PostgresQualityStatusStore, PostgresTrackedDownloadStore,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

fn build_indexers(cfg: &config::IndexersConfig) -> reelforge_core::Result<Vec<Arc<dyn IndexerAdapter>>> {
    let mut indexers: Vec<Arc<dyn IndexerAdapter>> = Vec::new();
    if let Some(prowlarr) = &cfg.prowlarr {
        indexers.push(Arc::new(ProwlarrClient::new(prowlarr.clone())?));
    }
    if let Some(torznab) = &cfg.torznab {
        indexers.push(Arc::new(TorznabClient::new(torznab.clone())?));
    }
    Ok(indexers)
}

fn build_download_clients(cfg: &config::DownloadClientsConfig) -> reelforge_core::Result<Vec<Arc<dyn DownloadClientAdapter>>> {
    let mut clients: Vec<Arc<dyn DownloadClientAdapter>> = Vec::new();
    if let Some(qbittorrent) = &cfg.qbittorrent {
        clients.push(Arc::new(QBittorrentClient::new(qbittorrent.clone())?));
    }
    if let Some(transmission) = &cfg.transmission {
        clients.push(Arc::new(TransmissionClient::new(transmission.clone())?));
    }
    if let Some(sabnzbd) = &cfg.sabnzbd {
        clients.push(Arc::new(SabnzbdClient::new(sabnzbd.clone())?));
    }
    if let Some(nzbget) = &cfg.nzbget {
        clients.push(Arc::new(NzbgetClient::new(nzbget.clone())?));
    }
    Ok(clients)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal(stop_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    let _ = stop_tx.send(true);
}

#[tokio::main]
async fn main() -> reelforge_core::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let app_config = AppConfig::from_env()?;
    app_config.validate()?;

    let pool = create_pool(app_config.database.clone()).await?;
    migrate(&pool).await?;
    tracing::info!("database ready");

    let tracked_download_store = Arc::new(PostgresTrackedDownloadStore::new(pool.clone()));
    let quality_status_store = Arc::new(PostgresQualityStatusStore::new(pool.clone()));
    let blocklist_repository = Arc::new(PostgresBlocklistRepository::new(pool.clone()));
    let blocklist_service = Arc::new(BlocklistService::new(blocklist_repository));

    let blocklist_filter = RefreshingBlocklistFilter::new(blocklist_service.clone(), app_config.blocklist.auto_block_after);

    let indexer_adapters = build_indexers(&app_config.indexers)?;
    let indexer_manager = Arc::new(IndexerManager::new(indexer_adapters).with_blocklist(blocklist_filter.clone()));

    let download_clients = build_download_clients(&app_config.download_clients)?;

    let import_pipeline_config = ImportPipelineConfig {
        movies_library: app_config.import.movies_library.clone(),
        tv_library: app_config.import.tv_library.clone(),
        sample_threshold_bytes: app_config.import.sample_threshold_bytes,
        episode_matcher: reelforge_import::EpisodeMatcherConfig {
            split_multi_episode_files: app_config.import.split_multi_episode_files,
        },
        old_file_policy: reelforge_import::OldFilePolicy {
            keep_old_files: app_config.import.keep_old_files,
            recycle_bin_path: app_config.import.recycle_bin_path.clone(),
        },
    };
    let import_pipeline = Arc::new(ImportPipeline::new(import_pipeline_config, quality_status_store.clone()));

    let notifier = Arc::new(LoggingRequestNotifier);

    let acquisition = Arc::new(AcquisitionService::new(
        tracked_download_store.clone(),
        download_clients.clone(),
        indexer_manager.clone(),
        notifier,
        import_pipeline,
        blocklist_service.clone(),
        app_config.import.import_timeout(),
    ));

    let mut profile = QualityProfile::permissive("default");
    profile.cutoff_tier = app_config.profile.cutoff_tier;
    let profile = Arc::new(profile);

    let monitor_config = MonitorConfig {
        poll_interval: app_config.monitor.poll_interval(),
        stalled_threshold: app_config.monitor.stalled_threshold(),
        disappeared_threshold: app_config.monitor.disappeared_threshold(),
        callback_concurrency: app_config.monitor.callback_concurrency,
        seeding_min_ratio: app_config.monitor.seeding_min_ratio,
        seeding_min_time: app_config.monitor.seeding_min_time(),
        seeding_max_time: app_config.monitor.seeding_max_time(),
    };

    let removal_clients = download_clients.clone();
    let removal_store = tracked_download_store.clone();

    let monitoring_loop = Arc::new(
        MonitoringLoop::new(tracked_download_store.clone(), download_clients.clone(), monitor_config)
            .on_ready_for_import({
                let acquisition = acquisition.clone();
                let profile = profile.clone();
                move |td| {
                    let acquisition = acquisition.clone();
                    let profile = profile.clone();
                    async move {
                        if let Err(err) = acquisition.on_ready_for_import(td, &profile).await {
                            tracing::error!(%err, "import pipeline run failed");
                        }
                    }
                }
            })
            .on_ready_to_remove(move |td| {
                let clients = removal_clients.clone();
                let store = removal_store.clone();
                async move {
                    if let Some(client) = clients.iter().find(|c| c.client_id() == td.download_client_id) {
                        if let Err(err) = client.delete(&td.external_id, false).await {
                            tracing::warn!(download_id = %td.id, %err, "failed to remove seeding-complete download from client");
                            return;
                        }
                    }
                    if let Err(err) = store.delete(td.id).await {
                        tracing::warn!(download_id = %td.id, %err, "failed to delete tracked download row after removal");
                    }
                }
            }),
    );

    let (stop_tx, stop_rx) = watch::channel(false);

    let blocklist_refresh_handle = tokio::spawn(
        blocklist_filter.run(app_config.blocklist.refresh_interval(), stop_rx.clone()),
    );
    let monitor_handle = tokio::spawn(monitoring_loop.run(stop_rx));

    shutdown_signal(stop_tx).await;

    tracing::info!(grace_period_secs = app_config.shutdown_grace_period_secs, "waiting for in-flight work to finish");
    let grace_period = std::time::Duration::from_secs(app_config.shutdown_grace_period_secs);
    let _ = tokio::time::timeout(grace_period, async {
        let _ = monitor_handle.await;
        let _ = blocklist_refresh_handle.await;
    })
    .await;

    tracing::info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_carries_configured_cutoff() {
        let mut profile = QualityProfile::permissive("default");
        profile.cutoff_tier = reelforge_core::models::release::QualityTier::P720;
        assert_eq!(profile.cutoff_tier, reelforge_core::models::release::QualityTier::P720);
    }
}
