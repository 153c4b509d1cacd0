//! Application configuration: one `AppConfig` tree loaded from environment
//! variables (optionally via a `.env` file), covering every external
//! interface enumerated in spec §6 plus connection settings for the
//! database and each adapter.
//!
//! Grounded on the teacher's `config::AppConfig` (per-section struct,
//! `Default` + `from_env()` + `validate()`), generalized from a single
//! hardcoded Prowlarr/qBittorrent pair to the optional multi-adapter set
//! this system supports.

use reelforge_core::models::release::QualityTier;
use reelforge_core::{CoreError, Result};
use reelforge_downloaders::{NzbgetConfig, QBittorrentConfig, SabnzbdConfig, TransmissionConfig};
use reelforge_indexers::{ProwlarrConfig, TorznabConfig, TorznabProtocol};
use reelforge_infrastructure::DatabaseConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(value) => value.parse().map_err(|_| CoreError::ConfigurationError {
            field: key.to_string(),
            message: format!("invalid value {value:?}"),
        }),
        Err(_) => Ok(default),
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_quality_tier(value: &str) -> Result<QualityTier> {
    match value.to_lowercase().as_str() {
        "sd" => Ok(QualityTier::Sd),
        "480p" => Ok(QualityTier::P480),
        "720p" => Ok(QualityTier::P720),
        "1080p" => Ok(QualityTier::P1080),
        "2160p" | "4k" => Ok(QualityTier::P2160),
        other => Err(CoreError::ConfigurationError {
            field: "QUALITY_CUTOFF_TIER".to_string(),
            message: format!("unrecognized quality tier {other:?}"),
        }),
    }
}

/// Library roots and import policy (spec §4.8-§4.11).
#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub movies_library: PathBuf,
    pub tv_library: PathBuf,
    pub sample_threshold_bytes: u64,
    pub split_multi_episode_files: bool,
    pub keep_old_files: bool,
    pub recycle_bin_path: Option<PathBuf>,
    pub import_timeout_secs: u64,
}

impl ImportSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            movies_library: PathBuf::from(env_or("MOVIES_LIBRARY_PATH", "/data/movies")),
            tv_library: PathBuf::from(env_or("TV_LIBRARY_PATH", "/data/tv")),
            sample_threshold_bytes: parse_env("IMPORT_SAMPLE_THRESHOLD_BYTES", 50 * 1024 * 1024)?,
            split_multi_episode_files: parse_env("IMPORT_SPLIT_MULTI_EPISODE_FILES", false)?,
            keep_old_files: parse_env("IMPORT_KEEP_OLD_FILES", false)?,
            recycle_bin_path: env::var("IMPORT_RECYCLE_BIN_PATH").ok().map(PathBuf::from),
            import_timeout_secs: parse_env("IMPORT_TIMEOUT_SECS", 3600)?,
        })
    }

    pub fn import_timeout(&self) -> Duration {
        Duration::from_secs(self.import_timeout_secs)
    }
}

/// Monitoring loop cadence and thresholds (spec §4.7). Durations are stored
/// in seconds here, converted to `std::time::Duration` when the composition
/// root builds `core::services::monitor::MonitorConfig`.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval_secs: u64,
    pub stalled_threshold_secs: u64,
    pub disappeared_threshold_secs: u64,
    pub callback_concurrency: usize,
    pub seeding_min_ratio: f64,
    pub seeding_min_time_secs: u64,
    pub seeding_max_time_secs: u64,
}

impl MonitorSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            poll_interval_secs: parse_env("MONITOR_POLL_INTERVAL_SECS", 5)?,
            stalled_threshold_secs: parse_env("MONITOR_STALLED_THRESHOLD_SECS", 6 * 3600)?,
            disappeared_threshold_secs: parse_env("MONITOR_DISAPPEARED_THRESHOLD_SECS", 10 * 60)?,
            callback_concurrency: parse_env("MONITOR_CALLBACK_CONCURRENCY", 4)?,
            seeding_min_ratio: parse_env("MONITOR_SEEDING_MIN_RATIO", 1.0)?,
            seeding_min_time_secs: parse_env("MONITOR_SEEDING_MIN_TIME_SECS", 24 * 3600)?,
            seeding_max_time_secs: parse_env("MONITOR_SEEDING_MAX_TIME_SECS", 7 * 24 * 3600)?,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stalled_threshold(&self) -> Duration {
        Duration::from_secs(self.stalled_threshold_secs)
    }

    pub fn disappeared_threshold(&self) -> Duration {
        Duration::from_secs(self.disappeared_threshold_secs)
    }

    pub fn seeding_min_time(&self) -> Duration {
        Duration::from_secs(self.seeding_min_time_secs)
    }

    pub fn seeding_max_time(&self) -> Duration {
        Duration::from_secs(self.seeding_max_time_secs)
    }
}

/// How often the blocklist cache refreshes its in-memory snapshot from the
/// durable store (spec §4.13's filter needs a synchronous read on the
/// indexer-manager's hot path, see `blocklist_filter`).
#[derive(Debug, Clone)]
pub struct BlocklistSettings {
    pub refresh_interval_secs: u64,
    /// Active entries a release group must accumulate before the group
    /// itself is treated as blocked, not just the individual release
    /// (spec §4.13/§6).
    pub auto_block_after: u32,
}

impl BlocklistSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            refresh_interval_secs: parse_env("BLOCKLIST_REFRESH_INTERVAL_SECS", 60)?,
            auto_block_after: parse_env("BLOCKLIST_AUTO_BLOCK_AFTER", 3)?,
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// The default quality profile applied to every search and grab, since
/// per-user profile management is an external collaborator (spec's
/// out-of-scope list).
#[derive(Debug, Clone)]
pub struct ProfileSettings {
    pub cutoff_tier: QualityTier,
}

impl ProfileSettings {
    fn from_env() -> Result<Self> {
        let cutoff_tier = match env::var("QUALITY_CUTOFF_TIER") {
            Ok(value) => parse_quality_tier(&value)?,
            Err(_) => QualityTier::P1080,
        };
        Ok(Self { cutoff_tier })
    }
}

/// Indexer adapters enabled for this deployment. Any subset may be active;
/// `main` skips adapters whose config is `None`.
#[derive(Debug, Clone, Default)]
pub struct IndexersConfig {
    pub prowlarr: Option<ProwlarrConfig>,
    pub torznab: Option<TorznabConfig>,
}

impl IndexersConfig {
    fn from_env() -> Result<Self> {
        let prowlarr = if parse_env("PROWLARR_ENABLED", false)? {
            Some(ProwlarrConfig {
                base_url: env_or("PROWLARR_BASE_URL", "http://localhost:9696"),
                api_key: env_or("PROWLARR_API_KEY", ""),
                indexer_id: env_or("PROWLARR_INDEXER_ID", "prowlarr"),
                priority: parse_env("PROWLARR_PRIORITY", 0)?,
                max_requests_per_minute: parse_env("PROWLARR_RATE_LIMIT", 60)?,
                user_agent: env_or("PROWLARR_USER_AGENT", "reelforge/0.1"),
                verify_ssl: parse_env("PROWLARR_VERIFY_SSL", true)?,
            })
        } else {
            None
        };

        let torznab = if parse_env("TORZNAB_ENABLED", false)? {
            let protocol = match env_or("TORZNAB_PROTOCOL", "torznab").to_lowercase().as_str() {
                "newznab" => TorznabProtocol::Newznab,
                _ => TorznabProtocol::Torznab,
            };
            Some(TorznabConfig {
                base_url: env_or("TORZNAB_BASE_URL", ""),
                api_key: env_or("TORZNAB_API_KEY", ""),
                indexer_id: env_or("TORZNAB_INDEXER_ID", "torznab"),
                priority: parse_env("TORZNAB_PRIORITY", 0)?,
                protocol,
            })
        } else {
            None
        };

        Ok(Self { prowlarr, torznab })
    }
}

/// Download-client adapters enabled for this deployment.
#[derive(Debug, Clone, Default)]
pub struct DownloadClientsConfig {
    pub qbittorrent: Option<QBittorrentConfig>,
    pub transmission: Option<TransmissionConfig>,
    pub sabnzbd: Option<SabnzbdConfig>,
    pub nzbget: Option<NzbgetConfig>,
}

impl DownloadClientsConfig {
    fn from_env() -> Result<Self> {
        let qbittorrent = if parse_env("QBITTORRENT_ENABLED", false)? {
            Some(QBittorrentConfig {
                client_id: env_or("QBITTORRENT_CLIENT_ID", "qbittorrent"),
                base_url: env_or("QBITTORRENT_BASE_URL", "http://localhost:8080"),
                username: env_or("QBITTORRENT_USERNAME", "admin"),
                password: env_or("QBITTORRENT_PASSWORD", ""),
            })
        } else {
            None
        };

        let transmission = if parse_env("TRANSMISSION_ENABLED", false)? {
            Some(TransmissionConfig {
                client_id: env_or("TRANSMISSION_CLIENT_ID", "transmission"),
                base_url: env_or("TRANSMISSION_BASE_URL", "http://localhost:9091"),
                username: env::var("TRANSMISSION_USERNAME").ok(),
                password: env::var("TRANSMISSION_PASSWORD").ok(),
            })
        } else {
            None
        };

        let sabnzbd = if parse_env("SABNZBD_ENABLED", false)? {
            Some(SabnzbdConfig {
                client_id: env_or("SABNZBD_CLIENT_ID", "sabnzbd"),
                base_url: env_or("SABNZBD_BASE_URL", "http://localhost:8080"),
                api_key: env_or("SABNZBD_API_KEY", ""),
            })
        } else {
            None
        };

        let nzbget = if parse_env("NZBGET_ENABLED", false)? {
            Some(NzbgetConfig {
                client_id: env_or("NZBGET_CLIENT_ID", "nzbget"),
                base_url: env_or("NZBGET_BASE_URL", "http://localhost:6789"),
                username: env_or("NZBGET_USERNAME", "nzbget"),
                password: env_or("NZBGET_PASSWORD", ""),
            })
        } else {
            None
        };

        Ok(Self { qbittorrent, transmission, sabnzbd, nzbget })
    }
}

/// Complete application configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub monitor: MonitorSettings,
    pub import: ImportSettings,
    pub blocklist: BlocklistSettings,
    pub profile: ProfileSettings,
    pub indexers: IndexersConfig,
    pub download_clients: DownloadClientsConfig,
    pub shutdown_grace_period_secs: u64,
}

impl AppConfig {
    /// Loads configuration from environment variables, applying defaults for
    /// anything unset. Does not read a `.env` file itself — call
    /// `dotenvy::dotenv()` before this if one should be honored.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database: DatabaseConfig::from_env(),
            monitor: MonitorSettings::from_env()?,
            import: ImportSettings::from_env()?,
            blocklist: BlocklistSettings::from_env()?,
            profile: ProfileSettings::from_env()?,
            indexers: IndexersConfig::from_env()?,
            download_clients: DownloadClientsConfig::from_env()?,
            shutdown_grace_period_secs: parse_env("SHUTDOWN_GRACE_PERIOD_SECS", 30)?,
        })
    }

    /// Rejects configurations that would otherwise fail at first use: no
    /// adapters enabled at all, or enabled adapters missing credentials.
    pub fn validate(&self) -> Result<()> {
        if self.database.database_url.is_empty() {
            return Err(CoreError::ConfigurationError {
                field: "database.database_url".to_string(),
                message: "DATABASE_URL cannot be empty".to_string(),
            });
        }

        if self.indexers.prowlarr.is_none() && self.indexers.torznab.is_none() {
            return Err(CoreError::ConfigurationError {
                field: "indexers".to_string(),
                message: "at least one indexer adapter must be enabled".to_string(),
            });
        }

        if let Some(prowlarr) = &self.indexers.prowlarr {
            if prowlarr.api_key.is_empty() {
                return Err(CoreError::ConfigurationError {
                    field: "PROWLARR_API_KEY".to_string(),
                    message: "Prowlarr is enabled but no API key was provided".to_string(),
                });
            }
        }

        if let Some(torznab) = &self.indexers.torznab {
            if torznab.base_url.is_empty() {
                return Err(CoreError::ConfigurationError {
                    field: "TORZNAB_BASE_URL".to_string(),
                    message: "Torznab is enabled but no base URL was provided".to_string(),
                });
            }
        }

        let dc = &self.download_clients;
        if dc.qbittorrent.is_none() && dc.transmission.is_none() && dc.sabnzbd.is_none() && dc.nzbget.is_none() {
            return Err(CoreError::ConfigurationError {
                field: "download_clients".to_string(),
                message: "at least one download client adapter must be enabled".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_quality_tiers() {
        assert_eq!(parse_quality_tier("1080p").unwrap(), QualityTier::P1080);
        assert_eq!(parse_quality_tier("4K").unwrap(), QualityTier::P2160);
    }

    #[test]
    fn rejects_unknown_quality_tier() {
        assert!(parse_quality_tier("potato").is_err());
    }

    #[test]
    fn validate_requires_at_least_one_indexer_and_download_client() {
        let config = AppConfig {
            database: DatabaseConfig::default(),
            monitor: MonitorSettings::from_env().unwrap(),
            import: ImportSettings {
                movies_library: PathBuf::from("/data/movies"),
                tv_library: PathBuf::from("/data/tv"),
                sample_threshold_bytes: 1024,
                split_multi_episode_files: false,
                keep_old_files: false,
                recycle_bin_path: None,
                import_timeout_secs: 3600,
            },
            blocklist: BlocklistSettings { refresh_interval_secs: 60, auto_block_after: 3 },
            profile: ProfileSettings { cutoff_tier: QualityTier::P1080 },
            indexers: IndexersConfig::default(),
            download_clients: DownloadClientsConfig::default(),
            shutdown_grace_period_secs: 30,
        };
        assert!(config.validate().is_err());
    }
}
