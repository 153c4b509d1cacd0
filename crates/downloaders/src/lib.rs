//! Download client adapters (C5): qBittorrent, Transmission, SABnzbd, NZBGet.
//!
//! Each adapter implements `core::ports::DownloadClientAdapter` and is wrapped
//! in a `CircuitBreaker` around every external call, per spec §5.

pub mod nzbget;
pub mod qbittorrent;
pub mod sabnzbd;
pub mod transmission;

pub use nzbget::{NzbgetClient, NzbgetConfig};
pub use qbittorrent::{QBittorrentClient, QBittorrentConfig};
pub use sabnzbd::{SabnzbdClient, SabnzbdConfig};
pub use transmission::{TransmissionClient, TransmissionConfig};
