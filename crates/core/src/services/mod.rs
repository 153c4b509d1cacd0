//! Orchestration services that drive the TrackedDownload FSM and the grab/import
//! lifecycle (C7, C11). Generic over the `core::ports` traits; concrete wiring
//! happens at the composition root.

pub mod acquisition;
pub mod monitor;
pub mod queue_stats;

pub use acquisition::AcquisitionService;
pub use monitor::{MonitorConfig, MonitoringLoop};
pub use queue_stats::QueueStats;
