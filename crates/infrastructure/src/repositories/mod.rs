//! PostgreSQL implementations of the `core::ports` store traits.

pub mod blocklist;
pub mod download;
pub mod quality_status;

pub use blocklist::PostgresBlocklistRepository;
pub use download::PostgresTrackedDownloadStore;
pub use quality_status::PostgresQualityStatusStore;
