//! Core domain models, ports, and orchestration services for the media
//! acquisition pipeline.
//!
//! This crate is dependency-free with respect to the rest of the workspace:
//! indexers, downloaders, import, and infrastructure all depend on it and
//! implement the traits in [`ports`]. It never depends on them.

pub mod blocklist;
pub mod circuit_breaker;
pub mod error;
pub mod models;
pub mod ports;
pub mod progress;
pub mod retry;
pub mod services;

pub use error::*;
pub use models::*;
pub use ports::*;
pub use progress::*;
pub use services::*;
// Selective re-exports to avoid naming conflicts
pub use blocklist::*;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerMetrics};
pub use retry::{retry_with_backoff, RetryConfig, RetryPolicy};
