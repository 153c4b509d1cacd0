//! Logging `RequestNotifier` (spec §9): the request-lifecycle collaborator
//! itself is out of scope (external presentation layer), so the composition
//! root wires a tracing-based stand-in that records the same transitions a
//! real notifier would forward over HTTP or a message bus.

use async_trait::async_trait;
use reelforge_core::ports::RequestNotifier;
use reelforge_core::Result;
use tracing::info;
use uuid::Uuid;

pub struct LoggingRequestNotifier;

#[async_trait]
impl RequestNotifier for LoggingRequestNotifier {
    async fn mark_processing(&self, request_id: Uuid) -> Result<()> {
        info!(%request_id, status = "processing", "request notification");
        Ok(())
    }

    async fn mark_available(&self, request_id: Uuid) -> Result<()> {
        info!(%request_id, status = "available", "request notification");
        Ok(())
    }

    async fn mark_failed(&self, request_id: Uuid, reason: &str) -> Result<()> {
        info!(%request_id, status = "failed", %reason, "request notification");
        Ok(())
    }
}
