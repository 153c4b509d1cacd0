//! PostgreSQL implementation of `QualityStatusStore` (C12, spec §4.12):
//! the currently-held quality for a piece of media, used by the scoring
//! pass (C2) to decide whether a candidate release is an upgrade.
//!
//! `MediaQualityStatus` is stored as a single JSONB document keyed by
//! `(media_id, media_type)` rather than one column per field: its enums
//! (`Resolution`, `Source`, `Hdr`, `AudioFormat`) already round-trip
//! through serde, and the row never needs to be queried by those fields
//! directly.

use crate::database::DatabasePool;
use async_trait::async_trait;
use reelforge_core::models::quality::{MediaQualityStatus, MediaType};
use reelforge_core::ports::QualityStatusStore;
use reelforge_core::{CoreError, Result};
use tracing::instrument;
use uuid::Uuid;

pub struct PostgresQualityStatusStore {
    pool: DatabasePool,
}

impl PostgresQualityStatusStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn media_type_str(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Movie => "movie",
        MediaType::Show => "show",
        MediaType::Episode => "episode",
    }
}

#[async_trait]
impl QualityStatusStore for PostgresQualityStatusStore {
    #[instrument(skip(self))]
    async fn get(&self, media_id: Uuid, media_type: MediaType) -> Result<Option<MediaQualityStatus>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT data FROM media_quality_status WHERE media_id = $1 AND media_type = $2")
                .bind(media_id)
                .bind(media_type_str(media_type))
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(data,)| serde_json::from_value(data).map_err(|e| CoreError::SerializationError(e.to_string())))
            .transpose()
    }

    #[instrument(skip(self, status))]
    async fn upsert(&self, status: &MediaQualityStatus) -> Result<()> {
        let data = serde_json::to_value(status).map_err(|e| CoreError::SerializationError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO media_quality_status (media_id, media_type, data, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (media_id, media_type)
            DO UPDATE SET data = EXCLUDED.data, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(status.media_id)
        .bind(media_type_str(status.media_type))
        .bind(data)
        .bind(status.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_str_matches_snake_case_serde_rename() {
        assert_eq!(media_type_str(MediaType::Movie), "movie");
        assert_eq!(media_type_str(MediaType::Show), "show");
        assert_eq!(media_type_str(MediaType::Episode), "episode");
    }
}
