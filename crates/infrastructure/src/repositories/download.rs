//! PostgreSQL implementation of `TrackedDownloadStore` (C6, spec §3/§4.7).
//!
//! Grounded on the teacher's download-repository row-mapping shape, rebuilt
//! against the current `TrackedDownload` FSM model. `transition` is the sole
//! place that may change `state`: it re-validates against
//! `DownloadState::can_transition_to` inside the same row lock that performs
//! the update, so two callers racing to transition the same download can't
//! both win.

use crate::database::DatabasePool;
use async_trait::async_trait;
use reelforge_core::models::download::{ClientKind, DownloadEvent, DownloadState, TrackedDownload};
use reelforge_core::models::quality::MediaType;
use reelforge_core::models::release::ParsedRelease;
use reelforge_core::ports::{TrackedDownloadFilter, TrackedDownloadStore};
use reelforge_core::{CoreError, Result};
use sqlx::{Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

pub struct PostgresTrackedDownloadStore {
    pool: DatabasePool,
}

impl PostgresTrackedDownloadStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn parse_client_kind(s: &str) -> Result<ClientKind> {
    match s {
        "torrent" => Ok(ClientKind::Torrent),
        "usenet" => Ok(ClientKind::Usenet),
        other => Err(CoreError::DatabaseError {
            message: format!("unknown client_kind: {other}"),
        }),
    }
}

fn client_kind_str(kind: ClientKind) -> &'static str {
    match kind {
        ClientKind::Torrent => "torrent",
        ClientKind::Usenet => "usenet",
    }
}

fn parse_state(s: &str) -> Result<DownloadState> {
    match s {
        "queued" => Ok(DownloadState::Queued),
        "downloading" => Ok(DownloadState::Downloading),
        "paused" => Ok(DownloadState::Paused),
        "stalled" => Ok(DownloadState::Stalled),
        "completed" => Ok(DownloadState::Completed),
        "import_pending" => Ok(DownloadState::ImportPending),
        "importing" => Ok(DownloadState::Importing),
        "import_blocked" => Ok(DownloadState::ImportBlocked),
        "imported" => Ok(DownloadState::Imported),
        "failed" => Ok(DownloadState::Failed),
        "ignored" => Ok(DownloadState::Ignored),
        other => Err(CoreError::DatabaseError {
            message: format!("unknown download state: {other}"),
        }),
    }
}

fn parse_media_type(s: &str) -> Result<MediaType> {
    match s {
        "movie" => Ok(MediaType::Movie),
        "show" => Ok(MediaType::Show),
        "episode" => Ok(MediaType::Episode),
        other => Err(CoreError::DatabaseError {
            message: format!("unknown media_type: {other}"),
        }),
    }
}

fn media_type_str(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Movie => "movie",
        MediaType::Show => "show",
        MediaType::Episode => "episode",
    }
}

fn row_to_tracked_download(row: &sqlx::postgres::PgRow) -> Result<TrackedDownload> {
    let state: String = row.try_get("state")?;
    let previous_state: Option<String> = row.try_get("previous_state")?;
    let client_kind: String = row.try_get("client_kind")?;
    let media_type: Option<String> = row.try_get("media_type")?;
    let parsed_info: Option<serde_json::Value> = row.try_get("parsed_info")?;
    let warnings: Option<serde_json::Value> = row.try_get("warnings")?;
    let errors: Option<serde_json::Value> = row.try_get("errors")?;

    Ok(TrackedDownload {
        id: row.try_get("id")?,
        download_client_id: row.try_get("download_client_id")?,
        external_id: row.try_get("external_id")?,
        client_kind: parse_client_kind(&client_kind)?,
        request_id: row.try_get("request_id")?,
        media_id: row.try_get("media_id")?,
        media_type: media_type.map(|s| parse_media_type(&s)).transpose()?,
        indexer_id: row.try_get("indexer_id")?,
        state: parse_state(&state)?,
        previous_state: previous_state.map(|s| parse_state(&s)).transpose()?,
        state_changed_at: row.try_get("state_changed_at")?,
        title: row.try_get("title")?,
        parsed_info: parsed_info
            .map(|v| serde_json::from_value::<ParsedRelease>(v))
            .transpose()
            .map_err(|e| CoreError::SerializationError(e.to_string()))?,
        size: row.try_get("size")?,
        downloaded: row.try_get("downloaded")?,
        progress: row.try_get("progress")?,
        speed: row.try_get("speed")?,
        eta_seconds: row.try_get("eta_seconds")?,
        seeders: row.try_get("seeders")?,
        download_path: row.try_get("download_path")?,
        import_path: row.try_get("import_path")?,
        quality_summary: row.try_get("quality_summary")?,
        custom_format_score: row.try_get("custom_format_score")?,
        grabbed_at: row.try_get("grabbed_at")?,
        completed_at: row.try_get("completed_at")?,
        imported_at: row.try_get("imported_at")?,
        updated_at: row.try_get("updated_at")?,
        warnings: warnings
            .map(|v| serde_json::from_value(v))
            .transpose()
            .map_err(|e| CoreError::SerializationError(e.to_string()))?
            .unwrap_or_default(),
        errors: errors
            .map(|v| serde_json::from_value(v))
            .transpose()
            .map_err(|e| CoreError::SerializationError(e.to_string()))?
            .unwrap_or_default(),
        import_block_reason: row.try_get("import_block_reason")?,
        ratio: row.try_get("ratio")?,
        seeding_time_seconds: row.try_get("seeding_time_seconds")?,
        can_remove: row.try_get("can_remove")?,
    })
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> Result<DownloadEvent> {
    let from_state: Option<String> = row.try_get("from_state")?;
    let to_state: String = row.try_get("to_state")?;
    Ok(DownloadEvent {
        id: row.try_get("id")?,
        download_id: row.try_get("download_id")?,
        from_state: from_state.map(|s| parse_state(&s)).transpose()?,
        to_state: parse_state(&to_state)?,
        reason: row.try_get("reason")?,
        details: row.try_get("details")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl TrackedDownloadStore for PostgresTrackedDownloadStore {
    #[instrument(skip(self, td), fields(download_client_id = %td.download_client_id, external_id = %td.external_id))]
    async fn create(&self, td: &TrackedDownload) -> Result<TrackedDownload> {
        let parsed_info = td
            .parsed_info
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| CoreError::SerializationError(e.to_string()))?;
        let warnings = serde_json::to_value(&td.warnings).map_err(|e| CoreError::SerializationError(e.to_string()))?;
        let errors = serde_json::to_value(&td.errors).map_err(|e| CoreError::SerializationError(e.to_string()))?;

        let row = sqlx::query(
            r#"
            INSERT INTO tracked_downloads (
                id, download_client_id, external_id, client_kind, request_id, media_id, media_type, indexer_id,
                state, previous_state, state_changed_at, title, parsed_info,
                size, downloaded, progress, speed, eta_seconds, seeders,
                download_path, import_path, quality_summary, custom_format_score,
                grabbed_at, completed_at, imported_at, updated_at,
                warnings, errors, import_block_reason, ratio, seeding_time_seconds, can_remove
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
                $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33
            )
            RETURNING *
            "#,
        )
        .bind(td.id)
        .bind(&td.download_client_id)
        .bind(&td.external_id)
        .bind(client_kind_str(td.client_kind))
        .bind(td.request_id)
        .bind(td.media_id)
        .bind(td.media_type.map(media_type_str))
        .bind(&td.indexer_id)
        .bind(td.state.to_string())
        .bind(td.previous_state.map(|s| s.to_string()))
        .bind(td.state_changed_at)
        .bind(&td.title)
        .bind(parsed_info)
        .bind(td.size)
        .bind(td.downloaded)
        .bind(td.progress)
        .bind(td.speed)
        .bind(td.eta_seconds)
        .bind(td.seeders)
        .bind(&td.download_path)
        .bind(&td.import_path)
        .bind(&td.quality_summary)
        .bind(td.custom_format_score)
        .bind(td.grabbed_at)
        .bind(td.completed_at)
        .bind(td.imported_at)
        .bind(td.updated_at)
        .bind(warnings)
        .bind(errors)
        .bind(&td.import_block_reason)
        .bind(td.ratio)
        .bind(td.seeding_time_seconds)
        .bind(td.can_remove)
        .fetch_one(&self.pool)
        .await?;

        row_to_tracked_download(&row)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<TrackedDownload>> {
        let row = sqlx::query("SELECT * FROM tracked_downloads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_tracked_download(&r)).transpose()
    }

    #[instrument(skip(self))]
    async fn get_by_external(&self, download_client_id: &str, external_id: &str) -> Result<Option<TrackedDownload>> {
        let row = sqlx::query("SELECT * FROM tracked_downloads WHERE download_client_id = $1 AND external_id = $2")
            .bind(download_client_id)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_tracked_download(&r)).transpose()
    }

    #[instrument(skip(self))]
    async fn list_active(&self) -> Result<Vec<TrackedDownload>> {
        let rows = sqlx::query(
            "SELECT * FROM tracked_downloads WHERE state IN ('queued', 'downloading', 'paused', 'stalled') ORDER BY grabbed_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_tracked_download).collect()
    }

    #[instrument(skip(self))]
    async fn list_pending_import(&self) -> Result<Vec<TrackedDownload>> {
        let rows = sqlx::query("SELECT * FROM tracked_downloads WHERE state = 'import_pending' ORDER BY completed_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_tracked_download).collect()
    }

    #[instrument(skip(self))]
    async fn list_ready_to_remove(&self, min_ratio: f64, min_seed_time_s: i64, max_seed_time_s: i64) -> Result<Vec<TrackedDownload>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tracked_downloads
            WHERE state = 'imported'
              AND NOT can_remove
              AND (
                COALESCE(seeding_time_seconds, 0) >= $3
                OR (COALESCE(ratio, 0) >= $1 AND COALESCE(seeding_time_seconds, 0) >= $2)
              )
            "#,
        )
        .bind(min_ratio)
        .bind(min_seed_time_s)
        .bind(max_seed_time_s)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_tracked_download).collect()
    }

    #[instrument(skip(self, filter))]
    async fn list(&self, filter: &TrackedDownloadFilter) -> Result<Vec<TrackedDownload>> {
        let mut builder = sqlx::QueryBuilder::new("SELECT * FROM tracked_downloads");
        let mut first = true;

        if !filter.states.is_empty() {
            builder.push(" WHERE state = ANY(");
            let states: Vec<String> = filter.states.iter().map(|s| s.to_string()).collect();
            builder.push_bind(states);
            builder.push(")");
            first = false;
        }
        if let Some(media_id) = filter.media_id {
            builder.push(if first { " WHERE " } else { " AND " });
            builder.push("media_id = ").push_bind(media_id);
        }
        builder.push(" ORDER BY grabbed_at DESC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_tracked_download).collect()
    }

    #[instrument(skip(self, entry))]
    async fn update_progress(&self, id: Uuid, entry: &reelforge_core::models::download::DownloadEntry) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tracked_downloads SET
                size = $2, downloaded = $3, progress = $4, speed = $5, eta_seconds = $6,
                download_path = $7, ratio = $8, seeding_time_seconds = $9, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(entry.size)
        .bind(entry.downloaded)
        .bind(entry.progress)
        .bind(entry.speed)
        .bind(entry.eta_seconds)
        .bind(&entry.save_path)
        .bind(entry.ratio)
        .bind(entry.seeding_time_seconds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, details))]
    async fn transition(
        &self,
        id: Uuid,
        new_state: DownloadState,
        reason: Option<&str>,
        details: Option<serde_json::Value>,
    ) -> Result<TrackedDownload> {
        let mut tx: Transaction<'_, sqlx::Postgres> = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM tracked_downloads WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::NotFound { id: id.to_string() })?;
        let mut td = row_to_tracked_download(&row)?;

        let (from, to) = td.apply_transition(new_state, reason)?;

        sqlx::query(
            r#"
            UPDATE tracked_downloads SET
                state = $2, previous_state = $3, state_changed_at = $4, updated_at = $5,
                completed_at = $6, imported_at = $7, import_block_reason = $8
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(td.state.to_string())
        .bind(td.previous_state.map(|s| s.to_string()))
        .bind(td.state_changed_at)
        .bind(td.updated_at)
        .bind(td.completed_at)
        .bind(td.imported_at)
        .bind(&td.import_block_reason)
        .execute(&mut *tx)
        .await?;

        let event = DownloadEvent::new(id, Some(from), to, reason.map(str::to_string), details);
        sqlx::query(
            "INSERT INTO download_events (id, download_id, from_state, to_state, reason, details, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(event.id)
        .bind(event.download_id)
        .bind(event.from_state.map(|s| s.to_string()))
        .bind(event.to_state.to_string())
        .bind(&event.reason)
        .bind(&event.details)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(td)
    }

    #[instrument(skip(self))]
    async fn append_warning(&self, id: Uuid, warning: &str) -> Result<()> {
        sqlx::query("UPDATE tracked_downloads SET warnings = warnings || to_jsonb($2::text), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(warning)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn append_error(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query("UPDATE tracked_downloads SET errors = errors || to_jsonb($2::text), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn events_for(&self, download_id: Uuid) -> Result<Vec<DownloadEvent>> {
        let rows = sqlx::query("SELECT * FROM download_events WHERE download_id = $1 ORDER BY created_at ASC")
            .bind(download_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_event).collect()
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM tracked_downloads WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_kind_round_trips_through_string_encoding() {
        assert_eq!(parse_client_kind("torrent").unwrap(), ClientKind::Torrent);
        assert_eq!(parse_client_kind("usenet").unwrap(), ClientKind::Usenet);
        assert_eq!(client_kind_str(ClientKind::Torrent), "torrent");
        assert_eq!(client_kind_str(ClientKind::Usenet), "usenet");
        assert!(parse_client_kind("bogus").is_err());
    }

    #[test]
    fn state_round_trips_through_string_encoding() {
        for state in [
            DownloadState::Queued,
            DownloadState::Downloading,
            DownloadState::Paused,
            DownloadState::Stalled,
            DownloadState::Completed,
            DownloadState::ImportPending,
            DownloadState::Importing,
            DownloadState::ImportBlocked,
            DownloadState::Imported,
            DownloadState::Failed,
            DownloadState::Ignored,
        ] {
            assert_eq!(parse_state(&state.to_string()).unwrap(), state);
        }
    }

    #[test]
    fn media_type_round_trips_through_string_encoding() {
        for media_type in [MediaType::Movie, MediaType::Show, MediaType::Episode] {
            assert_eq!(parse_media_type(media_type_str(media_type)).unwrap(), media_type);
        }
    }
}
