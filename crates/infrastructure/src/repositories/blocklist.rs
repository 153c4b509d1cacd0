//! PostgreSQL implementation of the blocklist repository (C6, spec §4.6).

use reelforge_core::blocklist::{
    BlocklistEntry, BlocklistQuery, BlocklistRepository, BlocklistStatistics, FailureReason, FailureReasonStat,
    ImportFailureType,
};
use reelforge_core::{CoreError, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;
use uuid::Uuid;

pub struct PostgresBlocklistRepository {
    pool: PgPool,
}

impl PostgresBlocklistRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn failure_reason_to_db(&self, reason: &FailureReason) -> (String, Option<String>) {
        match reason {
            FailureReason::ImportFailed(detail) => ("ImportFailed".to_string(), Some(detail.to_string())),
            other => (format!("{other:?}"), None),
        }
    }

    fn failure_reason_from_db(&self, reason: &str, detail: Option<&str>) -> Result<FailureReason> {
        match reason {
            "ConnectionTimeout" => Ok(FailureReason::ConnectionTimeout),
            "AuthenticationFailed" => Ok(FailureReason::AuthenticationFailed),
            "RateLimited" => Ok(FailureReason::RateLimited),
            "ParseError" => Ok(FailureReason::ParseError),
            "DownloadStalled" => Ok(FailureReason::DownloadStalled),
            "HashMismatch" => Ok(FailureReason::HashMismatch),
            "ImportFailed" => {
                let import_type = match detail {
                    Some("FileMoveError") => ImportFailureType::FileMoveError,
                    Some("FileAlreadyExists") => ImportFailureType::FileAlreadyExists,
                    Some("DirectoryCreationFailed") => ImportFailureType::DirectoryCreationFailed,
                    Some("UnsupportedFormat") => ImportFailureType::UnsupportedFormat,
                    Some("QualityAnalysisFailed") => ImportFailureType::QualityAnalysisFailed,
                    Some("FilenameParseFailed") => ImportFailureType::FilenameParseFailed,
                    Some("MediaInfoFailed") => ImportFailureType::MediaInfoFailed,
                    other => {
                        return Err(CoreError::DatabaseError {
                            message: format!("unknown import failure detail: {other:?}"),
                        })
                    }
                };
                Ok(FailureReason::ImportFailed(import_type))
            }
            "DiskFull" => Ok(FailureReason::DiskFull),
            "PermissionDenied" => Ok(FailureReason::PermissionDenied),
            "ManuallyRejected" => Ok(FailureReason::ManuallyRejected),
            "QualityRejected" => Ok(FailureReason::QualityRejected),
            "SizeRejected" => Ok(FailureReason::SizeRejected),
            "ReleasePurged" => Ok(FailureReason::ReleasePurged),
            "NetworkError" => Ok(FailureReason::NetworkError),
            "ServerError" => Ok(FailureReason::ServerError),
            "CorruptedDownload" => Ok(FailureReason::CorruptedDownload),
            "DownloadClientError" => Ok(FailureReason::DownloadClientError),
            "ExclusionMatched" => Ok(FailureReason::ExclusionMatched),
            other => Err(CoreError::DatabaseError {
                message: format!("unknown failure reason: {other}"),
            }),
        }
    }

    fn row_to_entry(&self, row: &sqlx::postgres::PgRow) -> Result<BlocklistEntry> {
        let reason_str: String = row.try_get("reason")?;
        let reason_detail: Option<String> = row.try_get("reason_detail")?;
        let reason = self.failure_reason_from_db(&reason_str, reason_detail.as_deref())?;

        Ok(BlocklistEntry {
            id: row.try_get("id")?,
            release_id: row.try_get("release_id")?,
            indexer: row.try_get("indexer")?,
            reason,
            blocked_until: row.try_get("blocked_until")?,
            retry_count: row.try_get::<i32, _>("retry_count")? as u32,
            media_id: row.try_get("media_id")?,
            release_title: row.try_get("release_title")?,
            release_group: row.try_get("release_group")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            metadata: row.try_get("metadata")?,
        })
    }

    fn apply_filters<'a>(&self, builder: &mut QueryBuilder<'a, Postgres>, query: &'a BlocklistQuery) {
        let mut any = false;
        let mut push_and = |builder: &mut QueryBuilder<'a, Postgres>, first: &mut bool| {
            builder.push(if *first { " WHERE " } else { " AND " });
            *first = false;
        };

        if let Some(indexer) = &query.indexer {
            push_and(builder, &mut any);
            builder.push("indexer = ").push_bind(indexer);
        }
        if let Some(reason) = query.reason {
            let (reason_str, detail_str) = self.failure_reason_to_db(&reason);
            push_and(builder, &mut any);
            builder.push("reason = ").push_bind(reason_str);
            if let Some(detail) = detail_str {
                builder.push(" AND reason_detail = ").push_bind(detail);
            }
        }
        if let Some(media_id) = query.media_id {
            push_and(builder, &mut any);
            builder.push("media_id = ").push_bind(media_id);
        }
        if query.expired_only {
            push_and(builder, &mut any);
            builder.push("blocked_until <= NOW()");
        }
        if query.active_only {
            push_and(builder, &mut any);
            builder.push("blocked_until > NOW()");
        }
    }
}

#[async_trait]
impl BlocklistRepository for PostgresBlocklistRepository {
    #[instrument(skip(self, entry), fields(release_id = %entry.release_id, indexer = %entry.indexer))]
    async fn add_entry(&self, entry: &BlocklistEntry) -> Result<BlocklistEntry> {
        let (reason_str, reason_detail) = self.failure_reason_to_db(&entry.reason);

        let row = sqlx::query(
            r#"
            INSERT INTO blocklist (
                id, release_id, indexer, reason, reason_detail,
                blocked_until, retry_count, media_id, release_title, release_group,
                metadata, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (release_id, indexer)
            DO UPDATE SET
                reason = EXCLUDED.reason,
                reason_detail = EXCLUDED.reason_detail,
                blocked_until = EXCLUDED.blocked_until,
                retry_count = EXCLUDED.retry_count,
                release_group = EXCLUDED.release_group,
                metadata = EXCLUDED.metadata,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(entry.id)
        .bind(&entry.release_id)
        .bind(&entry.indexer)
        .bind(&reason_str)
        .bind(&reason_detail)
        .bind(entry.blocked_until)
        .bind(entry.retry_count as i32)
        .bind(entry.media_id)
        .bind(&entry.release_title)
        .bind(&entry.release_group)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .fetch_one(&self.pool)
        .await?;

        self.row_to_entry(&row)
    }

    #[instrument(skip(self), fields(release_id = %release_id, indexer = %indexer))]
    async fn is_blocked(&self, release_id: &str, indexer: &str) -> Result<bool> {
        let row = sqlx::query("SELECT blocked_until FROM blocklist WHERE release_id = $1 AND indexer = $2")
            .bind(release_id)
            .bind(indexer)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => {
                let blocked_until: chrono::DateTime<chrono::Utc> = row.try_get("blocked_until")?;
                blocked_until > chrono::Utc::now()
            }
            None => false,
        })
    }

    #[instrument(skip(self), fields(release_id = %release_id, indexer = %indexer))]
    async fn get_entry(&self, release_id: &str, indexer: &str) -> Result<Option<BlocklistEntry>> {
        let row = sqlx::query("SELECT * FROM blocklist WHERE release_id = $1 AND indexer = $2")
            .bind(release_id)
            .bind(indexer)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| self.row_to_entry(&r)).transpose()
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn get_entry_by_id(&self, id: Uuid) -> Result<Option<BlocklistEntry>> {
        let row = sqlx::query("SELECT * FROM blocklist WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| self.row_to_entry(&r)).transpose()
    }

    #[instrument(skip(self, query))]
    async fn search_entries(&self, query: &BlocklistQuery) -> Result<Vec<BlocklistEntry>> {
        let mut builder = QueryBuilder::new("SELECT * FROM blocklist");
        self.apply_filters(&mut builder, query);
        builder.push(" ORDER BY created_at DESC OFFSET ").push_bind(query.offset);
        builder.push(" LIMIT ").push_bind(query.limit);

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(|r| self.row_to_entry(r)).collect()
    }

    #[instrument(skip(self, query))]
    async fn count_entries(&self, query: &BlocklistQuery) -> Result<i64> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM blocklist");
        self.apply_filters(&mut builder, query);
        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }

    #[instrument(skip(self, entry), fields(id = %entry.id, release_id = %entry.release_id))]
    async fn update_entry(&self, entry: &BlocklistEntry) -> Result<BlocklistEntry> {
        let (reason_str, reason_detail) = self.failure_reason_to_db(&entry.reason);

        let row = sqlx::query(
            r#"
            UPDATE blocklist SET
                reason = $1, reason_detail = $2, blocked_until = $3,
                retry_count = $4, metadata = $5, updated_at = $6
            WHERE id = $7
            RETURNING *
            "#,
        )
        .bind(&reason_str)
        .bind(&reason_detail)
        .bind(entry.blocked_until)
        .bind(entry.retry_count as i32)
        .bind(&entry.metadata)
        .bind(entry.updated_at)
        .bind(entry.id)
        .fetch_one(&self.pool)
        .await?;

        self.row_to_entry(&row)
    }

    #[instrument(skip(self), fields(release_id = %release_id, indexer = %indexer))]
    async fn remove_entry(&self, release_id: &str, indexer: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM blocklist WHERE release_id = $1 AND indexer = $2")
            .bind(release_id)
            .bind(indexer)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn remove_entry_by_id(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM blocklist WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn get_expired_entries(&self, limit: Option<i32>) -> Result<Vec<BlocklistEntry>> {
        let limit = limit.unwrap_or(1000);
        let rows = sqlx::query("SELECT * FROM blocklist WHERE blocked_until <= NOW() ORDER BY blocked_until ASC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|r| self.row_to_entry(r)).collect()
    }

    #[instrument(skip(self))]
    async fn get_expiring_entries(&self, within_hours: i32, limit: Option<i32>) -> Result<Vec<BlocklistEntry>> {
        let limit = limit.unwrap_or(1000);
        let rows = sqlx::query(
            "SELECT * FROM blocklist WHERE blocked_until > NOW() AND blocked_until <= NOW() + ($1 || ' hours')::INTERVAL ORDER BY blocked_until ASC LIMIT $2",
        )
        .bind(within_hours)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|r| self.row_to_entry(r)).collect()
    }

    #[instrument(skip(self))]
    async fn cleanup_expired_entries(&self, older_than_days: i32) -> Result<i64> {
        let result = sqlx::query(
            "DELETE FROM blocklist WHERE blocked_until <= NOW() - ($1 || ' days')::INTERVAL AND reason NOT IN ('ManuallyRejected', 'QualityRejected', 'SizeRejected', 'ExclusionMatched')",
        )
        .bind(older_than_days)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as i64)
    }

    #[instrument(skip(self), fields(indexer = %indexer))]
    async fn cleanup_indexer_entries(&self, indexer: &str) -> Result<i64> {
        let result = sqlx::query("DELETE FROM blocklist WHERE indexer = $1")
            .bind(indexer)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() as i64)
    }

    #[instrument(skip(self))]
    async fn get_statistics(&self) -> Result<BlocklistStatistics> {
        let active_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blocklist WHERE blocked_until > NOW()")
            .fetch_one(&self.pool)
            .await?;
        let expired_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blocklist WHERE blocked_until <= NOW()")
            .fetch_one(&self.pool)
            .await?;
        let permanent_blocks: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM blocklist WHERE reason IN ('ManuallyRejected', 'QualityRejected', 'SizeRejected', 'ExclusionMatched')",
        )
        .fetch_one(&self.pool)
        .await?;
        let recent_additions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blocklist WHERE created_at > NOW() - INTERVAL '24 hours'")
            .fetch_one(&self.pool)
            .await?;

        let top_row = sqlx::query(
            "SELECT reason, reason_detail, COUNT(*) AS c FROM blocklist GROUP BY reason, reason_detail ORDER BY c DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        let top_failure_reason = match top_row {
            Some(row) => {
                let reason_str: String = row.try_get("reason")?;
                let detail: Option<String> = row.try_get("reason_detail")?;
                let count: i64 = row.try_get("c")?;
                Some((self.failure_reason_from_db(&reason_str, detail.as_deref())?, count))
            }
            None => None,
        };

        let top_indexer_row = sqlx::query("SELECT indexer, COUNT(*) AS c FROM blocklist GROUP BY indexer ORDER BY c DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        let top_failing_indexer = match top_indexer_row {
            Some(row) => {
                let indexer: String = row.try_get("indexer")?;
                let count: i64 = row.try_get("c")?;
                Some((indexer, count))
            }
            None => None,
        };

        Ok(BlocklistStatistics {
            active_entries,
            expired_entries,
            permanent_blocks,
            recent_additions,
            top_failure_reason,
            top_failing_indexer,
        })
    }

    #[instrument(skip(self))]
    async fn get_failure_reason_stats(&self) -> Result<Vec<FailureReasonStat>> {
        let rows = sqlx::query(
            r#"
            SELECT
                reason, reason_detail,
                COUNT(*) FILTER (WHERE blocked_until > NOW()) AS active_count,
                COUNT(*) FILTER (WHERE blocked_until <= NOW()) AS expired_count,
                AVG(retry_count) AS avg_retries
            FROM blocklist
            GROUP BY reason, reason_detail
            ORDER BY (COUNT(*) FILTER (WHERE blocked_until > NOW())) DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = Vec::with_capacity(rows.len());
        for row in rows {
            let reason_str: String = row.try_get("reason")?;
            let reason_detail: Option<String> = row.try_get("reason_detail")?;
            let reason = self.failure_reason_from_db(&reason_str, reason_detail.as_deref())?;

            stats.push(FailureReasonStat {
                reason,
                active_count: row.try_get("active_count")?,
                expired_count: row.try_get("expired_count")?,
                average_retries: row.try_get::<Option<f64>, _>("avg_retries")?.unwrap_or(0.0),
                retry_success_rate: None,
            });
        }

        Ok(stats)
    }

    #[instrument(skip(self), fields(media_id = %media_id))]
    async fn get_entries_for_media(&self, media_id: Uuid) -> Result<Vec<BlocklistEntry>> {
        let rows = sqlx::query("SELECT * FROM blocklist WHERE media_id = $1 ORDER BY created_at DESC")
            .bind(media_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|r| self.row_to_entry(r)).collect()
    }

    #[instrument(skip(self), fields(media_id = %media_id))]
    async fn remove_entries_for_media(&self, media_id: Uuid) -> Result<i64> {
        let result = sqlx::query("DELETE FROM blocklist WHERE media_id = $1")
            .bind(media_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() as i64)
    }

    #[instrument(skip(self), fields(release_id = %release_id))]
    async fn get_recent_failure(&self, release_id: &str) -> Result<Option<BlocklistEntry>> {
        let row = sqlx::query("SELECT * FROM blocklist WHERE release_id = $1 ORDER BY created_at DESC LIMIT 1")
            .bind(release_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| self.row_to_entry(&r)).transpose()
    }

    #[instrument(skip(self), fields(indexer = %indexer))]
    async fn check_indexer_health(&self, indexer: &str, hours_back: i32, failure_threshold: i32) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM blocklist WHERE indexer = $1 AND created_at > NOW() - ($2 || ' hours')::INTERVAL",
        )
        .bind(indexer)
        .bind(hours_back)
        .fetch_one(&self.pool)
        .await?;

        Ok(count < failure_threshold as i64)
    }
}
