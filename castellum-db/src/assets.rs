use std::collections::HashSet;

use castellum_core::{Asset, AssetStatus};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::convert::{usage_to_json, AssetRow};
use crate::error::DbError;

/// Repository over the `assets` table.
pub struct AssetRepo {
    pool: PgPool,
}

impl AssetRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_uuids_for_resource(
        &self,
        resource_id: Uuid,
    ) -> Result<HashSet<Uuid>, DbError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as(r#"SELECT uuid FROM assets WHERE resource_id = $1"#)
                .bind(resource_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(u,)| u).collect())
    }

    /// Insert newly-seen asset uuids with `never_scraped = true` and
    /// `next_scrape_at = unix(0)` so the asset scraper picks them up on its
    /// very next pass (spec §4.3).
    pub async fn insert_new(
        &self,
        resource_id: Uuid,
        uuid: Uuid,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO assets (id, resource_id, uuid, size, usage, next_scrape_at, never_scraped)
            VALUES ($1, $2, $3, 0, '{}'::jsonb, to_timestamp(0), true)
            ON CONFLICT (resource_id, uuid) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(resource_id)
        .bind(uuid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete assets of `resource_id` whose uuid is no longer in
    /// `still_present`; `ON DELETE CASCADE` removes their operations.
    pub async fn delete_vanished(
        &self,
        resource_id: Uuid,
        still_present: &[Uuid],
    ) -> Result<u64, DbError> {
        let result = sqlx::query(
            r#"DELETE FROM assets WHERE resource_id = $1 AND uuid <> ALL($2)"#,
        )
        .bind(resource_id)
        .bind(still_present)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Asset>, DbError> {
        let row = sqlx::query_as::<_, AssetRow>(r#"SELECT * FROM assets WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AssetRow::into_domain).transpose()
    }

    pub async fn find_by_uuid(
        &self,
        resource_id: Uuid,
        uuid: Uuid,
    ) -> Result<Option<Asset>, DbError> {
        let row = sqlx::query_as::<_, AssetRow>(
            r#"SELECT * FROM assets WHERE resource_id = $1 AND uuid = $2"#,
        )
        .bind(resource_id)
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AssetRow::into_domain).transpose()
    }

    pub async fn list_for_resource(&self, resource_id: Uuid) -> Result<Vec<Asset>, DbError> {
        let rows = sqlx::query_as::<_, AssetRow>(
            r#"SELECT * FROM assets WHERE resource_id = $1 ORDER BY uuid"#,
        )
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AssetRow::into_domain).collect()
    }

    /// Atomically selects the next due asset across all resources and
    /// pushes its `next_scrape_at` into the future (spec §5 "Leasing").
    pub async fn lease_next_due(&self, lease_for_secs: i64) -> Result<Option<Asset>, DbError> {
        let row = sqlx::query_as::<_, AssetRow>(
            r#"
            UPDATE assets SET next_scrape_at = now() + make_interval(secs => $1)
            WHERE id = (
                SELECT id FROM assets
                WHERE next_scrape_at <= now()
                ORDER BY next_scrape_at, id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(lease_for_secs as f64)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AssetRow::into_domain).transpose()
    }

    /// `expected_size`/`resized_at` are cleared once the reported `size`
    /// catches up to the expected value — a successful scrape is the only
    /// thing that retires the post-resize bookkeeping `mark_resized` sets
    /// (spec §4.5 "Future scrapes replace `expected_size` when the reported
    /// size catches up").
    pub async fn update_status(
        &self,
        id: Uuid,
        status: &AssetStatus,
        scrape_error_message: Option<&str>,
        duration_secs: f64,
        next_scrape_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE assets SET
                size = $2, usage = $3, strict_min = $4, strict_max = $5,
                scrape_error_message = $6, scrape_duration_secs = $7,
                next_scrape_at = $8, never_scraped = false,
                expected_size = CASE WHEN expected_size IS NOT NULL AND $2 >= expected_size
                                     THEN NULL ELSE expected_size END,
                resized_at = CASE WHEN expected_size IS NOT NULL AND $2 >= expected_size
                                  THEN NULL ELSE resized_at END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.size as i64)
        .bind(usage_to_json(&status.usage)?)
        .bind(status.strict_min.map(|v| v as i64))
        .bind(status.strict_max.map(|v| v as i64))
        .bind(scrape_error_message)
        .bind(duration_secs)
        .bind(next_scrape_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Assets with a stored scrape error, for the admin
    /// `asset-scrape-errors` report (spec §6).
    pub async fn list_scrape_errors(&self) -> Result<Vec<Asset>, DbError> {
        let rows = sqlx::query_as::<_, AssetRow>(
            r#"SELECT * FROM assets WHERE scrape_error_message IS NOT NULL ORDER BY id"#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AssetRow::into_domain).collect()
    }

    /// Records a resize intent: `expected_size` is replaced by the next
    /// scrape once the reported size catches up (spec §4.5).
    pub async fn mark_resized(
        &self,
        id: Uuid,
        new_size: u64,
        resized_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"UPDATE assets SET expected_size = $2, resized_at = $3 WHERE id = $1"#,
        )
        .bind(id)
        .bind(new_size as i64)
        .bind(resized_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
