use castellum_core::Resource;
use sqlx::PgPool;
use uuid::Uuid;

use crate::convert::{thresholds_to_json, ResourceRow};
use crate::error::DbError;

/// Repository over the `resources` table.
pub struct ResourceRepo {
    pool: PgPool,
}

impl ResourceRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_scope_and_type(
        &self,
        scope_id: &str,
        asset_type: &str,
    ) -> Result<Option<Resource>, DbError> {
        let row = sqlx::query_as::<_, ResourceRow>(
            r#"SELECT * FROM resources WHERE scope_id = $1 AND asset_type = $2"#,
        )
        .bind(scope_id)
        .bind(asset_type)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ResourceRow::into_domain).transpose()
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Resource>, DbError> {
        let row = sqlx::query_as::<_, ResourceRow>(r#"SELECT * FROM resources WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ResourceRow::into_domain).transpose()
    }

    pub async fn list_by_scope(&self, scope_id: &str) -> Result<Vec<Resource>, DbError> {
        let rows = sqlx::query_as::<_, ResourceRow>(
            r#"SELECT * FROM resources WHERE scope_id = $1 ORDER BY asset_type"#,
        )
        .bind(scope_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ResourceRow::into_domain).collect()
    }

    /// Insert a brand-new resource or overwrite an existing one's policy
    /// fields in place (the write API's PUT semantics, spec §6). Scrape
    /// bookkeeping (`next_scrape_at`, error message) is left untouched on
    /// update so an in-flight scrape loop does not get reset.
    pub async fn upsert(&self, resource: &Resource) -> Result<(), DbError> {
        let logic = &resource.logic;
        let (size_step_percent, single_step) = match logic.step {
            castellum_core::StepRule::Percentage(pct) => (Some(pct), false),
            castellum_core::StepRule::Single => (None, true),
        };

        sqlx::query(
            r#"
            INSERT INTO resources (
                id, scope_id, domain_id, asset_type, config,
                low_thresholds, high_thresholds, critical_thresholds,
                low_delay_secs, high_delay_secs,
                size_step_percent, single_step,
                min_size, max_size, min_free_size, min_free_size_is_critical,
                low_requires_greenlight, high_requires_greenlight,
                next_scrape_at, seeded
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8,
                $9, $10,
                $11, $12,
                $13, $14, $15, $16,
                $17, $18,
                now(), $19
            )
            ON CONFLICT (scope_id, asset_type) DO UPDATE SET
                domain_id = EXCLUDED.domain_id,
                config = EXCLUDED.config,
                low_thresholds = EXCLUDED.low_thresholds,
                high_thresholds = EXCLUDED.high_thresholds,
                critical_thresholds = EXCLUDED.critical_thresholds,
                low_delay_secs = EXCLUDED.low_delay_secs,
                high_delay_secs = EXCLUDED.high_delay_secs,
                size_step_percent = EXCLUDED.size_step_percent,
                single_step = EXCLUDED.single_step,
                min_size = EXCLUDED.min_size,
                max_size = EXCLUDED.max_size,
                min_free_size = EXCLUDED.min_free_size,
                min_free_size_is_critical = EXCLUDED.min_free_size_is_critical,
                low_requires_greenlight = EXCLUDED.low_requires_greenlight,
                high_requires_greenlight = EXCLUDED.high_requires_greenlight
            "#,
        )
        .bind(resource.id)
        .bind(&resource.scope_id)
        .bind(&resource.domain_id)
        .bind(&resource.asset_type)
        .bind(&resource.config)
        .bind(thresholds_to_json(&logic.low_thresholds)?)
        .bind(thresholds_to_json(&logic.high_thresholds)?)
        .bind(thresholds_to_json(&logic.critical_thresholds)?)
        .bind(logic.low_delay_secs as i64)
        .bind(logic.high_delay_secs as i64)
        .bind(size_step_percent)
        .bind(single_step)
        .bind(logic.min_size.map(|v| v as i64))
        .bind(logic.max_size.map(|v| v as i64))
        .bind(logic.min_free_size.map(|v| v as i64))
        .bind(logic.min_free_size_is_critical)
        .bind(logic.low_requires_greenlight)
        .bind(logic.high_requires_greenlight)
        .bind(resource.seeded)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes the resource row; `ON DELETE CASCADE` removes its assets and
    /// their operations (spec §3 "Ownership & lifecycle").
    pub async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query(r#"DELETE FROM resources WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically selects the next due resource and pushes its
    /// `next_scrape_at` into the future, so no other resource-scraper
    /// worker can pick it up concurrently (spec §5 "Leasing").
    pub async fn lease_next_due(&self, lease_for_secs: i64) -> Result<Option<Resource>, DbError> {
        let row = sqlx::query_as::<_, ResourceRow>(
            r#"
            UPDATE resources SET next_scrape_at = now() + make_interval(secs => $1)
            WHERE id = (
                SELECT id FROM resources
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

        row.map(ResourceRow::into_domain).transpose()
    }

    /// Resources with a stored scrape error, for the admin
    /// `resource-scrape-errors` report (spec §6).
    pub async fn list_scrape_errors(&self) -> Result<Vec<Resource>, DbError> {
        let rows = sqlx::query_as::<_, ResourceRow>(
            r#"SELECT * FROM resources WHERE scrape_error_message IS NOT NULL ORDER BY id"#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ResourceRow::into_domain).collect()
    }

    pub async fn record_scrape_result(
        &self,
        id: Uuid,
        error_message: Option<&str>,
        duration_secs: f64,
        next_scrape_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE resources
            SET scrape_error_message = $2, scrape_duration_secs = $3, next_scrape_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error_message)
        .bind(duration_secs)
        .bind(next_scrape_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
