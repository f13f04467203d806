use castellum_core::{FinishedOperation, Outcome, PendingOperation, Reason};
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use crate::convert::{
    outcome_str, reason_str, usage_to_json, FinishedOperationRow, PendingOperationRow,
};
use crate::error::DbError;

/// Repository over the `pending_operations` table — the single-row-per-asset
/// lifecycle state driven by the asset scraper and the resize executor
/// (spec §4.4, §4.5).
pub struct PendingOperationRepo {
    pool: PgPool,
}

impl PendingOperationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, asset_id: Uuid) -> Result<Option<PendingOperation>, DbError> {
        let row = sqlx::query_as::<_, PendingOperationRow>(
            r#"SELECT * FROM pending_operations WHERE asset_id = $1"#,
        )
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PendingOperationRow::into_domain).transpose()
    }

    pub async fn list_for_resource(
        &self,
        resource_id: Uuid,
    ) -> Result<Vec<PendingOperation>, DbError> {
        let rows = sqlx::query_as::<_, PendingOperationRow>(
            r#"
            SELECT p.* FROM pending_operations p
            JOIN assets a ON a.id = p.asset_id
            WHERE a.resource_id = $1
            ORDER BY p.created_at
            "#,
        )
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(PendingOperationRow::into_domain)
            .collect()
    }

    /// Insert a brand-new pending operation (transition table row "none ->
    /// contains r"). `critical` operations are born already confirmed, per
    /// `PendingOperation::new_created`.
    pub async fn insert(&self, op: &PendingOperation) -> Result<(), DbError> {
        let (confirmed_at, greenlit_at, greenlit_by_user) = match &op.state {
            castellum_core::PendingState::Created => (None, None, None),
            castellum_core::PendingState::Confirmed { confirmed_at } => {
                (Some(*confirmed_at), None, None)
            }
            castellum_core::PendingState::Greenlit {
                confirmed_at,
                greenlit_at,
                greenlit_by_user,
            } => (Some(*confirmed_at), Some(*greenlit_at), greenlit_by_user.clone()),
        };

        sqlx::query(
            r#"
            INSERT INTO pending_operations (
                asset_id, reason, old_size, new_size, usage, created_at,
                confirmed_at, greenlit_at, greenlit_by_user, errored_attempts, retry_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(op.asset_id)
        .bind(reason_str(op.reason))
        .bind(op.old_size as i64)
        .bind(op.new_size as i64)
        .bind(usage_to_json(&op.usage)?)
        .bind(op.created_at)
        .bind(confirmed_at)
        .bind(greenlit_at)
        .bind(greenlit_by_user)
        .bind(op.errored_attempts as i32)
        .bind(op.retry_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, asset_id: Uuid) -> Result<(), DbError> {
        sqlx::query(r#"DELETE FROM pending_operations WHERE asset_id = $1"#)
            .bind(asset_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_confirmed(
        &self,
        asset_id: Uuid,
        confirmed_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        sqlx::query(r#"UPDATE pending_operations SET confirmed_at = $2 WHERE asset_id = $1"#)
            .bind(asset_id)
            .bind(confirmed_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Sets `greenlit_at`/`greenlit_by_user`, either by the asset scraper
    /// auto-greenlighting an ungated reason, or by an operator's API call
    /// (which may backdate/future-date `greenlit_at` to schedule a
    /// maintenance window, spec §4.4).
    pub async fn set_greenlit(
        &self,
        asset_id: Uuid,
        greenlit_at: DateTime<Utc>,
        greenlit_by_user: Option<&str>,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"UPDATE pending_operations SET greenlit_at = $2, greenlit_by_user = $3 WHERE asset_id = $1"#,
        )
        .bind(asset_id)
        .bind(greenlit_at)
        .bind(greenlit_by_user)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically leases the next greenlit, due-for-retry pending op for
    /// the resize executor (spec §4.5, §5). The lease is the `retry_at`
    /// bump itself: a successful or failed outcome deletes the row, an
    /// `errored` outcome overwrites `retry_at` with the real backoff.
    pub async fn lease_next_greenlit(
        &self,
        lease_for_secs: i64,
    ) -> Result<Option<PendingOperation>, DbError> {
        let row = sqlx::query_as::<_, PendingOperationRow>(
            r#"
            UPDATE pending_operations SET retry_at = now() + make_interval(secs => $1)
            WHERE asset_id = (
                SELECT asset_id FROM pending_operations
                WHERE greenlit_at IS NOT NULL
                  AND greenlit_at <= now()
                  AND (retry_at IS NULL OR retry_at <= now())
                ORDER BY greenlit_at, asset_id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(lease_for_secs as f64)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PendingOperationRow::into_domain).transpose()
    }

    /// Cross-scope pending listing for `/v1/operations/pending` (spec §4.6,
    /// §6): every pending row whose asset's resource matches the given
    /// filters, all of which are optional.
    pub async fn list_cross_scope(
        &self,
        domain_id: Option<&str>,
        scope_id: Option<&str>,
        asset_type: Option<&str>,
    ) -> Result<Vec<PendingOperation>, DbError> {
        let mut qb: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            r#"
            SELECT p.* FROM pending_operations p
            JOIN assets a ON a.id = p.asset_id
            JOIN resources r ON r.id = a.resource_id
            WHERE true
            "#,
        );
        if let Some(domain_id) = domain_id {
            qb.push(" AND r.domain_id = ").push_bind(domain_id.to_string());
        }
        if let Some(scope_id) = scope_id {
            qb.push(" AND r.scope_id = ").push_bind(scope_id.to_string());
        }
        if let Some(asset_type) = asset_type {
            qb.push(" AND r.asset_type = ").push_bind(asset_type.to_string());
        }
        qb.push(" ORDER BY p.created_at");

        let rows = qb
            .build_query_as::<PendingOperationRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(PendingOperationRow::into_domain)
            .collect()
    }

    pub async fn record_errored_attempt(
        &self,
        asset_id: Uuid,
        errored_attempts: u32,
        retry_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"UPDATE pending_operations SET errored_attempts = $2, retry_at = $3 WHERE asset_id = $1"#,
        )
        .bind(asset_id)
        .bind(errored_attempts as i32)
        .bind(retry_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Repository over the append-only `finished_operations` log.
pub struct FinishedOperationRepo {
    pool: PgPool,
}

impl FinishedOperationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, op: &FinishedOperation) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO finished_operations (
                asset_id, reason, old_size, new_size, usage, created_at,
                confirmed_at, greenlit_at, greenlit_by_user, errored_attempts,
                outcome, finished_at, error_message
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(op.asset_id)
        .bind(reason_str(op.reason))
        .bind(op.old_size as i64)
        .bind(op.new_size as i64)
        .bind(usage_to_json(&op.usage)?)
        .bind(op.created_at)
        .bind(op.confirmed_at)
        .bind(op.greenlit_at)
        .bind(&op.greenlit_by_user)
        .bind(op.errored_attempts as i32)
        .bind(outcome_str(op.outcome))
        .bind(op.finished_at)
        .bind(&op.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn history_for_asset(
        &self,
        asset_id: Uuid,
    ) -> Result<Vec<FinishedOperation>, DbError> {
        let rows = sqlx::query_as::<_, FinishedOperationRow>(
            r#"SELECT * FROM finished_operations WHERE asset_id = $1 ORDER BY finished_at DESC"#,
        )
        .bind(asset_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(FinishedOperationRow::into_domain)
            .collect()
    }

    /// Marks the latest `errored` row for an asset as acknowledged by an
    /// operator (`error-resolved`, spec §6). Conflicts (409) if the latest
    /// op is not `errored` are the caller's responsibility to check first.
    pub async fn append_error_resolved(
        &self,
        latest_errored: &FinishedOperation,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let resolved = FinishedOperation {
            outcome: Outcome::ErrorResolved,
            finished_at: now,
            error_message: latest_errored.error_message.clone(),
            ..latest_errored.clone()
        };
        self.insert(&resolved).await
    }

    /// The shared shape behind all three operations-report queries
    /// (spec §4.6, §9): the most recent finished row per asset whose
    /// outcome is in `outcomes`, dropped if a later row exists that
    /// satisfies the override predicate. `always_override = true` means any
    /// later row of any outcome overrides (used for "recently failed");
    /// `always_override = false` means only a later row whose outcome is
    /// not `cancelled` overrides (used for "recently succeeded").
    async fn report(
        &self,
        resource_id: Option<Uuid>,
        domain_id: Option<&str>,
        scope_id: Option<&str>,
        asset_type: Option<&str>,
        outcomes: &[&str],
        always_override: bool,
        min_finished_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<FinishedOperation>, DbError> {
        let mut qb: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            r#"
            WITH candidates AS (
                SELECT DISTINCT ON (f.asset_id) f.*
                FROM finished_operations f
                JOIN assets a ON a.id = f.asset_id
                JOIN resources r ON r.id = a.resource_id
                WHERE f.outcome = ANY(
            "#,
        );
        qb.push_bind(outcomes.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        qb.push(")");

        if let Some(resource_id) = resource_id {
            qb.push(" AND r.id = ").push_bind(resource_id);
        }
        if let Some(domain_id) = domain_id {
            qb.push(" AND r.domain_id = ").push_bind(domain_id.to_string());
        }
        if let Some(scope_id) = scope_id {
            qb.push(" AND r.scope_id = ").push_bind(scope_id.to_string());
        }
        if let Some(asset_type) = asset_type {
            qb.push(" AND r.asset_type = ").push_bind(asset_type.to_string());
        }
        if let Some(min_finished_at) = min_finished_at {
            qb.push(" AND f.finished_at >= ").push_bind(min_finished_at);
        }

        qb.push(
            r#"
                ORDER BY f.asset_id, f.finished_at DESC
            ),
            overrides AS (
                SELECT c.asset_id, EXISTS (
                    SELECT 1 FROM finished_operations f2
                    WHERE f2.asset_id = c.asset_id
                      AND f2.finished_at > c.finished_at
                      AND (
            "#,
        );
        qb.push_bind(always_override);
        qb.push(" OR f2.outcome <> 'cancelled')) AS overridden FROM candidates c)
            SELECT c.* FROM candidates c JOIN overrides o ON o.asset_id = c.asset_id WHERE NOT o.overridden");

        let rows = qb
            .build_query_as::<FinishedOperationRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(FinishedOperationRow::into_domain)
            .collect()
    }

    /// "Recently failed" (spec §4.6): most recent `failed`/`errored` op per
    /// asset, overridden by any later op of any outcome. The caller must
    /// additionally re-check decision-engine eligibility per asset before
    /// presenting a row — this query alone is a freshness filter, not a
    /// re-run of the engine.
    pub async fn recently_failed(
        &self,
        resource_id: Option<Uuid>,
        domain_id: Option<&str>,
        scope_id: Option<&str>,
        asset_type: Option<&str>,
    ) -> Result<Vec<FinishedOperation>, DbError> {
        self.report(
            resource_id,
            domain_id,
            scope_id,
            asset_type,
            &["failed", "errored"],
            true,
            None,
        )
        .await
    }

    /// "Recently succeeded" (spec §4.6): most recent `succeeded` op per
    /// asset, overridden only by a later non-`cancelled` op, filtered to
    /// `finished_at >= now - max_age`.
    pub async fn recently_succeeded(
        &self,
        resource_id: Option<Uuid>,
        domain_id: Option<&str>,
        scope_id: Option<&str>,
        asset_type: Option<&str>,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<FinishedOperation>, DbError> {
        self.report(
            resource_id,
            domain_id,
            scope_id,
            asset_type,
            &["succeeded"],
            false,
            Some(now - max_age),
        )
        .await
    }
}

impl FinishedOperationRepo {
    /// Cluster-wide `errored` finished ops not yet overridden by a later
    /// outcome, for the admin `asset-resize-errors` report (spec §6).
    pub async fn admin_resize_errors(&self) -> Result<Vec<FinishedOperation>, DbError> {
        self.report(None, None, None, None, &["errored"], true, None).await
    }
}

pub fn reason_label(reason: Reason) -> &'static str {
    reason_str(reason)
}
