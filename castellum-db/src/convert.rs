//! Row <-> domain conversions. `castellum-core` has no knowledge of SQL or
//! JSON column encodings; every conversion happens here, at the edge, per
//! the workspace's crate-boundary rule.

use castellum_core::{Asset, AssetStatus, FinishedOperation, PendingOperation, PendingState,
    Outcome, Reason, Resource, ResourceLogic, StepRule, ThresholdSet, Usage};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::DbError;

pub fn usage_to_json(usage: &Usage) -> Result<serde_json::Value, DbError> {
    Ok(serde_json::to_value(usage)?)
}

pub fn usage_from_json(value: serde_json::Value) -> Result<Usage, DbError> {
    Ok(serde_json::from_value(value)?)
}

pub fn thresholds_to_json(thresholds: &ThresholdSet) -> Result<serde_json::Value, DbError> {
    Ok(serde_json::to_value(thresholds)?)
}

pub fn thresholds_from_json(value: serde_json::Value) -> Result<ThresholdSet, DbError> {
    Ok(serde_json::from_value(value)?)
}

fn outcome_to_str(outcome: Outcome) -> &'static str {
    outcome.as_str()
}

fn outcome_from_str(s: &str) -> Result<Outcome, DbError> {
    match s {
        "succeeded" => Ok(Outcome::Succeeded),
        "failed" => Ok(Outcome::Failed),
        "errored" => Ok(Outcome::Errored),
        "cancelled" => Ok(Outcome::Cancelled),
        "error-resolved" => Ok(Outcome::ErrorResolved),
        other => Err(DbError::InvalidEnumValue {
            column: "finished_operations.outcome",
            value: other.to_string(),
        }),
    }
}

#[derive(Debug, FromRow)]
pub struct ResourceRow {
    pub id: Uuid,
    pub scope_id: String,
    pub domain_id: String,
    pub asset_type: String,
    pub config: Option<serde_json::Value>,
    pub low_thresholds: serde_json::Value,
    pub high_thresholds: serde_json::Value,
    pub critical_thresholds: serde_json::Value,
    pub low_delay_secs: i64,
    pub high_delay_secs: i64,
    pub size_step_percent: Option<f64>,
    pub single_step: bool,
    pub min_size: Option<i64>,
    pub max_size: Option<i64>,
    pub min_free_size: Option<i64>,
    pub min_free_size_is_critical: bool,
    pub low_requires_greenlight: bool,
    pub high_requires_greenlight: bool,
    pub scrape_error_message: Option<String>,
    pub next_scrape_at: DateTime<Utc>,
    pub scrape_duration_secs: Option<f64>,
    pub seeded: bool,
}

impl ResourceRow {
    pub fn into_domain(self) -> Result<Resource, DbError> {
        let step = match (self.single_step, self.size_step_percent) {
            (true, _) => StepRule::Single,
            (false, Some(pct)) => StepRule::Percentage(pct),
            (false, None) => StepRule::Single,
        };
        Ok(Resource {
            id: self.id,
            scope_id: self.scope_id,
            domain_id: self.domain_id,
            asset_type: self.asset_type,
            config: self.config,
            logic: ResourceLogic {
                low_thresholds: thresholds_from_json(self.low_thresholds)?,
                high_thresholds: thresholds_from_json(self.high_thresholds)?,
                critical_thresholds: thresholds_from_json(self.critical_thresholds)?,
                low_delay_secs: self.low_delay_secs as u64,
                high_delay_secs: self.high_delay_secs as u64,
                step,
                min_size: self.min_size.map(|v| v as u64),
                max_size: self.max_size.map(|v| v as u64),
                min_free_size: self.min_free_size.map(|v| v as u64),
                min_free_size_is_critical: self.min_free_size_is_critical,
                low_requires_greenlight: self.low_requires_greenlight,
                high_requires_greenlight: self.high_requires_greenlight,
            },
            scrape_error_message: self.scrape_error_message,
            next_scrape_at: self.next_scrape_at,
            scrape_duration_secs: self.scrape_duration_secs,
            seeded: self.seeded,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct AssetRow {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub uuid: Uuid,
    pub size: i64,
    pub usage: serde_json::Value,
    pub strict_min: Option<i64>,
    pub strict_max: Option<i64>,
    pub expected_size: Option<i64>,
    pub resized_at: Option<DateTime<Utc>>,
    pub scrape_error_message: Option<String>,
    pub next_scrape_at: DateTime<Utc>,
    pub scrape_duration_secs: Option<f64>,
    pub never_scraped: bool,
}

impl AssetRow {
    pub fn into_domain(self) -> Result<Asset, DbError> {
        Ok(Asset {
            id: self.id,
            resource_id: self.resource_id,
            uuid: self.uuid,
            status: AssetStatus {
                size: self.size as u64,
                usage: usage_from_json(self.usage)?,
                strict_min: self.strict_min.map(|v| v as u64),
                strict_max: self.strict_max.map(|v| v as u64),
            },
            expected_size: self.expected_size.map(|v| v as u64),
            resized_at: self.resized_at,
            scrape_error_message: self.scrape_error_message,
            next_scrape_at: self.next_scrape_at,
            scrape_duration_secs: self.scrape_duration_secs,
            never_scraped: self.never_scraped,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct PendingOperationRow {
    pub asset_id: Uuid,
    pub reason: String,
    pub old_size: i64,
    pub new_size: i64,
    pub usage: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub greenlit_at: Option<DateTime<Utc>>,
    pub greenlit_by_user: Option<String>,
    pub errored_attempts: i32,
    pub retry_at: Option<DateTime<Utc>>,
}

impl PendingOperationRow {
    pub fn into_domain(self) -> Result<PendingOperation, DbError> {
        let state = match (self.confirmed_at, self.greenlit_at) {
            (None, _) => PendingState::Created,
            (Some(confirmed_at), None) => PendingState::Confirmed { confirmed_at },
            (Some(confirmed_at), Some(greenlit_at)) => PendingState::Greenlit {
                confirmed_at,
                greenlit_at,
                greenlit_by_user: self.greenlit_by_user,
            },
        };
        Ok(PendingOperation {
            asset_id: self.asset_id,
            reason: self.reason.parse().map_err(|_| DbError::InvalidEnumValue {
                column: "pending_operations.reason",
                value: self.reason.clone(),
            })?,
            old_size: self.old_size as u64,
            new_size: self.new_size as u64,
            usage: usage_from_json(self.usage)?,
            created_at: self.created_at,
            state,
            errored_attempts: self.errored_attempts as u32,
            retry_at: self.retry_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct FinishedOperationRow {
    pub asset_id: Uuid,
    pub reason: String,
    pub old_size: i64,
    pub new_size: i64,
    pub usage: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub greenlit_at: Option<DateTime<Utc>>,
    pub greenlit_by_user: Option<String>,
    pub errored_attempts: i32,
    pub outcome: String,
    pub finished_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl FinishedOperationRow {
    pub fn into_domain(self) -> Result<FinishedOperation, DbError> {
        Ok(FinishedOperation {
            asset_id: self.asset_id,
            reason: self.reason.parse().map_err(|_| DbError::InvalidEnumValue {
                column: "finished_operations.reason",
                value: self.reason.clone(),
            })?,
            old_size: self.old_size as u64,
            new_size: self.new_size as u64,
            usage: usage_from_json(self.usage)?,
            created_at: self.created_at,
            confirmed_at: self.confirmed_at,
            greenlit_at: self.greenlit_at,
            greenlit_by_user: self.greenlit_by_user,
            errored_attempts: self.errored_attempts as u32,
            outcome: outcome_from_str(&self.outcome)?,
            finished_at: self.finished_at,
            error_message: self.error_message,
        })
    }
}

pub fn outcome_str(outcome: Outcome) -> &'static str {
    outcome_to_str(outcome)
}

pub fn reason_str(reason: Reason) -> &'static str {
    reason.as_str()
}
