// castellum-core/src/model.rs
//
// Domain types shared by the decision engine and the pending-operation state
// machine. Nothing here talks to a database or the network — persistence
// adapters live in `castellum-db` and convert to/from these types at the
// edge (see the crate-boundary rule in the workspace root).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-metric usage or threshold values, keyed by the metric name a driver
/// declares (e.g. `"bytes_used"`, `"inodes_used"`). Internally there is only
/// ever this mapping — the `"singular"` JSON sentinel described in the
/// external API is a presentation-layer compatibility shim and never
/// appears here.
pub type Usage = BTreeMap<String, f64>;

/// One threshold band's per-metric percentages. A metric absent from the
/// map (or mapped to `None`) means that metric carries no threshold for
/// this band — replaces the source's `percent != 0` convention.
pub type ThresholdSet = BTreeMap<String, Option<f64>>;

/// How a resize target is derived once an action is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRule {
    /// Resize by a percentage of the current size (`size_step_percent`).
    Percentage(f64),
    /// Resize to just past the threshold that was crossed.
    Single,
}

/// Which threshold band drove an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Low,
    High,
    Critical,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::Low => "low",
            Reason::High => "high",
            Reason::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Reason {
    type Err = crate::error::CastellumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Reason::Low),
            "high" => Ok(Reason::High),
            "critical" => Ok(Reason::Critical),
            other => Err(crate::error::CastellumError::InvalidResourceLogic(format!(
                "unknown reason {other:?}"
            ))),
        }
    }
}

/// Outcome of a finished operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Succeeded,
    Failed,
    Errored,
    Cancelled,
    ErrorResolved,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Succeeded => "succeeded",
            Outcome::Failed => "failed",
            Outcome::Errored => "errored",
            Outcome::Cancelled => "cancelled",
            Outcome::ErrorResolved => "error-resolved",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The autoscaling policy for one (scope, asset-type) pair (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLogic {
    pub low_thresholds: ThresholdSet,
    pub high_thresholds: ThresholdSet,
    pub critical_thresholds: ThresholdSet,
    pub low_delay_secs: u64,
    pub high_delay_secs: u64,
    pub step: StepRule,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub min_free_size: Option<u64>,
    /// "flag making min_free_size upsizes critical" (spec §3).
    pub min_free_size_is_critical: bool,
    pub low_requires_greenlight: bool,
    pub high_requires_greenlight: bool,
}

impl ResourceLogic {
    /// The delay that must elapse between `created` and `confirmed` for a
    /// given reason. `critical` has no delay (spec §4.4).
    pub fn delay_for(&self, reason: Reason) -> chrono::Duration {
        match reason {
            Reason::Low => chrono::Duration::seconds(self.low_delay_secs as i64),
            Reason::High => chrono::Duration::seconds(self.high_delay_secs as i64),
            Reason::Critical => chrono::Duration::zero(),
        }
    }

    /// Whether a confirmed operation for `reason` must wait for an operator
    /// to greenlight it rather than being greenlit automatically. `critical`
    /// is never gated (spec §4.4 "design default: not gated").
    pub fn requires_greenlight(&self, reason: Reason) -> bool {
        match reason {
            Reason::Low => self.low_requires_greenlight,
            Reason::High => self.high_requires_greenlight,
            Reason::Critical => false,
        }
    }

    pub fn thresholds_for(&self, reason: Reason) -> &ThresholdSet {
        match reason {
            Reason::Low => &self.low_thresholds,
            Reason::High => &self.high_thresholds,
            Reason::Critical => &self.critical_thresholds,
        }
    }
}

/// An asset's current size/usage plus strict technical bounds, as reported
/// by a driver (spec §3, §4.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetStatus {
    pub size: u64,
    pub usage: Usage,
    pub strict_min: Option<u64>,
    pub strict_max: Option<u64>,
}

/// The autoscaling policy for one (scope, asset-type) pair, including its
/// enrollment and scrape bookkeeping (spec §3). `ResourceLogic` above holds
/// just the thresholds/step/bounds; `Resource` wraps it with identity and
/// scrape-loop state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub scope_id: String,
    pub domain_id: String,
    pub asset_type: String,
    pub config: Option<serde_json::Value>,
    pub logic: ResourceLogic,
    pub scrape_error_message: Option<String>,
    pub next_scrape_at: DateTime<Utc>,
    pub scrape_duration_secs: Option<f64>,
    /// Seeded resources come from static deployment config and cannot be
    /// modified through the write API (spec §6).
    pub seeded: bool,
}

/// One resizable thing inside a resource (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub uuid: Uuid,
    pub status: AssetStatus,
    pub expected_size: Option<u64>,
    pub resized_at: Option<DateTime<Utc>>,
    pub scrape_error_message: Option<String>,
    pub next_scrape_at: DateTime<Utc>,
    pub scrape_duration_secs: Option<f64>,
    pub never_scraped: bool,
}

/// The tagged-variant encoding of a pending operation's lifecycle phase
/// (spec §9 design note: prefer this over persisted nullable timestamps).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PendingState {
    Created,
    Confirmed {
        confirmed_at: DateTime<Utc>,
    },
    Greenlit {
        confirmed_at: DateTime<Utc>,
        greenlit_at: DateTime<Utc>,
        greenlit_by_user: Option<String>,
    },
}

impl PendingState {
    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            PendingState::Created => None,
            PendingState::Confirmed { confirmed_at } => Some(*confirmed_at),
            PendingState::Greenlit { confirmed_at, .. } => Some(*confirmed_at),
        }
    }

    pub fn greenlit_at(&self) -> Option<DateTime<Utc>> {
        match self {
            PendingState::Greenlit { greenlit_at, .. } => Some(*greenlit_at),
            _ => None,
        }
    }

    pub fn is_greenlit(&self) -> bool {
        matches!(self, PendingState::Greenlit { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            PendingState::Created => "created",
            PendingState::Confirmed { .. } => "confirmed",
            PendingState::Greenlit { .. } => "greenlit",
        }
    }
}

/// At most one per asset; destroyed by moving into a `FinishedOperation`
/// row (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub asset_id: Uuid,
    pub reason: Reason,
    pub old_size: u64,
    pub new_size: u64,
    pub usage: Usage,
    pub created_at: DateTime<Utc>,
    pub state: PendingState,
    pub errored_attempts: u32,
    pub retry_at: Option<DateTime<Utc>>,
}

impl PendingOperation {
    pub fn new_created(
        asset_id: Uuid,
        reason: Reason,
        old_size: u64,
        new_size: u64,
        usage: Usage,
        now: DateTime<Utc>,
    ) -> Self {
        // Critical operations require no confirmation delay, so they are
        // born already confirmed (spec §4.4, table row "none / contains r").
        let state = if reason == Reason::Critical {
            PendingState::Confirmed { confirmed_at: now }
        } else {
            PendingState::Created
        };
        Self {
            asset_id,
            reason,
            old_size,
            new_size,
            usage,
            created_at: now,
            state,
            errored_attempts: 0,
            retry_at: None,
        }
    }

    /// Whether enough time has elapsed since `created_at` for this pending
    /// operation to move from `Created` to `Confirmed`.
    pub fn delay_elapsed(&self, logic: &ResourceLogic, now: DateTime<Utc>) -> bool {
        now - self.created_at >= logic.delay_for(self.reason)
    }
}

/// Append-only log entry recording how an operation ended (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedOperation {
    pub asset_id: Uuid,
    pub reason: Reason,
    pub old_size: u64,
    pub new_size: u64,
    pub usage: Usage,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub greenlit_at: Option<DateTime<Utc>>,
    pub greenlit_by_user: Option<String>,
    pub errored_attempts: u32,
    pub outcome: Outcome,
    pub finished_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl FinishedOperation {
    /// Fold a pending operation into its finished form. This is the only
    /// way a `PendingOperation` value is consumed.
    pub fn from_pending(
        pending: PendingOperation,
        outcome: Outcome,
        finished_at: DateTime<Utc>,
        error_message: Option<String>,
    ) -> Self {
        Self {
            asset_id: pending.asset_id,
            reason: pending.reason,
            old_size: pending.old_size,
            new_size: pending.new_size,
            usage: pending.usage,
            created_at: pending.created_at,
            confirmed_at: pending.state.confirmed_at(),
            greenlit_at: pending.state.greenlit_at(),
            greenlit_by_user: match &pending.state {
                PendingState::Greenlit {
                    greenlit_by_user, ..
                } => greenlit_by_user.clone(),
                _ => None,
            },
            errored_attempts: pending.errored_attempts,
            outcome,
            finished_at,
            error_message,
        }
    }
}
