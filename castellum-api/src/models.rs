// castellum-api/src/models.rs
//
// JSON request/response shapes for the read/write API (spec §6). The
// distilled spec treats exact wire shape as an external collaborator's
// concern and only prescribes routes, status codes and the `"singular"`
// usage compatibility shim (spec §9 design note) — everything below is
// this deployment's concrete rendering of that contract, kept separate
// from the domain types in `castellum-core` the way the teacher keeps
// `shared::Contract` separate from its database row types.

use std::collections::BTreeMap;

use castellum_core::{
    Asset, FinishedOperation, PendingOperation, PendingState, Reason, Resource, StepRule,
    ThresholdSet,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Renders a metric->value map as a bare number when its only key is the
/// `"singular"` sentinel, otherwise as a plain object (spec §9: "The
/// sentinel `singular` usage metric exists purely for backward-compatible
/// JSON; internally there is only the mapping metric -> float").
pub fn metric_map_to_json(map: &BTreeMap<String, f64>) -> Value {
    if let Some(value) = singular_value(map) {
        return serde_json::json!(value);
    }
    serde_json::to_value(map).unwrap_or(Value::Null)
}

fn singular_value(map: &BTreeMap<String, f64>) -> Option<f64> {
    if map.len() == 1 {
        map.get("singular").copied()
    } else {
        None
    }
}

pub fn metric_map_from_json(value: Value) -> Result<BTreeMap<String, f64>, String> {
    match value {
        Value::Number(n) => {
            let v = n.as_f64().ok_or_else(|| "not a finite number".to_string())?;
            let mut map = BTreeMap::new();
            map.insert("singular".to_string(), v);
            Ok(map)
        }
        Value::Object(_) => serde_json::from_value(value).map_err(|e| e.to_string()),
        other => Err(format!("expected a number or object, got {other}")),
    }
}

fn optional_metric_map_to_json(map: &ThresholdSet) -> Value {
    let present: BTreeMap<String, f64> = map
        .iter()
        .filter_map(|(k, v)| v.map(|v| (k.clone(), v)))
        .collect();
    metric_map_to_json(&present)
}

fn optional_metric_map_from_json(value: Value, metrics: &[String]) -> Result<ThresholdSet, String> {
    let present = metric_map_from_json(value)?;
    let mut out = ThresholdSet::new();
    for metric in metrics {
        out.insert(metric.clone(), present.get(metric).copied());
    }
    // A single-metric driver's config may use "singular" directly even
    // though the driver's own metric is named, e.g. "bytes_used" — fold it
    // onto the sole declared metric rather than dropping it.
    if let Some(v) = present.get("singular") {
        if let Some(only) = metrics.first() {
            if metrics.len() == 1 {
                out.insert(only.clone(), Some(*v));
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Serialize)]
pub struct ResourceJson {
    pub id: Uuid,
    pub scope_id: String,
    pub domain_id: String,
    pub asset_type: String,
    pub config: Option<Value>,
    pub low_threshold_percent: Value,
    pub high_threshold_percent: Value,
    pub critical_threshold_percent: Value,
    pub low_delay_seconds: u64,
    pub high_delay_seconds: u64,
    pub size_step_percent: Option<f64>,
    pub single_step: bool,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub min_free_size: Option<u64>,
    pub min_free_size_is_critical: bool,
    pub low_requires_greenlight: bool,
    pub high_requires_greenlight: bool,
    pub scrape_error_message: Option<String>,
    pub next_scrape_at: chrono::DateTime<chrono::Utc>,
    pub scrape_duration_secs: Option<f64>,
    pub seeded: bool,
}

impl From<&Resource> for ResourceJson {
    fn from(r: &Resource) -> Self {
        let (size_step_percent, single_step) = match r.logic.step {
            StepRule::Percentage(pct) => (Some(pct), false),
            StepRule::Single => (None, true),
        };
        Self {
            id: r.id,
            scope_id: r.scope_id.clone(),
            domain_id: r.domain_id.clone(),
            asset_type: r.asset_type.clone(),
            config: r.config.clone(),
            low_threshold_percent: optional_metric_map_to_json(&r.logic.low_thresholds),
            high_threshold_percent: optional_metric_map_to_json(&r.logic.high_thresholds),
            critical_threshold_percent: optional_metric_map_to_json(&r.logic.critical_thresholds),
            low_delay_seconds: r.logic.low_delay_secs,
            high_delay_seconds: r.logic.high_delay_secs,
            size_step_percent,
            single_step,
            min_size: r.logic.min_size,
            max_size: r.logic.max_size,
            min_free_size: r.logic.min_free_size,
            min_free_size_is_critical: r.logic.min_free_size_is_critical,
            low_requires_greenlight: r.logic.low_requires_greenlight,
            high_requires_greenlight: r.logic.high_requires_greenlight,
            scrape_error_message: r.scrape_error_message.clone(),
            next_scrape_at: r.next_scrape_at,
            scrape_duration_secs: r.scrape_duration_secs,
            seeded: r.seeded,
        }
    }
}

/// Write-API body for `PUT .../resources/{asset_type}` (spec §6). Unknown
/// fields are rejected by `#[serde(deny_unknown_fields)]` per "PUT on a
/// resource rejects unknown fields".
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourcePutBody {
    #[serde(default)]
    pub config: Option<Value>,
    #[serde(default)]
    pub low_threshold_percent: Option<Value>,
    #[serde(default)]
    pub high_threshold_percent: Option<Value>,
    #[serde(default)]
    pub critical_threshold_percent: Option<Value>,
    #[serde(default)]
    pub low_delay_seconds: u64,
    #[serde(default)]
    pub high_delay_seconds: u64,
    #[serde(default)]
    pub size_step_percent: Option<f64>,
    #[serde(default)]
    pub single_step: bool,
    #[serde(default)]
    pub min_size: Option<u64>,
    #[serde(default)]
    pub max_size: Option<u64>,
    #[serde(default)]
    pub min_free_size: Option<u64>,
    #[serde(default)]
    pub min_free_size_is_critical: bool,
    #[serde(default)]
    pub low_requires_greenlight: bool,
    #[serde(default)]
    pub high_requires_greenlight: bool,
}

impl ResourcePutBody {
    /// Decodes the three threshold maps against the driver's declared
    /// metric set, applying the `"singular"` shim per metric.
    pub fn thresholds(&self, metrics: &[String]) -> Result<(ThresholdSet, ThresholdSet, ThresholdSet), String> {
        let low = match &self.low_threshold_percent {
            Some(v) => optional_metric_map_from_json(v.clone(), metrics)?,
            None => ThresholdSet::new(),
        };
        let high = match &self.high_threshold_percent {
            Some(v) => optional_metric_map_from_json(v.clone(), metrics)?,
            None => ThresholdSet::new(),
        };
        let critical = match &self.critical_threshold_percent {
            Some(v) => optional_metric_map_from_json(v.clone(), metrics)?,
            None => ThresholdSet::new(),
        };
        Ok((low, high, critical))
    }

    pub fn step(&self) -> StepRule {
        if self.single_step {
            StepRule::Single
        } else {
            StepRule::Percentage(self.size_step_percent.unwrap_or(0.0))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AssetJson {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub uuid: Uuid,
    pub size: u64,
    pub usage: Value,
    pub strict_min: Option<u64>,
    pub strict_max: Option<u64>,
    pub expected_size: Option<u64>,
    pub resized_at: Option<chrono::DateTime<chrono::Utc>>,
    pub scrape_error_message: Option<String>,
    pub next_scrape_at: chrono::DateTime<chrono::Utc>,
    pub scrape_duration_secs: Option<f64>,
    pub never_scraped: bool,
}

impl From<&Asset> for AssetJson {
    fn from(a: &Asset) -> Self {
        Self {
            id: a.id,
            resource_id: a.resource_id,
            uuid: a.uuid,
            size: a.status.size,
            usage: metric_map_to_json(&a.status.usage),
            strict_min: a.status.strict_min,
            strict_max: a.status.strict_max,
            expected_size: a.expected_size,
            resized_at: a.resized_at,
            scrape_error_message: a.scrape_error_message.clone(),
            next_scrape_at: a.next_scrape_at,
            scrape_duration_secs: a.scrape_duration_secs,
            never_scraped: a.never_scraped,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PendingOperationJson {
    pub asset_id: Uuid,
    pub reason: Reason,
    pub old_size: u64,
    pub new_size: u64,
    pub usage: Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub state: PendingState,
    pub errored_attempts: u32,
    pub retry_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&PendingOperation> for PendingOperationJson {
    fn from(op: &PendingOperation) -> Self {
        Self {
            asset_id: op.asset_id,
            reason: op.reason,
            old_size: op.old_size,
            new_size: op.new_size,
            usage: metric_map_to_json(&op.usage),
            created_at: op.created_at,
            state: op.state.clone(),
            errored_attempts: op.errored_attempts,
            retry_at: op.retry_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FinishedOperationJson {
    pub asset_id: Uuid,
    pub reason: Reason,
    pub old_size: u64,
    pub new_size: u64,
    pub usage: Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub confirmed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub greenlit_at: Option<chrono::DateTime<chrono::Utc>>,
    pub greenlit_by_user: Option<String>,
    pub errored_attempts: u32,
    pub outcome: castellum_core::Outcome,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub error_message: Option<String>,
}

impl From<&FinishedOperation> for FinishedOperationJson {
    fn from(op: &FinishedOperation) -> Self {
        Self {
            asset_id: op.asset_id,
            reason: op.reason,
            old_size: op.old_size,
            new_size: op.new_size,
            usage: metric_map_to_json(&op.usage),
            created_at: op.created_at,
            confirmed_at: op.confirmed_at,
            greenlit_at: op.greenlit_at,
            greenlit_by_user: op.greenlit_by_user.clone(),
            errored_attempts: op.errored_attempts,
            outcome: op.outcome,
            finished_at: op.finished_at,
            error_message: op.error_message.clone(),
        }
    }
}

/// Body for the operator-greenlight endpoint: may backdate or future-date
/// `greenlit_at` to schedule a maintenance window (spec §4.4).
#[derive(Debug, Deserialize)]
pub struct GreenlightBody {
    pub greenlit_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MaxAgeQuery {
    #[serde(rename = "max-age")]
    pub max_age: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CrossScopeQuery {
    pub domain: Option<String>,
    pub project: Option<String>,
    #[serde(rename = "asset-type")]
    pub asset_type: Option<String>,
    #[serde(rename = "max-age")]
    pub max_age: Option<String>,
}

/// Parses the `^(0|[1-9][0-9]*)(m|h|d)$` grammar (spec §4.6), default 24h.
pub fn parse_max_age(raw: Option<&str>) -> Result<chrono::Duration, String> {
    let raw = match raw {
        None => return Ok(chrono::Duration::hours(24)),
        Some(raw) => raw,
    };
    let re = regex::Regex::new(r"^(0|[1-9][0-9]*)(m|h|d)$").expect("valid regex");
    let caps = re
        .captures(raw)
        .ok_or_else(|| format!("invalid max-age {raw:?}, expected ^(0|[1-9][0-9]*)(m|h|d)$"))?;
    let n: i64 = caps[1].parse().map_err(|_| "max-age number overflow".to_string())?;
    Ok(match &caps[2] {
        "m" => chrono::Duration::minutes(n),
        "h" => chrono::Duration::hours(n),
        "d" => chrono::Duration::days(n),
        _ => unreachable!(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singular_map_renders_as_bare_number() {
        let mut map = BTreeMap::new();
        map.insert("singular".to_string(), 42.5);
        assert_eq!(metric_map_to_json(&map), serde_json::json!(42.5));
    }

    #[test]
    fn multi_metric_map_renders_as_object() {
        let mut map = BTreeMap::new();
        map.insert("bytes_used".to_string(), 1.0);
        map.insert("inodes_used".to_string(), 2.0);
        assert_eq!(
            metric_map_to_json(&map),
            serde_json::json!({"bytes_used": 1.0, "inodes_used": 2.0})
        );
    }

    #[test]
    fn bare_number_round_trips_through_singular_sentinel() {
        let decoded = metric_map_from_json(serde_json::json!(7.0)).unwrap();
        assert_eq!(decoded.get("singular"), Some(&7.0));
        assert_eq!(metric_map_to_json(&decoded), serde_json::json!(7.0));
    }

    #[test]
    fn max_age_grammar_rejects_malformed_input() {
        assert!(parse_max_age(Some("5x")).is_err());
        assert!(parse_max_age(Some("05h")).is_err());
        assert_eq!(parse_max_age(Some("0m")).unwrap(), chrono::Duration::minutes(0));
        assert_eq!(parse_max_age(None).unwrap(), chrono::Duration::hours(24));
    }
}
