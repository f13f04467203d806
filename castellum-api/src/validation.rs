// castellum-api/src/validation.rs
//
// PUT-body validation for resources (spec §6 "Validation"): every rule
// violation is collected rather than returning on the first failure, so
// the 422 body lists everything wrong in one round trip.

use castellum_core::ResourceLogic;
use castellum_drivers::DriverInfo;

use crate::models::ResourcePutBody;

pub fn validate_resource_put(
    body: &ResourcePutBody,
    driver: &DriverInfo,
) -> Result<ResourceLogic, Vec<String>> {
    let mut errors = Vec::new();

    let (low, high, critical) = match body.thresholds(&driver.usage_metrics) {
        Ok(t) => t,
        Err(e) => {
            errors.push(format!("invalid threshold payload: {e}"));
            (Default::default(), Default::default(), Default::default())
        }
    };

    let any_configured = driver.usage_metrics.iter().any(|m| {
        low.get(m).copied().flatten().is_some()
            || high.get(m).copied().flatten().is_some()
            || critical.get(m).copied().flatten().is_some()
    });
    if !any_configured {
        errors.push("at least one threshold must be configured".to_string());
    }

    for metric in &driver.usage_metrics {
        for (label, set) in [("low", &low), ("high", &high), ("critical", &critical)] {
            if let Some(Some(pct)) = set.get(metric) {
                if !(0.0..=100.0).contains(pct) {
                    errors.push(format!("{label} threshold for {metric} must be in [0, 100], got {pct}"));
                }
            }
        }

        let l = low.get(metric).copied().flatten();
        let h = high.get(metric).copied().flatten();
        let c = critical.get(metric).copied().flatten();

        if let (Some(l), Some(h)) = (l, h) {
            if !(l < h) {
                errors.push(format!("low threshold must be less than high for {metric} ({l} >= {h})"));
            }
        }
        if let (Some(l), Some(c)) = (l, c) {
            if !(l < c) {
                errors.push(format!("low threshold must be less than critical for {metric} ({l} >= {c})"));
            }
        }
        if let (Some(h), Some(c)) = (h, c) {
            if !(h < c) {
                errors.push(format!("high threshold must be less than critical for {metric} ({h} >= {c})"));
            }
        }
    }

    let step_configured = body.size_step_percent.map(|p| p > 0.0).unwrap_or(false);
    if step_configured == body.single_step {
        errors.push("exactly one of size_step_percent > 0 or single_step = true is required".to_string());
    }

    if let (Some(min), Some(max)) = (body.min_size, body.max_size) {
        if min > max {
            errors.push(format!("min_size must be <= max_size ({min} > {max})"));
        }
    }

    if driver.max_asset_size.is_some() && body.max_size.is_none() {
        errors.push(format!(
            "max_size must be configured for asset-type {} (driver enforces a max_asset_size cap)",
            driver.asset_type
        ));
    }

    if body.single_step && !driver.reports_absolute_usage {
        errors.push("single_step requires the driver to report absolute usage".to_string());
    }
    if body.min_free_size.is_some() && !driver.reports_absolute_usage {
        errors.push("min_free_size requires the driver to report absolute usage".to_string());
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ResourceLogic {
        low_thresholds: low,
        high_thresholds: high,
        critical_thresholds: critical,
        low_delay_secs: body.low_delay_seconds,
        high_delay_secs: body.high_delay_seconds,
        step: body.step(),
        min_size: body.min_size,
        max_size: body.max_size,
        min_free_size: body.min_free_size,
        min_free_size_is_critical: body.min_free_size_is_critical,
        low_requires_greenlight: body.low_requires_greenlight,
        high_requires_greenlight: body.high_requires_greenlight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn driver() -> DriverInfo {
        DriverInfo {
            asset_type: "manila-shares".to_string(),
            usage_metrics: vec!["bytes_used".to_string()],
            reports_absolute_usage: true,
            max_asset_size: None,
            conflicts_with: vec![],
        }
    }

    fn body_with(high_pct: f64, step_pct: f64) -> ResourcePutBody {
        ResourcePutBody {
            config: None,
            low_threshold_percent: None,
            high_threshold_percent: Some(json!(high_pct)),
            critical_threshold_percent: None,
            low_delay_seconds: 3600,
            high_delay_seconds: 1800,
            size_step_percent: Some(step_pct),
            single_step: false,
            min_size: None,
            max_size: None,
            min_free_size: None,
            min_free_size_is_critical: false,
            low_requires_greenlight: false,
            high_requires_greenlight: false,
        }
    }

    #[test]
    fn valid_body_passes() {
        let body = body_with(80.0, 20.0);
        assert!(validate_resource_put(&body, &driver()).is_ok());
    }

    #[test]
    fn no_thresholds_at_all_is_rejected() {
        let mut body = body_with(80.0, 20.0);
        body.high_threshold_percent = None;
        let errors = validate_resource_put(&body, &driver()).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("at least one threshold")));
    }

    #[test]
    fn step_and_single_step_both_set_is_rejected() {
        let mut body = body_with(80.0, 20.0);
        body.single_step = true;
        let errors = validate_resource_put(&body, &driver()).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("exactly one of")));
    }

    #[test]
    fn out_of_range_percent_is_rejected() {
        let body = body_with(150.0, 20.0);
        let errors = validate_resource_put(&body, &driver()).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("must be in [0, 100]")));
    }

    #[test]
    fn min_free_size_on_non_absolute_driver_is_rejected() {
        let mut fractional = driver();
        fractional.reports_absolute_usage = false;
        let mut body = body_with(80.0, 20.0);
        body.min_free_size = Some(10);
        let errors = validate_resource_put(&body, &fractional).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("min_free_size requires")));
    }

    #[test]
    fn max_size_required_when_driver_caps_it() {
        let mut capped = driver();
        capped.max_asset_size = Some(1_000_000);
        let body = body_with(80.0, 20.0);
        let errors = validate_resource_put(&body, &capped).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("max_size must be configured")));
    }

    #[test]
    fn accumulates_multiple_errors_at_once() {
        let mut body = body_with(150.0, 20.0);
        body.single_step = true;
        let errors = validate_resource_put(&body, &driver()).unwrap_err();
        assert!(errors.len() >= 2);
    }
}
