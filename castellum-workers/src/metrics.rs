//! Castellum-specific worker-pool gauges/counters, registered into the same
//! `Registry` the API process exposes on its metrics endpoint (spec §1
//! ambient stack, teacher's `metrics.rs` macro style).

use once_cell::sync::Lazy;
use prometheus::{opts, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Registry};

macro_rules! counter_vec {
    ($name:expr, $help:expr, $labels:expr) => {
        Lazy::new(|| IntCounterVec::new(opts!($name, $help), $labels).unwrap())
    };
}
macro_rules! gauge {
    ($name:expr, $help:expr) => {
        Lazy::new(|| IntGauge::new($name, $help).unwrap())
    };
}
macro_rules! gauge_vec {
    ($name:expr, $help:expr, $labels:expr) => {
        Lazy::new(|| IntGaugeVec::new(opts!($name, $help), $labels).unwrap())
    };
}
macro_rules! histogram_vec {
    ($name:expr, $help:expr, $labels:expr) => {
        Lazy::new(|| HistogramVec::new(HistogramOpts::new($name, $help), $labels).unwrap())
    };
}

pub static RESOURCES_ENROLLED: Lazy<IntGauge> =
    gauge!("castellum_resources_enrolled", "Resources currently enrolled");
pub static ASSETS_TRACKED: Lazy<IntGauge> =
    gauge!("castellum_assets_tracked", "Assets currently tracked");
pub static PENDING_OPERATIONS_BY_REASON: Lazy<IntGaugeVec> = gauge_vec!(
    "castellum_pending_operations_by_reason",
    "Open pending operations by reason",
    &["reason"]
);
pub static FINISHED_OPERATIONS_TOTAL: Lazy<IntCounterVec> = counter_vec!(
    "castellum_finished_operations_total",
    "Finished operations by outcome",
    &["outcome"]
);
pub static SCRAPE_DURATION: Lazy<HistogramVec> = histogram_vec!(
    "castellum_scrape_duration_seconds",
    "Scrape-loop duration",
    &["loop_name", "result"]
);
pub static RESIZE_RETRY_TOTAL: Lazy<IntCounterVec> = counter_vec!(
    "castellum_resize_retry_total",
    "Resize executor retry attempts",
    &["asset_type"]
);

pub fn register_all(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(RESOURCES_ENROLLED.clone()))?;
    registry.register(Box::new(ASSETS_TRACKED.clone()))?;
    registry.register(Box::new(PENDING_OPERATIONS_BY_REASON.clone()))?;
    registry.register(Box::new(FINISHED_OPERATIONS_TOTAL.clone()))?;
    registry.register(Box::new(SCRAPE_DURATION.clone()))?;
    registry.register(Box::new(RESIZE_RETRY_TOTAL.clone()))?;
    Ok(())
}

pub fn observe_scrape(loop_name: &str, result: &str, duration_secs: f64) {
    SCRAPE_DURATION
        .with_label_values(&[loop_name, result])
        .observe(duration_secs);
}

pub fn record_finished_outcome(outcome: &str) {
    FINISHED_OPERATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_resize_retry(asset_type: &str) {
    RESIZE_RETRY_TOTAL.with_label_values(&[asset_type]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrape_duration_records_by_loop_and_result() {
        let registry = Registry::new_custom(Some("t".into()), None).unwrap();
        register_all(&registry).unwrap();
        observe_scrape("resource_scraper", "ok", 0.2);
        let count = SCRAPE_DURATION
            .with_label_values(&["resource_scraper", "ok"])
            .get_sample_count();
        assert!(count >= 1);
    }

    #[test]
    fn finished_outcome_counter_increments() {
        let registry = Registry::new_custom(Some("t2".into()), None).unwrap();
        register_all(&registry).unwrap();
        record_finished_outcome("succeeded");
        record_finished_outcome("succeeded");
        let value = FINISHED_OPERATIONS_TOTAL
            .with_label_values(&["succeeded"])
            .get();
        assert!(value >= 2);
    }
}
