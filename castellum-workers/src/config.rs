use std::env;

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum WorkerConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

fn parse_u32_default(var: &'static str, default: u32) -> Result<u32, WorkerConfigError> {
    match env::var(var) {
        Ok(raw) => raw.parse::<u32>().map_err(|e| WorkerConfigError::InvalidValue {
            var,
            value: raw,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Pool sizes and loop cadence for the three worker pools (spec §5
/// "Scheduling model": a small fixed set of parallel workers per pool).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub resource_scrape_workers: u32,
    pub asset_scrape_workers: u32,
    pub resize_workers: u32,
    pub scrape_interval_secs: u64,
    pub driver_error_retry_secs: u64,
    pub lease_secs: i64,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, WorkerConfigError> {
        let resource_scrape_workers = parse_u32_default("CASTELLUM_RESOURCE_SCRAPE_WORKERS", 4)?;
        let asset_scrape_workers = parse_u32_default("CASTELLUM_ASSET_SCRAPE_WORKERS", 4)?;
        let resize_workers = parse_u32_default("CASTELLUM_RESIZE_WORKERS", 4)?;

        let config = Self {
            resource_scrape_workers,
            asset_scrape_workers,
            resize_workers,
            scrape_interval_secs: 300,
            driver_error_retry_secs: 30,
            lease_secs: 60,
        };

        info!(
            resource_scrape_workers,
            asset_scrape_workers, resize_workers, "worker pool sizes configured"
        );

        Ok(config)
    }
}
