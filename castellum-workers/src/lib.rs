//! The three autoscaling worker-pool loops (spec §4.3-§4.5, §5): a small
//! fixed set of parallel tasks per pool, each leasing work via
//! `FOR UPDATE SKIP LOCKED` rather than a global scheduler lock.

pub mod asset_scraper;
pub mod backoff;
pub mod config;
pub mod jitter;
pub mod metrics;
pub mod resize_executor;
pub mod resource_scraper;

pub use backoff::BackoffPolicy;
pub use config::{WorkerConfig, WorkerConfigError};

use std::sync::Arc;

use castellum_db::Store;
use castellum_drivers::DriverRegistry;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Spawns the resource-scraper and asset-scraper pools ("observer" mode).
pub fn run_observer(
    store: Arc<Store>,
    registry: Arc<DriverRegistry>,
    config: WorkerConfig,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    for worker_id in 0..config.resource_scrape_workers {
        let store = store.clone();
        let registry = registry.clone();
        let config = config.clone();
        let shutdown = shutdown.clone();
        info!(worker_id, "spawning resource scraper worker");
        handles.push(tokio::spawn(resource_scraper::run(
            store, registry, config, shutdown,
        )));
    }

    for worker_id in 0..config.asset_scrape_workers {
        let store = store.clone();
        let registry = registry.clone();
        let config = config.clone();
        let shutdown = shutdown.clone();
        info!(worker_id, "spawning asset scraper worker");
        handles.push(tokio::spawn(asset_scraper::run(
            store, registry, config, shutdown,
        )));
    }

    handles
}

/// Spawns the resize-executor pool ("worker" mode).
pub fn run_worker(
    store: Arc<Store>,
    registry: Arc<DriverRegistry>,
    config: WorkerConfig,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    for worker_id in 0..config.resize_workers {
        let store = store.clone();
        let registry = registry.clone();
        let config = config.clone();
        let shutdown = shutdown.clone();
        info!(worker_id, "spawning resize executor worker");
        handles.push(tokio::spawn(resize_executor::run(
            store, registry, config, shutdown,
        )));
    }

    handles
}
