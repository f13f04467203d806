//! Resource scraper loop (spec §4.3): keeps each resource's asset set in
//! sync with its driver.

use std::sync::Arc;
use std::time::Instant;

use castellum_db::Store;
use castellum_drivers::DriverRegistry;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::jitter::jittered_interval;
use crate::metrics::observe_scrape;

/// Runs one resource-scraper worker until `shutdown` resolves. Spawn
/// `config.resource_scrape_workers` copies of this (spec §5 "each pool is a
/// small, fixed set of parallel workers").
pub async fn run(
    store: Arc<Store>,
    registry: Arc<DriverRegistry>,
    config: WorkerConfig,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        match store.resources.lease_next_due(config.lease_secs).await {
            Ok(Some(resource)) => {
                let start = Instant::now();
                let driver = registry.get(&resource.asset_type);

                let outcome = match driver {
                    None => {
                        // Unknown asset-type: scrapers ignore stored rows
                        // of that type (spec §4.1).
                        debug!(asset_type = %resource.asset_type, "no driver registered, skipping resource");
                        Ok(())
                    }
                    Some(driver) => match driver.list_assets(&resource).await {
                        Ok(seen) => {
                            let known = store
                                .assets
                                .list_uuids_for_resource(resource.id)
                                .await
                                .unwrap_or_default();

                            for uuid in seen.difference(&known) {
                                if let Err(err) = store.assets.insert_new(resource.id, *uuid).await {
                                    error!(error = %err, "failed to insert newly seen asset");
                                }
                            }

                            let still_present: Vec<_> = seen.into_iter().collect();
                            if let Err(err) = store
                                .assets
                                .delete_vanished(resource.id, &still_present)
                                .await
                            {
                                error!(error = %err, "failed to delete vanished assets");
                            }
                            Ok(())
                        }
                        Err(err) => Err(err.to_string()),
                    },
                };

                let duration = start.elapsed().as_secs_f64();
                let next_scrape_at = match &outcome {
                    Ok(()) => chrono::Utc::now() + jittered_interval(config.scrape_interval_secs),
                    Err(_) => chrono::Utc::now()
                        + chrono::Duration::seconds(config.driver_error_retry_secs as i64),
                };

                if let Err(err) = store
                    .resources
                    .record_scrape_result(
                        resource.id,
                        outcome.as_ref().err().map(|s| s.as_str()),
                        duration,
                        next_scrape_at,
                    )
                    .await
                {
                    error!(error = %err, "failed to record resource scrape result");
                }

                if let Err(message) = outcome {
                    observe_scrape("resource_scraper", "error", duration);
                    warn!(resource_id = %resource.id, error = %message, "resource scrape failed");
                } else {
                    observe_scrape("resource_scraper", "ok", duration);
                    info!(resource_id = %resource.id, duration_secs = duration, "resource scraped");
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = sleep(Duration::from_millis(500)) => {}
                    _ = shutdown.changed() => {}
                }
            }
            Err(err) => {
                error!(error = %err, "resource lease query failed");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
