//! Asset scraper loop (spec §4.4): scrapes one asset's status, runs the
//! decision engine, and applies the resulting pending-operation transition.

use std::sync::Arc;
use std::time::Instant;

use castellum_core::{decide, transition, StateAction};
use castellum_db::Store;
use castellum_drivers::DriverRegistry;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::jitter::jittered_interval;
use crate::metrics::{observe_scrape, record_finished_outcome};

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

        match store.assets.lease_next_due(config.lease_secs).await {
            Ok(Some(mut asset)) => {
                let start = Instant::now();

                let resource = match store.resources.find_by_id(asset.resource_id).await {
                    Ok(Some(resource)) => resource,
                    Ok(None) => {
                        warn!(asset_id = %asset.id, "asset's resource vanished, skipping tick");
                        continue;
                    }
                    Err(err) => {
                        error!(error = %err, asset_id = %asset.id, "failed to load owning resource");
                        continue;
                    }
                };

                let driver = registry.get(&resource.asset_type);
                let outcome = match driver {
                    None => Ok(()),
                    Some(driver) => match driver.get_status(&resource, asset.uuid).await {
                        Ok(status) => {
                            asset.status = status;
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

                if outcome.is_ok() {
                    if let Err(err) = store
                        .assets
                        .update_status(
                            asset.id,
                            &asset.status,
                            None,
                            duration,
                            next_scrape_at,
                        )
                        .await
                    {
                        error!(error = %err, "failed to persist asset status");
                        continue;
                    }

                    if let Err(err) = apply_decision(&store, &resource, &asset).await {
                        error!(error = %err, asset_id = %asset.id, "failed to apply state machine transition");
                    }
                    observe_scrape("asset_scraper", "ok", duration);
                } else if let Err(message) = &outcome {
                    if let Err(err) = store
                        .assets
                        .update_status(asset.id, &asset.status, Some(message), duration, next_scrape_at)
                        .await
                    {
                        error!(error = %err, "failed to persist asset scrape error");
                    }
                    observe_scrape("asset_scraper", "error", duration);
                    warn!(asset_id = %asset.id, error = %message, "asset scrape failed");
                }

                info!(asset_id = %asset.id, duration_secs = duration, "asset scraped");
            }
            Ok(None) => {
                tokio::select! {
                    _ = sleep(Duration::from_millis(500)) => {}
                    _ = shutdown.changed() => {}
                }
            }
            Err(err) => {
                error!(error = %err, "asset lease query failed");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn apply_decision(
    store: &Store,
    resource: &castellum_core::Resource,
    asset: &castellum_core::Asset,
) -> Result<(), castellum_db::DbError> {
    let eligible = decide(&resource.logic, &asset.status);
    let pending = store.pending_operations.get(asset.id).await?;
    let now = chrono::Utc::now();

    let action = transition(
        pending.as_ref(),
        &eligible,
        &resource.logic,
        asset.id,
        asset.status.size,
        &asset.status.usage,
        now,
    );

    match action {
        StateAction::NoOp | StateAction::Unchanged | StateAction::LeaveForExecutor => {}
        StateAction::Insert(op) => {
            debug!(asset_id = %asset.id, reason = %op.reason, new_size = op.new_size, "inserting pending operation");
            store.pending_operations.insert(&op).await?;
        }
        StateAction::Confirm(op) => {
            if let Some(confirmed_at) = op.state.confirmed_at() {
                store
                    .pending_operations
                    .set_confirmed(asset.id, confirmed_at)
                    .await?;
            }
        }
        StateAction::Greenlight(op) => {
            if let Some(greenlit_at) = op.state.greenlit_at() {
                store
                    .pending_operations
                    .set_greenlit(asset.id, greenlit_at, None)
                    .await?;
            }
        }
        StateAction::Cancel(finished) => {
            store.pending_operations.delete(asset.id).await?;
            store.finished_operations.insert(&finished).await?;
            record_finished_outcome(castellum_db::convert::outcome_str(finished.outcome));
        }
        StateAction::Replace {
            cancelled,
            replacement,
        } => {
            store.pending_operations.delete(asset.id).await?;
            store.finished_operations.insert(&cancelled).await?;
            record_finished_outcome(castellum_db::convert::outcome_str(cancelled.outcome));
            store.pending_operations.insert(&replacement).await?;
        }
    }

    Ok(())
}
