//! Resize executor loop (spec §4.5): carries out a greenlit pending
//! operation against its driver and folds the result into the finished log.

use std::sync::Arc;

use castellum_core::{FinishedOperation, Outcome};
use castellum_db::Store;
use castellum_drivers::{DriverError, DriverRegistry, ResizeOutcome};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::config::WorkerConfig;
use crate::metrics::{record_finished_outcome, record_resize_retry};

pub async fn run(
    store: Arc<Store>,
    registry: Arc<DriverRegistry>,
    config: WorkerConfig,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let backoff = BackoffPolicy::default();

    loop {
        if *shutdown.borrow() {
            return;
        }

        match store
            .pending_operations
            .lease_next_greenlit(config.lease_secs)
            .await
        {
            Ok(Some(op)) => {
                let now = chrono::Utc::now();

                let asset = match store.assets.find_by_id(op.asset_id).await {
                    Ok(Some(asset)) => asset,
                    Ok(None) => {
                        warn!(asset_id = %op.asset_id, "asset vanished before resize could run");
                        continue;
                    }
                    Err(err) => {
                        error!(error = %err, asset_id = %op.asset_id, "failed to load asset for resize");
                        continue;
                    }
                };

                let resource = match store.resources.find_by_id(asset.resource_id).await {
                    Ok(Some(resource)) => resource,
                    Ok(None) => {
                        warn!(asset_id = %op.asset_id, "resource vanished before resize could run");
                        continue;
                    }
                    Err(err) => {
                        error!(error = %err, "failed to load resource for resize");
                        continue;
                    }
                };

                let Some(driver) = registry.get(&resource.asset_type) else {
                    warn!(asset_type = %resource.asset_type, "no driver registered, cannot execute resize");
                    continue;
                };

                match driver.set_size(&resource, &asset, op.new_size).await {
                    Ok(ResizeOutcome::Succeeded) => {
                        if let Err(err) = store
                            .assets
                            .mark_resized(asset.id, op.new_size, now)
                            .await
                        {
                            error!(error = %err, "failed to record resize bookkeeping");
                        }
                        if let Err(err) = store.pending_operations.delete(op.asset_id).await {
                            error!(error = %err, "failed to delete completed pending operation");
                        }
                        let finished =
                            FinishedOperation::from_pending(op.clone(), Outcome::Succeeded, now, None);
                        if let Err(err) = store.finished_operations.insert(&finished).await {
                            error!(error = %err, "failed to record finished resize");
                        }
                        record_finished_outcome("succeeded");
                        info!(asset_id = %asset.id, new_size = op.new_size, "resize succeeded");
                    }
                    Ok(ResizeOutcome::Failed { message }) => {
                        if let Err(err) = store.pending_operations.delete(op.asset_id).await {
                            error!(error = %err, "failed to delete failed pending operation");
                        }
                        let finished = FinishedOperation::from_pending(
                            op.clone(),
                            Outcome::Failed,
                            now,
                            Some(message.clone()),
                        );
                        if let Err(err) = store.finished_operations.insert(&finished).await {
                            error!(error = %err, "failed to record finished resize");
                        }
                        record_finished_outcome("failed");
                        warn!(asset_id = %asset.id, error = %message, "resize rejected by driver");
                    }
                    Err(DriverError::Transient(message)) | Err(DriverError::ConfigRejected(message)) => {
                        record_resize_retry(&resource.asset_type);
                        handle_transient_failure(&store, &op, &backoff, message, now).await;
                    }
                    Err(DriverError::Permanent(message)) => {
                        if let Err(err) = store.pending_operations.delete(op.asset_id).await {
                            error!(error = %err, "failed to delete permanently failed pending operation");
                        }
                        let finished = FinishedOperation::from_pending(
                            op.clone(),
                            Outcome::Failed,
                            now,
                            Some(message.clone()),
                        );
                        if let Err(err) = store.finished_operations.insert(&finished).await {
                            error!(error = %err, "failed to record finished resize");
                        }
                        record_finished_outcome("failed");
                        warn!(asset_id = %asset.id, error = %message, "resize failed permanently");
                    }
                    Err(DriverError::AssetTypeMismatch { expected, got }) => {
                        error!(expected = %expected, got = %got, "driver registry misconfiguration");
                        record_resize_retry(&resource.asset_type);
                        handle_transient_failure(
                            &store,
                            &op,
                            &backoff,
                            format!("asset type mismatch: expected {expected}, got {got}"),
                            now,
                        )
                        .await;
                    }
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = sleep(Duration::from_millis(500)) => {}
                    _ = shutdown.changed() => {}
                }
            }
            Err(err) => {
                error!(error = %err, "pending operation lease query failed");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn handle_transient_failure(
    store: &Store,
    op: &castellum_core::PendingOperation,
    backoff: &BackoffPolicy,
    message: String,
    now: chrono::DateTime<chrono::Utc>,
) {
    let attempts = op.errored_attempts + 1;

    if backoff.exceeded(attempts) {
        if let Err(err) = store.pending_operations.delete(op.asset_id).await {
            error!(error = %err, "failed to delete exhausted pending operation");
        }
        let finished = FinishedOperation::from_pending(
            op.clone(),
            Outcome::Errored,
            now,
            Some(message.clone()),
        );
        if let Err(err) = store.finished_operations.insert(&finished).await {
            error!(error = %err, "failed to record exhausted resize");
        }
        record_finished_outcome("errored");
        warn!(asset_id = %op.asset_id, attempts, error = %message, "resize exhausted retry budget");
        return;
    }

    let retry_at = now + backoff.next_delay(attempts);
    if let Err(err) = store
        .pending_operations
        .record_errored_attempt(op.asset_id, attempts, retry_at)
        .await
    {
        error!(error = %err, "failed to record errored resize attempt");
    }
    warn!(asset_id = %op.asset_id, attempts, error = %message, "resize attempt errored, will retry");
}
