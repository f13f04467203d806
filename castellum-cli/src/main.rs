//! The `castellum` binary: one process image, three run modes (spec §6
//! "CLI"). `api` serves the read/write HTTP surface; `observer` runs the
//! resource- and asset-scraper pools; `worker` runs the resize executor
//! pool. A deployment typically runs one of each behind its own restart
//! policy, sharing the same Postgres database.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "castellum", about = "Autoscaling controller for cloud-project resources")]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Serve the read/write HTTP API.
    Api {
        #[arg(long, env = "CASTELLUM_API_LISTEN", default_value = "0.0.0.0:8080")]
        listen: SocketAddr,
    },
    /// Run the resource-scraper and asset-scraper worker pools.
    Observer,
    /// Run the resize-executor worker pool.
    Worker,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let obs = castellum_api::observability::Observability::init().context("observability init")?;
    let cli = Cli::parse();

    let exit = run(cli, obs.registry.clone()).await;

    castellum_api::observability::Observability::shutdown();

    match exit {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::error!(error = %err, "fatal startup error");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli, metrics_registry: prometheus::Registry) -> Result<()> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let max_connections: u32 = std::env::var("CASTELLUM_DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(16);

    let pool = castellum_db::connect(&database_url, max_connections)
        .await
        .context("connecting to database")?;
    castellum_db::migrate(&pool).await.context("running migrations")?;
    tracing::info!("database connected and migrations applied");

    let store = Arc::new(castellum_db::Store::new(pool));
    let registry = Arc::new(build_driver_registry()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    match cli.mode {
        Mode::Api { listen } => {
            let policy_config = castellum_policy::PolicyConfig::from_env().context("loading policy config")?;
            let policy: Arc<dyn castellum_policy::PolicyEnforcer> =
                Arc::new(castellum_policy::FilePolicyEnforcer::load(&PathBuf::from(&policy_config.policy_file))
                    .context("loading policy file")?);
            let audit = Arc::new(castellum_policy::AuditPublisher::spawn(
                policy_config.rabbitmq_url.clone(),
                1024,
            ));

            castellum_api::serve(listen, store, registry, policy, audit, metrics_registry).await
        }
        Mode::Observer => {
            let config = castellum_workers::WorkerConfig::from_env().context("loading worker config")?;
            let handles = castellum_workers::run_observer(store, registry, config, shutdown_rx);
            for handle in handles {
                let _ = handle.await;
            }
            Ok(())
        }
        Mode::Worker => {
            let config = castellum_workers::WorkerConfig::from_env().context("loading worker config")?;
            let handles = castellum_workers::run_worker(store, registry, config, shutdown_rx);
            for handle in handles {
                let _ = handle.await;
            }
            Ok(())
        }
    }
}

/// Builds the process-wide driver registry. Only the reference
/// `manila-shares` driver ships in this deployment (spec §10); a real
/// rollout would register one driver per asset-type it manages here.
fn build_driver_registry() -> Result<castellum_drivers::DriverRegistry> {
    let manila_base_url = std::env::var("CASTELLUM_MANILA_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:8786".to_string());

    Ok(castellum_drivers::DriverRegistry::builder()
        .register(Arc::new(castellum_drivers::ManilaDriver::new(manila_base_url)))
        .build())
}
