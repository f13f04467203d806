//! Postgres persistence for Castellum: repositories over the four tables
//! from the domain model, the `FOR UPDATE SKIP LOCKED` leasing statements
//! that back every worker loop, and the operations-report query shape
//! shared by the read API.

pub mod assets;
pub mod convert;
pub mod error;
pub mod operations;
pub mod resources;

pub use assets::AssetRepo;
pub use error::DbError;
pub use operations::{FinishedOperationRepo, PendingOperationRepo};
pub use resources::ResourceRepo;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Embeds and runs the migration set bundled with this crate.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Builds the shared connection pool, capped per spec §5 "the process caps
/// concurrent database connections (recommended: 16)".
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn migrate(pool: &PgPool) -> Result<(), DbError> {
    MIGRATOR.run(pool).await?;
    Ok(())
}

/// Bundles the four repositories behind the one pool every crate needs.
#[derive(Clone)]
pub struct Store {
    pub pool: PgPool,
    pub resources: std::sync::Arc<ResourceRepo>,
    pub assets: std::sync::Arc<AssetRepo>,
    pub pending_operations: std::sync::Arc<PendingOperationRepo>,
    pub finished_operations: std::sync::Arc<FinishedOperationRepo>,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self {
            resources: std::sync::Arc::new(ResourceRepo::new(pool.clone())),
            assets: std::sync::Arc::new(AssetRepo::new(pool.clone())),
            pending_operations: std::sync::Arc::new(PendingOperationRepo::new(pool.clone())),
            finished_operations: std::sync::Arc::new(FinishedOperationRepo::new(pool.clone())),
            pool,
        }
    }
}
