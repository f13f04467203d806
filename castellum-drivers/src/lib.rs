//! Asset-type drivers: the pluggable backends a `Resource` scrapes and
//! resizes assets through (spec §4.1). `castellum-core` never depends on
//! this crate — drivers translate between a backend's own wire shapes and
//! the core domain types at the edge.

pub mod error;
pub mod manila;
pub mod registry;

pub use error::DriverError;
pub use manila::ManilaDriver;
pub use registry::{DriverInfo, DriverRegistry};

use async_trait::async_trait;
use castellum_core::{Asset, AssetStatus, Resource};
use std::collections::HashSet;
use uuid::Uuid;

/// Outcome of a single resize attempt, as the driver itself observed it.
/// The caller (resize executor) folds this into a `castellum_core::Outcome`
/// together with its own retry bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub enum ResizeOutcome {
    /// The backend accepted the resize and the asset now reports `new_size`.
    Succeeded,
    /// The backend rejected the resize outright; retrying would not help.
    Failed { message: String },
}

/// The contract every asset-type backend implements (spec §4.1).
///
/// A registered driver is expected to be cheap to clone or already
/// internally shared (an `Arc<reqwest::Client>` and similar); the registry
/// hands out `Arc<dyn AssetTypeDriver>` rather than owned values.
#[async_trait]
pub trait AssetTypeDriver: Send + Sync {
    /// Static facts about this driver: its metrics, whether it reports
    /// absolute or fractional usage, and any cross-asset-type conflicts.
    fn info(&self) -> &DriverInfo;

    /// Enumerate every asset currently under `resource`'s scope. The asset
    /// scraper diffs this set against what it already has rows for.
    async fn list_assets(&self, resource: &Resource) -> Result<HashSet<Uuid>, DriverError>;

    /// Fetch one asset's current size, per-metric usage, and strict bounds.
    async fn get_status(
        &self,
        resource: &Resource,
        asset_uuid: Uuid,
    ) -> Result<AssetStatus, DriverError>;

    /// Request a resize from `old_size` to `new_size`. A transient I/O
    /// fault should surface as `DriverError::Transient`, not as
    /// `ResizeOutcome::Failed` — only the backend itself rejecting the
    /// request is a `Failed` outcome (spec §4.5, §7).
    async fn set_size(
        &self,
        resource: &Resource,
        asset: &Asset,
        new_size: u64,
    ) -> Result<ResizeOutcome, DriverError>;

    /// Validate a resource's `config` blob before it is persisted. Drivers
    /// without configuration just return `Ok(())`.
    async fn check_resource_allowed(&self, resource: &Resource) -> Result<(), DriverError>;
}
