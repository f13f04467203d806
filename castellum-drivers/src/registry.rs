use std::collections::HashMap;
use std::sync::Arc;

use crate::AssetTypeDriver;

/// Static facts an asset-type driver declares about itself (spec §4.1).
#[derive(Debug, Clone)]
pub struct DriverInfo {
    pub asset_type: String,
    /// Metric names this driver reports usage for, e.g. `["bytes_used"]`.
    pub usage_metrics: Vec<String>,
    /// `true` if `AssetStatus::usage` values are absolute byte counts rather
    /// than fractions of `size`; the decision engine only cares about
    /// `usage/size` ratios either way, but the API surface distinguishes the
    /// two for display.
    pub reports_absolute_usage: bool,
    /// A hard ceiling the driver itself enforces, independent of any
    /// resource-level `max_size` policy. `None` if the backend has none.
    pub max_asset_size: Option<u64>,
    /// Other asset-types that must not be enabled simultaneously in the
    /// same scope as this one (spec §4.1).
    pub conflicts_with: Vec<String>,
}

/// The process-wide set of registered drivers. Built once at start-up and
/// never mutated afterwards — every worker and API handler reads through
/// `Arc<DriverRegistry>` without needing its own lock (spec §4.1 "immutable
/// after start-up").
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn AssetTypeDriver>>,
}

impl DriverRegistry {
    pub fn builder() -> DriverRegistryBuilder {
        DriverRegistryBuilder::default()
    }

    pub fn get(&self, asset_type: &str) -> Option<Arc<dyn AssetTypeDriver>> {
        self.drivers.get(asset_type).cloned()
    }

    pub fn asset_types(&self) -> impl Iterator<Item = &str> {
        self.drivers.keys().map(String::as_str)
    }

    /// The asset-types that conflict with `asset_type`, per that driver's
    /// own declaration. Used by the write API to refuse enabling two
    /// mutually-exclusive resources in the same scope (spec §4.1, §6).
    pub fn conflicts_with(&self, asset_type: &str) -> &[String] {
        self.drivers
            .get(asset_type)
            .map(|d| d.info().conflicts_with.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Default)]
pub struct DriverRegistryBuilder {
    drivers: HashMap<String, Arc<dyn AssetTypeDriver>>,
}

impl DriverRegistryBuilder {
    pub fn register(mut self, driver: Arc<dyn AssetTypeDriver>) -> Self {
        let asset_type = driver.info().asset_type.clone();
        self.drivers.insert(asset_type, driver);
        self
    }

    pub fn build(self) -> DriverRegistry {
        DriverRegistry {
            drivers: self.drivers,
        }
    }
}
