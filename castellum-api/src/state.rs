// castellum-api/src/state.rs
//
// Application state shared across handlers (teacher's `api/src/state.rs`
// shape), generalised from a bare pool to the whole set of start-up-
// immutable collaborators the read/write API consults (spec §5 "Shared
// resources").

use std::sync::Arc;
use std::time::Instant;

use castellum_db::Store;
use castellum_drivers::DriverRegistry;
use castellum_policy::{AuditPublisher, PolicyEnforcer};
use prometheus::Registry;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub registry: Arc<DriverRegistry>,
    pub policy: Arc<dyn PolicyEnforcer>,
    pub audit: Arc<AuditPublisher>,
    pub metrics: Registry,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        registry: Arc<DriverRegistry>,
        policy: Arc<dyn PolicyEnforcer>,
        audit: Arc<AuditPublisher>,
        metrics: Registry,
    ) -> Self {
        Self {
            store,
            registry,
            policy,
            audit,
            metrics,
            started_at: Instant::now(),
        }
    }
}
