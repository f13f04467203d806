// castellum-api/src/routes.rs
//
// Route tables grouped the way the teacher's `routes.rs` groups them, merged
// together in `lib.rs` with the same middleware stack ordering as the
// teacher's `main.rs` (request log -> rate limit -> metrics -> CORS).

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{handlers, state::AppState};

pub fn resource_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/projects/:project_id/resources/:asset_type",
            get(handlers::resources::get_resource)
                .put(handlers::resources::put_resource)
                .delete(handlers::resources::delete_resource),
        )
}

pub fn asset_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/projects/:project_id/assets/:asset_type",
            get(handlers::assets::list_assets),
        )
        .route(
            "/v1/projects/:project_id/assets/:asset_type/:asset_uuid",
            get(handlers::assets::get_asset),
        )
        .route(
            "/v1/projects/:project_id/assets/:asset_type/:asset_uuid/error-resolved",
            post(handlers::assets::error_resolved),
        )
        .route(
            "/v1/projects/:project_id/assets/:asset_type/:asset_uuid/greenlight",
            put(handlers::assets::greenlight),
        )
}

pub fn operations_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/projects/:project_id/resources/:asset_type/operations/pending",
            get(handlers::operations::pending_for_resource),
        )
        .route(
            "/v1/projects/:project_id/resources/:asset_type/operations/recently-failed",
            get(handlers::operations::recently_failed_for_resource),
        )
        .route(
            "/v1/projects/:project_id/resources/:asset_type/operations/recently-succeeded",
            get(handlers::operations::recently_succeeded_for_resource),
        )
        .route(
            "/v1/operations/pending",
            get(handlers::operations::cross_scope_pending),
        )
        .route(
            "/v1/operations/recently-failed",
            get(handlers::operations::cross_scope_recently_failed),
        )
        .route(
            "/v1/operations/recently-succeeded",
            get(handlers::operations::cross_scope_recently_succeeded),
        )
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/admin/resource-scrape-errors",
            get(handlers::admin::resource_scrape_errors),
        )
        .route(
            "/v1/admin/asset-scrape-errors",
            get(handlers::admin::asset_scrape_errors),
        )
        .route(
            "/v1/admin/asset-resize-errors",
            get(handlers::admin::asset_resize_errors),
        )
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health_check))
}

pub fn metrics_routes() -> Router<AppState> {
    Router::new().route("/metrics", get(crate::metrics::metrics_handler))
}
