//! The axum HTTP surface (spec §6): the write API that enrolls/edits/removes
//! resources, the read API over assets and their pending/finished
//! operations, and the admin reports — all generalised from the teacher's
//! `api` crate's module layout.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod validation;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::http::{header, HeaderValue, Method};
use axum::{middleware, Router};
use tower_http::cors::CorsLayer;

use castellum_db::Store;
use castellum_drivers::DriverRegistry;
use castellum_policy::{AuditPublisher, PolicyEnforcer};
use rate_limit::RateLimitState;
use state::AppState;

pub fn router(state: AppState) -> Router {
    let rate_limit_state = RateLimitState::from_env();

    let cors = CorsLayer::new()
        .allow_origin(
            std::env::var("CORS_ALLOWED_ORIGIN")
                .ok()
                .and_then(|v| HeaderValue::from_str(&v).ok())
                .map(|v| vec![v])
                .unwrap_or_default(),
        )
        .allow_methods([Method::GET, Method::PUT, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .merge(routes::resource_routes())
        .merge(routes::asset_routes())
        .merge(routes::operations_routes())
        .merge(routes::admin_routes())
        .merge(routes::health_routes())
        .merge(routes::metrics_routes())
        .fallback(handlers::route_not_found)
        .layer(middleware::from_fn(request_logger))
        .layer(middleware::from_fn_with_state(
            rate_limit_state,
            rate_limit::rate_limit_middleware,
        ))
        .layer(middleware::from_fn(metrics::track_http_metrics))
        .layer(cors)
        .with_state(state)
}

async fn request_logger(
    req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(req).await;

    let elapsed = start.elapsed().as_millis();
    let status = response.status().as_u16();
    tracing::info!("{method} {uri} {status} {elapsed}ms");

    response
}

/// Builds the shared application state and binds the HTTP listener. Returns
/// once the server shuts down (ctrl-c or a fatal accept error).
pub async fn serve(
    addr: SocketAddr,
    store: Arc<Store>,
    registry: Arc<DriverRegistry>,
    policy: Arc<dyn PolicyEnforcer>,
    audit: Arc<AuditPublisher>,
    metrics_registry: prometheus::Registry,
) -> Result<()> {
    let state = AppState::new(store, registry, policy, audit, metrics_registry);
    let app = router(state);

    tracing::info!(%addr, "API server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
