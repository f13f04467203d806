// castellum-api/src/handlers/health.rs
//
// Unauthenticated liveness probe, grounded on the teacher's own
// `health_check` handler: a cheap `SELECT 1` against the pool plus uptime.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let uptime = state.started_at.elapsed().as_secs();
    let now = Utc::now().to_rfc3339();

    let db_ok = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.store.pool)
        .await
        .is_ok();

    if db_ok {
        tracing::info!(uptime_secs = uptime, "health check passed");
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "timestamp": now,
                "uptime_secs": uptime,
            })),
        )
    } else {
        tracing::warn!(uptime_secs = uptime, "health check degraded: db unreachable");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "degraded",
                "timestamp": now,
                "uptime_secs": uptime,
            })),
        )
    }
}
