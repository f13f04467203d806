pub mod admin;
pub mod assets;
pub mod health;
pub mod operations;
pub mod resources;

use axum::{http::StatusCode, response::IntoResponse, Json};

pub async fn route_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "NotFound",
            "message": "no such route",
        })),
    )
}
