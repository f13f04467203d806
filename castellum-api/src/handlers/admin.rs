// castellum-api/src/handlers/admin.rs
//
// `/v1/admin/{resource-scrape-errors,asset-scrape-errors,asset-resize-errors}`
// (spec §6): "require cluster-level policy". There is no asset-type to
// derive a rule name from here, so these endpoints check a fixed
// `cluster:admin:*` rule rather than `project:show:<head>` (see DESIGN.md).

use axum::{extract::State, http::HeaderMap, Json};

use crate::auth;
use crate::error::ApiResult;
use crate::models::{AssetJson, FinishedOperationJson, ResourceJson};
use crate::state::AppState;

const CLUSTER_SCOPE: &str = "cluster";
const ADMIN_ASSET_TYPE: &str = "admin";

pub async fn resource_scrape_errors(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ResourceJson>>> {
    let token = auth::extract(&headers)?;
    auth::check(&state, &token, "show", ADMIN_ASSET_TYPE, CLUSTER_SCOPE)?;

    let rows = state.store.resources.list_scrape_errors().await?;
    Ok(Json(rows.iter().map(ResourceJson::from).collect()))
}

pub async fn asset_scrape_errors(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<AssetJson>>> {
    let token = auth::extract(&headers)?;
    auth::check(&state, &token, "show", ADMIN_ASSET_TYPE, CLUSTER_SCOPE)?;

    let rows = state.store.assets.list_scrape_errors().await?;
    Ok(Json(rows.iter().map(AssetJson::from).collect()))
}

pub async fn asset_resize_errors(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<FinishedOperationJson>>> {
    let token = auth::extract(&headers)?;
    auth::check(&state, &token, "show", ADMIN_ASSET_TYPE, CLUSTER_SCOPE)?;

    let rows = state.store.finished_operations.admin_resize_errors().await?;
    Ok(Json(rows.iter().map(FinishedOperationJson::from).collect()))
}
