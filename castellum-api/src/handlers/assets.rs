// castellum-api/src/handlers/assets.rs
//
// `/v1/projects/{project_id}/assets/{asset_type}[/{asset_uuid}[?history]
// [/error-resolved]]` (spec §6).

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use castellum_core::Outcome;
use castellum_policy::AuditEvent;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth;
use crate::error::{ApiError, ApiResult};
use crate::models::{AssetJson, FinishedOperationJson, GreenlightBody};
use crate::state::AppState;

async fn resource_or_404(
    state: &AppState,
    project_id: &str,
    asset_type: &str,
) -> Result<castellum_core::Resource, ApiError> {
    if state.registry.get(asset_type).is_none() {
        return Err(ApiError::not_found(format!("unknown asset-type {asset_type:?}")));
    }
    state
        .store
        .resources
        .find_by_scope_and_type(project_id, asset_type)
        .await?
        .ok_or_else(|| ApiError::not_found("resource is not enrolled in this project"))
}

pub async fn list_assets(
    State(state): State<AppState>,
    Path((project_id, asset_type)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<AssetJson>>> {
    let token = auth::extract(&headers)?;
    auth::check(&state, &token, "show", &asset_type, &project_id)?;
    let resource = resource_or_404(&state, &project_id, &asset_type).await?;

    let assets = state.store.assets.list_for_resource(resource.id).await?;
    Ok(Json(assets.iter().map(AssetJson::from).collect()))
}

#[derive(Debug, Deserialize, Default)]
pub struct HistoryQuery {
    history: Option<String>,
}

#[derive(serde::Serialize)]
#[serde(untagged)]
pub enum AssetOrHistory {
    Asset(AssetJson),
    History(Vec<FinishedOperationJson>),
}

pub async fn get_asset(
    State(state): State<AppState>,
    Path((project_id, asset_type, asset_uuid)): Path<(String, String, Uuid)>,
    Query(query): Query<HistoryQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<AssetOrHistory>> {
    let token = auth::extract(&headers)?;
    auth::check(&state, &token, "show", &asset_type, &project_id)?;
    let resource = resource_or_404(&state, &project_id, &asset_type).await?;

    let asset = state
        .store
        .assets
        .find_by_uuid(resource.id, asset_uuid)
        .await?
        .ok_or_else(|| ApiError::not_found("no such asset in this resource"))?;

    if query.history.is_some() {
        let history = state.store.finished_operations.history_for_asset(asset.id).await?;
        return Ok(Json(AssetOrHistory::History(
            history.iter().map(FinishedOperationJson::from).collect(),
        )));
    }

    Ok(Json(AssetOrHistory::Asset(AssetJson::from(&asset))))
}

/// Acknowledges that a prior `errored` outcome no longer matters, appending
/// a new `error-resolved` row (spec §3, §6). 409 if the latest finished op
/// for this asset is not `errored`.
pub async fn error_resolved(
    State(state): State<AppState>,
    Path((project_id, asset_type, asset_uuid)): Path<(String, String, Uuid)>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let token = auth::extract(&headers)?;
    auth::check(&state, &token, "edit", &asset_type, &project_id)?;
    let resource = resource_or_404(&state, &project_id, &asset_type).await?;

    let asset = state
        .store
        .assets
        .find_by_uuid(resource.id, asset_uuid)
        .await?
        .ok_or_else(|| ApiError::not_found("no such asset in this resource"))?;

    let history = state.store.finished_operations.history_for_asset(asset.id).await?;
    let latest = history
        .first()
        .ok_or_else(|| ApiError::conflict("asset has no finished operations"))?;

    if latest.outcome != Outcome::Errored {
        return Err(ApiError::conflict("latest finished operation is not errored"));
    }

    let now = Utc::now();
    state.store.finished_operations.append_error_resolved(latest, now).await?;

    state.audit.emit(AuditEvent {
        actor: token.subject,
        target: format!("{project_id}/{asset_type}/{asset_uuid}"),
        action: "error-resolved".to_string(),
        payload: serde_json::to_value(FinishedOperationJson::from(latest)).unwrap_or_default(),
        recorded_at: now,
    });

    Ok(StatusCode::NO_CONTENT)
}

/// Operator greenlight for a gated pending operation (spec §4.4: "When a
/// pending op is greenlit by an operator via the API, `greenlit_at` and
/// `greenlit_by_user` are set directly; value may be future-dated"). The
/// exact route is this deployment's own addition — spec.md describes the
/// effect, not a path (see DESIGN.md).
pub async fn greenlight(
    State(state): State<AppState>,
    Path((project_id, asset_type, asset_uuid)): Path<(String, String, Uuid)>,
    headers: HeaderMap,
    Json(body): Json<GreenlightBody>,
) -> ApiResult<StatusCode> {
    let token = auth::extract(&headers)?;
    auth::check(&state, &token, "edit", &asset_type, &project_id)?;
    let resource = resource_or_404(&state, &project_id, &asset_type).await?;

    let asset = state
        .store
        .assets
        .find_by_uuid(resource.id, asset_uuid)
        .await?
        .ok_or_else(|| ApiError::not_found("no such asset in this resource"))?;

    let pending = state
        .store
        .pending_operations
        .get(asset.id)
        .await?
        .ok_or_else(|| ApiError::conflict("asset has no pending operation"))?;

    if pending.state.greenlit_at().is_some() {
        return Err(ApiError::conflict("pending operation is already greenlit"));
    }
    if pending.state.confirmed_at().is_none() {
        return Err(ApiError::conflict("pending operation has not yet been confirmed"));
    }

    let greenlit_at = body.greenlit_at.unwrap_or_else(Utc::now);
    state
        .store
        .pending_operations
        .set_greenlit(asset.id, greenlit_at, Some(&token.subject))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
