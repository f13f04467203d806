// castellum-api/src/handlers/operations.rs
//
// Per-resource operations reports `/v1/projects/{p}/resources/{a}/operations/
// {pending|recently-failed|recently-succeeded}` and the cross-scope variants
// `/v1/operations/{…}?domain=&project=&asset-type=` (spec §4.6, §6).

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use castellum_core::{decide, FinishedOperation};
use chrono::Utc;

use crate::auth;
use crate::error::{ApiError, ApiResult};
use crate::models::{parse_max_age, CrossScopeQuery, FinishedOperationJson, PendingOperationJson};
use crate::state::AppState;

/// "Recently failed" is a freshness filter over the finished-operations log;
/// the caller still has to re-check that the asset is eligible for the same
/// reason right now (spec §4.6: "filters to assets that are still eligible
/// for the same reason... to avoid alerting on transiently resolved
/// states"; S6: the errored row is returned "iff engine still reports
/// critical eligibility at query time"). Rows whose asset or resource has
/// since vanished are dropped along with ones that are no longer eligible.
async fn filter_still_eligible(
    state: &AppState,
    rows: Vec<FinishedOperation>,
) -> ApiResult<Vec<FinishedOperation>> {
    let mut kept = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(asset) = state.store.assets.find_by_id(row.asset_id).await? else {
            continue;
        };
        let Some(resource) = state.store.resources.find_by_id(asset.resource_id).await? else {
            continue;
        };
        let eligible = decide(&resource.logic, &asset.status);
        if eligible.contains_key(&row.reason) {
            kept.push(row);
        }
    }
    Ok(kept)
}

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

pub async fn pending_for_resource(
    State(state): State<AppState>,
    Path((project_id, asset_type)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<PendingOperationJson>>> {
    let token = auth::extract(&headers)?;
    auth::check(&state, &token, "show", &asset_type, &project_id)?;
    let resource = resource_or_404(&state, &project_id, &asset_type).await?;

    let pending = state.store.pending_operations.list_for_resource(resource.id).await?;
    Ok(Json(pending.iter().map(PendingOperationJson::from).collect()))
}

pub async fn recently_failed_for_resource(
    State(state): State<AppState>,
    Path((project_id, asset_type)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<FinishedOperationJson>>> {
    let token = auth::extract(&headers)?;
    auth::check(&state, &token, "show", &asset_type, &project_id)?;
    let resource = resource_or_404(&state, &project_id, &asset_type).await?;

    let rows = state
        .store
        .finished_operations
        .recently_failed(Some(resource.id), None, None, None)
        .await?;
    let rows = filter_still_eligible(&state, rows).await?;
    Ok(Json(rows.iter().map(FinishedOperationJson::from).collect()))
}

pub async fn recently_succeeded_for_resource(
    State(state): State<AppState>,
    Path((project_id, asset_type)): Path<(String, String)>,
    Query(query): Query<CrossScopeQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<FinishedOperationJson>>> {
    let token = auth::extract(&headers)?;
    auth::check(&state, &token, "show", &asset_type, &project_id)?;
    let resource = resource_or_404(&state, &project_id, &asset_type).await?;

    let max_age = parse_max_age(query.max_age.as_deref()).map_err(ApiError::bad_request)?;
    let rows = state
        .store
        .finished_operations
        .recently_succeeded(Some(resource.id), None, None, None, max_age, Utc::now())
        .await?;
    Ok(Json(rows.iter().map(FinishedOperationJson::from).collect()))
}

/// Cross-scope variants authenticate against a cluster-level "show" rule on
/// whatever `asset_type` filter is given, since a request spanning several
/// projects cannot be checked against any one project's policy. A request
/// with no `asset_type` filter requires the `cluster:show` rule.
fn cross_scope_asset_type(query: &CrossScopeQuery) -> &str {
    query.asset_type.as_deref().unwrap_or("cluster")
}

pub async fn cross_scope_pending(
    State(state): State<AppState>,
    Query(query): Query<CrossScopeQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<PendingOperationJson>>> {
    let token = auth::extract(&headers)?;
    auth::check(&state, &token, "show", cross_scope_asset_type(&query), "cluster")?;

    let rows = state
        .store
        .pending_operations
        .list_cross_scope(
            query.domain.as_deref(),
            query.project.as_deref(),
            query.asset_type.as_deref(),
        )
        .await?;
    Ok(Json(rows.iter().map(PendingOperationJson::from).collect()))
}

pub async fn cross_scope_recently_failed(
    State(state): State<AppState>,
    Query(query): Query<CrossScopeQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<FinishedOperationJson>>> {
    let token = auth::extract(&headers)?;
    auth::check(&state, &token, "show", cross_scope_asset_type(&query), "cluster")?;

    let rows = state
        .store
        .finished_operations
        .recently_failed(
            None,
            query.domain.as_deref(),
            query.project.as_deref(),
            query.asset_type.as_deref(),
        )
        .await?;
    let rows = filter_still_eligible(&state, rows).await?;
    Ok(Json(rows.iter().map(FinishedOperationJson::from).collect()))
}

pub async fn cross_scope_recently_succeeded(
    State(state): State<AppState>,
    Query(query): Query<CrossScopeQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<FinishedOperationJson>>> {
    let token = auth::extract(&headers)?;
    auth::check(&state, &token, "show", cross_scope_asset_type(&query), "cluster")?;

    let max_age = parse_max_age(query.max_age.as_deref()).map_err(ApiError::bad_request)?;
    let rows = state
        .store
        .finished_operations
        .recently_succeeded(
            None,
            query.domain.as_deref(),
            query.project.as_deref(),
            query.asset_type.as_deref(),
            max_age,
            Utc::now(),
        )
        .await?;
    Ok(Json(rows.iter().map(FinishedOperationJson::from).collect()))
}
