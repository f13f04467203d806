// castellum-api/src/handlers/resources.rs
//
// `/v1/projects/{project_id}/resources/{asset_type}` (spec §6).

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use castellum_core::Resource;
use castellum_policy::AuditEvent;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{ResourceJson, ResourcePutBody};
use crate::state::AppState;
use crate::validation::validate_resource_put;
use crate::auth;

fn driver_info_or_404(
    state: &AppState,
    asset_type: &str,
) -> Result<castellum_drivers::DriverInfo, ApiError> {
    state
        .registry
        .get(asset_type)
        .map(|d| d.info().clone())
        .ok_or_else(|| ApiError::not_found(format!("unknown asset-type {asset_type:?}")))
}

pub async fn get_resource(
    State(state): State<AppState>,
    Path((project_id, asset_type)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<ResourceJson>> {
    driver_info_or_404(&state, &asset_type)?;
    let token = auth::extract(&headers)?;
    auth::check(&state, &token, "show", &asset_type, &project_id)?;

    let resource = state
        .store
        .resources
        .find_by_scope_and_type(&project_id, &asset_type)
        .await?
        .ok_or_else(|| ApiError::not_found("resource is not enrolled in this project"))?;

    Ok(Json(ResourceJson::from(&resource)))
}

pub async fn put_resource(
    State(state): State<AppState>,
    Path((project_id, asset_type)): Path<(String, String)>,
    headers: HeaderMap,
    body: Result<Json<ResourcePutBody>, axum::extract::rejection::JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let driver_info = driver_info_or_404(&state, &asset_type)?;
    let token = auth::extract(&headers)?;
    auth::check(&state, &token, "edit", &asset_type, &project_id)?;

    let Json(body) = body.map_err(|e| ApiError::bad_request(format!("malformed request body: {e}")))?;

    let existing = state
        .store
        .resources
        .find_by_scope_and_type(&project_id, &asset_type)
        .await?;

    if let Some(existing) = &existing {
        if existing.seeded {
            return Err(ApiError::conflict("seeded resources cannot be modified through the API"));
        }
    }

    for conflicting_type in state.registry.conflicts_with(&asset_type) {
        if state
            .store
            .resources
            .find_by_scope_and_type(&project_id, conflicting_type)
            .await?
            .is_some()
        {
            return Err(ApiError::conflict(format!(
                "asset-type {asset_type:?} conflicts with already-enabled {conflicting_type:?} in this project"
            )));
        }
    }

    let logic = validate_resource_put(&body, &driver_info).map_err(ApiError::unprocessable)?;

    let domain_id = headers
        .get("x-auth-domain-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let resource = Resource {
        id: existing.as_ref().map(|r| r.id).unwrap_or_else(Uuid::new_v4),
        scope_id: project_id.clone(),
        domain_id,
        asset_type: asset_type.clone(),
        config: body.config.clone(),
        logic,
        scrape_error_message: existing.as_ref().and_then(|r| r.scrape_error_message.clone()),
        next_scrape_at: existing.as_ref().map(|r| r.next_scrape_at).unwrap_or_else(Utc::now),
        scrape_duration_secs: existing.as_ref().and_then(|r| r.scrape_duration_secs),
        seeded: false,
    };

    if let Some(driver) = state.registry.get(&asset_type) {
        driver
            .check_resource_allowed(&resource)
            .await
            .map_err(|e| ApiError::unprocessable(vec![e.to_string()]))?;
    }

    state.store.resources.upsert(&resource).await?;

    state.audit.emit(AuditEvent {
        actor: token.subject.clone(),
        target: format!("{project_id}/{asset_type}"),
        action: if existing.is_some() { "update" } else { "enable" }.to_string(),
        payload: serde_json::to_value(ResourceJson::from(&resource)).unwrap_or_default(),
        recorded_at: Utc::now(),
    });

    Ok((StatusCode::ACCEPTED, Json(ResourceJson::from(&resource))))
}

pub async fn delete_resource(
    State(state): State<AppState>,
    Path((project_id, asset_type)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    driver_info_or_404(&state, &asset_type)?;
    let token = auth::extract(&headers)?;
    auth::check(&state, &token, "edit", &asset_type, &project_id)?;

    let resource = state
        .store
        .resources
        .find_by_scope_and_type(&project_id, &asset_type)
        .await?
        .ok_or_else(|| ApiError::not_found("resource is not enrolled in this project"))?;

    if resource.seeded {
        return Err(ApiError::conflict("seeded resources cannot be modified through the API"));
    }

    state.store.resources.delete(resource.id).await?;

    state.audit.emit(AuditEvent {
        actor: token.subject,
        target: format!("{project_id}/{asset_type}"),
        action: "disable".to_string(),
        payload: serde_json::to_value(ResourceJson::from(&resource)).unwrap_or_default(),
        recorded_at: Utc::now(),
    });

    Ok(StatusCode::NO_CONTENT)
}
