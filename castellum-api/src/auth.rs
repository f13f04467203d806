// castellum-api/src/auth.rs
//
// Token extraction for the read/write API (spec §6 "authenticates via a
// bearer token that the core verifies against a policy enforcer"). Token
// *validation* — turning an opaque bearer string into a verified subject,
// roles, project id and domain id — is an external collaborator's job
// (spec §1 "Out of scope: token/policy enforcement"); in this reference
// deployment that collaborator is an upstream Keystone-style auth proxy
// that has already validated the token and forwards its claims as
// `X-Auth-*` headers, the same shape the teacher's driver config assumes
// for `OS_*` credentials. This module only reads those headers.

use std::collections::HashMap;

use axum::http::HeaderMap;
use castellum_policy::BearerToken;

use crate::error::ApiError;

pub fn extract(headers: &HeaderMap) -> Result<BearerToken, ApiError> {
    let subject = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::new(axum::http::StatusCode::UNAUTHORIZED, "Unauthorized", "missing bearer token"))?;

    let roles = headers
        .get("x-auth-roles")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').map(|r| r.trim().to_string()).filter(|r| !r.is_empty()).collect())
        .unwrap_or_default();

    let project_id = headers
        .get("x-auth-project-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let domain_id = headers
        .get("x-auth-domain-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Ok(BearerToken {
        subject: subject.to_string(),
        roles,
        project_id,
        domain_id,
        attributes: HashMap::new(),
    })
}

/// Builds the `rule(attributes)` call every handler makes before touching
/// storage (spec §6: rule names `project:show:<head>` / `project:edit:<head>`).
pub fn check(
    state: &crate::state::AppState,
    token: &BearerToken,
    verb: &str,
    asset_type: &str,
    scope_id: &str,
) -> Result<(), ApiError> {
    let rule = castellum_policy::rule_name(verb, asset_type);
    let mut attributes = HashMap::new();
    attributes.insert("project_id".to_string(), scope_id.to_string());
    if state.policy.check(&rule, token, &attributes) {
        Ok(())
    } else {
        // 404 in preference to 403 whenever revealing existence would leak
        // information is the caller's call per handler (spec §6); plain
        // policy denial with no ambiguity about existence is 403.
        Err(ApiError::forbidden(format!("not permitted: {rule}")))
    }
}
