use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{FromRequestParts, Query, RawPathParams, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::catalog::{ParamSource, RouteConfig};
use crate::error::AppError;
use crate::policy::OperationRequest;
use crate::store::{ResourceType, ScopeKind, UserKind};
use crate::AppState;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Resolves the inbound method+path against the policy catalog,
/// disambiguates by condition when more than one entity shares a
/// route, and denies the request before it reaches a handler unless
/// the resolved policy's permission check passes. Requests with no
/// catalog entry at all pass straight through — the route simply
/// isn't part of the declarative surface (health, metrics, ...).
pub async fn enforce(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Result<Response, AppError> {
    let method = request.method().as_str().to_uppercase();
    let path = request.uri().path().to_string();

    let Some(candidates) = state.catalog.route(&method, &path) else {
        return Ok(next.run(request).await);
    };
    let candidates = candidates.to_vec();

    let (mut parts, body) = request.into_parts();

    let caller_id = parts
        .headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized("missing x-user-id header".to_string()))?
        .to_string();

    let query: HashMap<String, String> = Query::from_request_parts(&mut parts, &state)
        .await
        .map(|Query(q)| q)
        .unwrap_or_default();

    let path_params: HashMap<String, String> = RawPathParams::from_request_parts(&mut parts, &state)
        .await
        .map(|p| p.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
        .unwrap_or_default();

    let body_bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::BadRequest("request body too large or unreadable".to_string()))?;
    let body_json: serde_json::Value = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(serde_json::Value::Null)
    };

    let sources = Sources { body: &body_json, query: &query, path: &path_params, headers: &parts.headers };

    let route_config = candidates
        .iter()
        .find(|c| condition_matches(&c.policy.condition, &sources))
        .ok_or_else(|| AppError::BadRequest("no policy matches this request's condition fields".to_string()))?;

    let op_request = build_operation_request(route_config, &sources, &caller_id);
    let (op_request, resolved) = state.engine.normalize_and_resolve(op_request);
    let policy = resolved.unwrap_or_else(|| route_config.policy.clone());

    let allowed = state.engine.check_operation_permission(&op_request, &policy).await?;
    if !allowed {
        return Err(AppError::Forbidden(format!("caller lacks permission '{}'", policy.permission)));
    }

    let request = Request::from_parts(parts, Body::from(body_bytes));
    Ok(next.run(request).await)
}

struct Sources<'a> {
    body: &'a serde_json::Value,
    query: &'a HashMap<String, String>,
    path: &'a HashMap<String, String>,
    headers: &'a axum::http::HeaderMap,
}

impl Sources<'_> {
    fn get(&self, spec: &str) -> Option<String> {
        let (source, field) = ParamSource::parse(spec);
        match source {
            ParamSource::Body => self.body.get(field).and_then(|v| v.as_str()).map(str::to_string),
            ParamSource::Query => self.query.get(field).cloned(),
            ParamSource::Path => self.path.get(field).cloned(),
            ParamSource::Header => self
                .headers
                .get(field)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }
}

fn condition_matches(condition: &HashMap<String, String>, sources: &Sources<'_>) -> bool {
    condition.iter().all(|(spec, expected)| sources.get(spec).as_deref() == Some(expected.as_str()))
}

fn build_operation_request(route_config: &RouteConfig, sources: &Sources<'_>, caller_id: &str) -> OperationRequest {
    let namespace = route_config
        .policy
        .params
        .get("namespace")
        .and_then(|spec| sources.get(spec));
    let resource_id = route_config
        .policy
        .params
        .get("resource_id")
        .and_then(|spec| sources.get(spec));
    let resource_type = route_config
        .policy
        .params
        .get("resource_type")
        .and_then(|spec| sources.get(spec))
        .and_then(|rt| ResourceType::parse(&rt));
    let parent_resource_id = route_config
        .policy
        .params
        .get("parent_resource_id")
        .and_then(|spec| sources.get(spec));
    let role = route_config.policy.params.get("role").and_then(|spec| sources.get(spec));

    let scope = if route_config.entity == "system" { ScopeKind::System } else { ScopeKind::Resource };

    OperationRequest {
        entity: Some(route_config.entity.clone()),
        operation: route_config.operation.clone(),
        scope: Some(scope),
        caller_id: caller_id.to_string(),
        caller_user_type: UserKind::Member,
        namespace,
        resource_id,
        resource_type,
        parent_resource_id,
        role,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_matches_requires_every_entry() {
        let body = serde_json::json!({ "resource_type": "dashboard" });
        let query = HashMap::new();
        let path = HashMap::new();
        let headers = axum::http::HeaderMap::new();
        let sources = Sources { body: &body, query: &query, path: &path, headers: &headers };

        let mut condition = HashMap::new();
        condition.insert("body.resource_type".to_string(), "dashboard".to_string());
        assert!(condition_matches(&condition, &sources));

        condition.insert("body.resource_type".to_string(), "library_widget".to_string());
        assert!(!condition_matches(&condition, &sources));
    }

    #[test]
    fn condition_matches_vacuously_with_no_entries() {
        let body = serde_json::Value::Null;
        let query = HashMap::new();
        let path = HashMap::new();
        let headers = axum::http::HeaderMap::new();
        let sources = Sources { body: &body, query: &query, path: &path, headers: &headers };
        assert!(condition_matches(&HashMap::new(), &sources));
    }
}
