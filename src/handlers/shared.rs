use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;

use crate::error::AppResult;
use crate::extractors::Caller;
use crate::models::{
    CheckPermissionRequest, CheckPermissionResponse, GetMyRolesQuery, HistoryQuery,
    ListUserRolesQuery,
};
use crate::store::{PagedHistory, UserKind, UserRole};
use crate::AppState;

/// `GET /api/v1/user_roles/me` — shared across every entity, which
/// query parameter disambiguates scope/resource_type rather than path.
pub async fn get_my_roles(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<GetMyRolesQuery>,
) -> AppResult<Json<Vec<UserRole>>> {
    let roles = state
        .service
        .get_user_roles_me(&caller.user_id, UserKind::Member, query)
        .await?;
    Ok(Json(roles))
}

/// `GET /api/v1/user_roles`.
pub async fn get_members(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<ListUserRolesQuery>,
) -> AppResult<Json<Vec<UserRole>>> {
    let roles = state.service.get_user_roles(&caller.user_id, query).await?;
    Ok(Json(roles))
}

/// `GET /api/v1/user_roles/logs`.
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<PagedHistory>> {
    let page = state.service.get_history(&caller.user_id, query).await?;
    Ok(Json(page))
}

/// `POST /api/v1/permissions/check` — not part of the declarative
/// enforcement surface; the permission and scope to evaluate arrive as
/// payload fields rather than being derived from method+path.
pub async fn check_permission(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<CheckPermissionRequest>,
) -> AppResult<Json<CheckPermissionResponse>> {
    let allowed = state
        .service
        .check_permission(&caller.user_id, UserKind::Member, req)
        .await?;
    Ok(Json(CheckPermissionResponse { allowed }))
}
