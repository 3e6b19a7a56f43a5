use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;

use crate::error::AppResult;
use crate::extractors::{Caller, OwnerClaimCaller};
use crate::models::{
    AssignResourceOwnerRequest, AssignResourceUserRoleRequest, BatchAssignResourceRequest,
    BatchAssignResponse, DashboardResourceRequest, DashboardResourceResponse,
    DeleteResourceUserRoleQuery, SoftDeleteResourceRequest, TransferResourceOwnerRequest,
};
use crate::store::UserRole;
use crate::AppState;

pub async fn assign_owner(
    State(state): State<Arc<AppState>>,
    caller: OwnerClaimCaller,
    Json(req): Json<AssignResourceOwnerRequest>,
) -> AppResult<Json<UserRole>> {
    let role = state.service.assign_resource_owner(&caller.user_id, req).await?;
    Ok(Json(role))
}

pub async fn transfer_owner(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<TransferResourceOwnerRequest>,
) -> AppResult<()> {
    state.service.transfer_resource_owner(&caller.user_id, req).await
}

pub async fn assign_user_role(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<AssignResourceUserRoleRequest>,
) -> AppResult<Json<UserRole>> {
    let role = state.service.assign_resource_user_role(&caller.user_id, req).await?;
    Ok(Json(role))
}

pub async fn assign_user_roles_batch(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<BatchAssignResourceRequest>,
) -> AppResult<Json<BatchAssignResponse>> {
    let result = state.service.assign_resource_user_roles_batch(&caller.user_id, req).await?;
    Ok(Json(result.into()))
}

pub async fn delete_user_role(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<DeleteResourceUserRoleQuery>,
) -> AppResult<()> {
    state.service.delete_resource_user_role(&caller.user_id, query).await
}

pub async fn soft_delete_resource(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<SoftDeleteResourceRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let affected = state.service.soft_delete_resource(&caller.user_id, req).await?;
    Ok(Json(serde_json::json!({ "deleted": affected })))
}

pub async fn get_dashboard_resource(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<DashboardResourceRequest>,
) -> AppResult<Json<DashboardResourceResponse>> {
    let resp = state.service.get_dashboard_resource(&caller.user_id, req).await?;
    Ok(Json(resp))
}
