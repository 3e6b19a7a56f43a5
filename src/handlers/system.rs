use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;

use crate::error::AppResult;
use crate::extractors::{Caller, OwnerClaimCaller};
use crate::models::{
    AssignOwnerRequest, AssignUserRoleRequest, BatchAssignRequest, BatchAssignResponse,
    DeleteUserRoleQuery, TransferOwnerRequest,
};
use crate::store::UserRole;
use crate::AppState;

pub async fn assign_owner(
    State(state): State<Arc<AppState>>,
    caller: OwnerClaimCaller,
    Json(req): Json<AssignOwnerRequest>,
) -> AppResult<Json<UserRole>> {
    let role = state.service.assign_system_owner(&caller.user_id, req).await?;
    Ok(Json(role))
}

pub async fn transfer_owner(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<TransferOwnerRequest>,
) -> AppResult<()> {
    state.service.transfer_system_owner(&caller.user_id, req).await
}

pub async fn assign_user_role(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<AssignUserRoleRequest>,
) -> AppResult<Json<UserRole>> {
    let role = state.service.assign_system_user_role(&caller.user_id, req).await?;
    Ok(Json(role))
}

pub async fn assign_user_roles_batch(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<BatchAssignRequest>,
) -> AppResult<Json<BatchAssignResponse>> {
    let result = state.service.assign_system_user_roles_batch(&caller.user_id, req).await?;
    Ok(Json(result.into()))
}

pub async fn delete_user_role(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<DeleteUserRoleQuery>,
) -> AppResult<()> {
    state.service.delete_system_user_role(&caller.user_id, query).await
}
