use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

#[derive(Debug, Deserialize)]
pub struct AssignOwnerRequest {
    pub user_id: String,
    pub namespace: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferOwnerRequest {
    pub user_id: String,
    pub namespace: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignUserRoleRequest {
    pub user_id: String,
    pub role: String,
    pub namespace: String,
    #[serde(default)]
    pub user_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchAssignRequest {
    pub user_ids: Vec<String>,
    pub role: String,
    pub namespace: String,
    #[serde(default)]
    pub user_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteUserRoleQuery {
    pub namespace: String,
    pub user_id: String,
    #[serde(default)]
    pub user_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GetMyRolesQuery {
    pub scope: String,
    #[serde(default)]
    pub resource_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListUserRolesQuery {
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub scope: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct AssignResourceOwnerRequest {
    pub resource_id: String,
    pub resource_type: String,
    #[serde(default)]
    pub parent_resource_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferResourceOwnerRequest {
    pub user_id: String,
    pub resource_id: String,
    pub resource_type: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignResourceUserRoleRequest {
    pub user_id: String,
    pub role: String,
    pub resource_id: String,
    pub resource_type: String,
    #[serde(default)]
    pub parent_resource_id: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchAssignResourceRequest {
    pub user_ids: Vec<String>,
    pub role: String,
    pub resource_id: String,
    pub resource_type: String,
    #[serde(default)]
    pub parent_resource_id: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteResourceUserRoleQuery {
    pub user_id: String,
    pub resource_id: String,
    pub resource_type: String,
    #[serde(default)]
    pub parent_resource_id: Option<String>,
    /// Not consulted by the service (a user holds one non-owner grant
    /// per scope); carried so the enforcement middleware can detect a
    /// widget `viewer` delete and route it through the parent-read
    /// check instead of `remove_member`.
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SoftDeleteResourceRequest {
    pub resource_id: String,
    pub resource_type: String,
    #[serde(default)]
    pub parent_resource_id: Option<String>,
    #[serde(default)]
    pub child_resource_ids: Option<Vec<String>>,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DashboardResourceRequest {
    pub resource_id: String,
    pub resource_type: String,
    #[serde(default)]
    pub child_resource_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DashboardResourceResponse {
    pub resource_id: String,
    pub accessible_widget_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckPermissionRequest {
    pub permission: String,
    pub scope: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub parent_resource_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckPermissionResponse {
    pub allowed: bool,
}

#[derive(Debug, Serialize)]
pub struct BatchAssignResponse {
    pub success_count: usize,
    pub failed_count: usize,
    pub failed_items: Vec<FailedItemResponse>,
}

#[derive(Debug, Serialize)]
pub struct FailedItemResponse {
    pub user_id: String,
    pub reason: String,
}

impl From<crate::store::BulkUpsertResult> for BatchAssignResponse {
    fn from(result: crate::store::BulkUpsertResult) -> Self {
        Self {
            success_count: result.success,
            failed_count: result.failed,
            failed_items: result
                .failed_items
                .into_iter()
                .map(|f| FailedItemResponse {
                    user_id: f.user_id,
                    reason: f.reason,
                })
                .collect(),
        }
    }
}
