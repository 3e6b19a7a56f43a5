use std::sync::Arc;

use crate::catalog::{OperationPolicy, PolicyCatalog};
use crate::error::{AppError, AppResult};
use crate::models::{
    AssignOwnerRequest, AssignResourceOwnerRequest, AssignResourceUserRoleRequest,
    AssignUserRoleRequest, BatchAssignRequest, BatchAssignResourceRequest,
    CheckPermissionRequest, DashboardResourceRequest, DashboardResourceResponse,
    DeleteResourceUserRoleQuery, DeleteUserRoleQuery, GetMyRolesQuery, HistoryQuery,
    ListUserRolesQuery, SoftDeleteResourceRequest, TransferOwnerRequest,
    TransferResourceOwnerRequest,
};
use crate::policy::{OperationRequest, PolicyEngine};
use crate::store::{
    BulkUpsertResult, FailedItem, HistoryFilter, HistoryOperation, NewHistoryEntry, NewUserRole,
    Page, PagedHistory, ResourceType, RoleFilter, RoleStore, ScopeCoords, ScopeKind, StoreError,
    UserKind, UserRole,
};

use super::normalize;

const SYSTEM_ASSIGNABLE_ROLES: &[&str] = &["admin", "viewer", "dev_user"];
const RESOURCE_ASSIGNABLE_ROLES: &[&str] = &["admin", "editor", "viewer"];
const PARENT_READ_DENIED_REASON: &str = "user must have parent dashboard read permission";

/// Business operations layered over the policy engine and role store.
/// The declarative catalog answers "can the caller perform this
/// operation"; everything here is the imperative invariant that
/// depends on target state: last-owner guards, self-assignment bans,
/// the widget parent-read prerequisite, plus best-effort history
/// recording.
pub struct AuthorizationService {
    store: Arc<dyn RoleStore>,
    catalog: Arc<PolicyCatalog>,
    engine: Arc<PolicyEngine>,
}

impl AuthorizationService {
    pub fn new(store: Arc<dyn RoleStore>, catalog: Arc<PolicyCatalog>, engine: Arc<PolicyEngine>) -> Self {
        Self {
            store,
            catalog,
            engine,
        }
    }

    async fn record_history(&self, entry: NewHistoryEntry) {
        if let Err(err) = self.store.append_history(entry).await {
            tracing::warn!(error = %err, "failed to append history entry");
        }
    }

    // ---- system scope ----------------------------------------------------

    pub async fn assign_system_owner(&self, caller_id: &str, req: AssignOwnerRequest) -> AppResult<UserRole> {
        let namespace = normalize::namespace(&req.namespace)?;
        let target = normalize::user_id(&req.user_id)?;

        let role = self
            .store
            .create_user_role(NewUserRole {
                user_id: target.clone(),
                user_type: UserKind::Member,
                role: "owner".to_string(),
                scope: ScopeCoords::System { namespace: namespace.clone() },
                actor: caller_id.to_string(),
            })
            .await?;

        self.record_history(NewHistoryEntry {
            operation: HistoryOperation::AssignOwner,
            caller_id: caller_id.to_string(),
            scope: ScopeKind::System,
            namespace: Some(namespace),
            resource_id: None,
            resource_type: None,
            target_user_ids: vec![target],
            role: Some("owner".to_string()),
            new_owner_id: None,
            child_resource_ids: None,
        })
        .await;

        Ok(role)
    }

    pub async fn transfer_system_owner(&self, caller_id: &str, req: TransferOwnerRequest) -> AppResult<()> {
        let namespace = normalize::namespace(&req.namespace)?;
        let target = normalize::user_id(&req.user_id)?;

        if target == caller_id {
            return Err(AppError::Forbidden("cannot transfer ownership to self".to_string()));
        }

        self.store
            .transfer_owner_system(&namespace, caller_id, &target, UserKind::Member, caller_id)
            .await?;

        self.record_history(NewHistoryEntry {
            operation: HistoryOperation::TransferOwner,
            caller_id: caller_id.to_string(),
            scope: ScopeKind::System,
            namespace: Some(namespace),
            resource_id: None,
            resource_type: None,
            target_user_ids: vec![],
            role: None,
            new_owner_id: Some(target),
            child_resource_ids: None,
        })
        .await;

        Ok(())
    }

    pub async fn assign_system_user_role(
        &self,
        caller_id: &str,
        req: AssignUserRoleRequest,
    ) -> AppResult<UserRole> {
        let namespace = normalize::namespace(&req.namespace)?;
        let target = normalize::user_id(&req.user_id)?;
        let role = normalize::role(&req.role)?;
        let user_type = normalize::user_type(req.user_type.as_deref());

        self.guard_system_assignable_role(&role)?;
        self.guard_not_sole_owner(&namespace, &target).await?;

        let updated = self
            .store
            .upsert_user_role(NewUserRole {
                user_id: target.clone(),
                user_type,
                role: role.clone(),
                scope: ScopeCoords::System { namespace: namespace.clone() },
                actor: caller_id.to_string(),
            })
            .await?;

        self.record_history(NewHistoryEntry {
            operation: HistoryOperation::AssignUserRole,
            caller_id: caller_id.to_string(),
            scope: ScopeKind::System,
            namespace: Some(namespace),
            resource_id: None,
            resource_type: None,
            target_user_ids: vec![target],
            role: Some(role),
            new_owner_id: None,
            child_resource_ids: None,
        })
        .await;

        Ok(updated)
    }

    pub async fn assign_system_user_roles_batch(
        &self,
        caller_id: &str,
        req: BatchAssignRequest,
    ) -> AppResult<BulkUpsertResult> {
        let namespace = normalize::namespace(&req.namespace)?;
        let role = normalize::role(&req.role)?;
        let user_type = normalize::user_type(req.user_type.as_deref());
        self.guard_system_assignable_role(&role)?;

        let owner = self.store.get_owner(&ScopeCoords::System { namespace: namespace.clone() }).await?;

        let mut valid = Vec::new();
        let mut index_by_user_id: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        let mut rejected: Vec<(usize, FailedItem)> = Vec::new();

        for (idx, raw_user_id) in req.user_ids.iter().enumerate() {
            let target = match normalize::user_id(raw_user_id) {
                Ok(t) => t,
                Err(e) => {
                    rejected.push((idx, FailedItem { user_id: raw_user_id.clone(), reason: e.to_string() }));
                    continue;
                }
            };
            if owner.as_ref().is_some_and(|o| o.user_id == target) {
                rejected.push((
                    idx,
                    FailedItem {
                        user_id: target,
                        reason: "cannot reassign role of the sole owner".to_string(),
                    },
                ));
                continue;
            }
            index_by_user_id.insert(target.clone(), idx);
            valid.push(NewUserRole {
                user_id: target,
                user_type,
                role: role.clone(),
                scope: ScopeCoords::System { namespace: namespace.clone() },
                actor: caller_id.to_string(),
            });
        }

        let store_result = self.store.bulk_upsert_user_roles(valid).await?;
        let result = merge_bulk_results(store_result, &index_by_user_id, rejected);

        self.record_history(NewHistoryEntry {
            operation: HistoryOperation::AssignUserRolesBatch,
            caller_id: caller_id.to_string(),
            scope: ScopeKind::System,
            namespace: Some(namespace),
            resource_id: None,
            resource_type: None,
            target_user_ids: req.user_ids,
            role: Some(role),
            new_owner_id: None,
            child_resource_ids: None,
        })
        .await;

        Ok(result)
    }

    pub async fn delete_system_user_role(&self, caller_id: &str, req: DeleteUserRoleQuery) -> AppResult<()> {
        let namespace = normalize::namespace(&req.namespace)?;
        let target = normalize::user_id(&req.user_id)?;
        let user_type = normalize::user_type(req.user_type.as_deref());

        self.guard_not_sole_owner(&namespace, &target).await?;

        match self
            .store
            .delete_user_role(&target, user_type, &ScopeCoords::System { namespace: namespace.clone() }, caller_id)
            .await
        {
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        self.record_history(NewHistoryEntry {
            operation: HistoryOperation::DeleteUserRole,
            caller_id: caller_id.to_string(),
            scope: ScopeKind::System,
            namespace: Some(namespace),
            resource_id: None,
            resource_type: None,
            target_user_ids: vec![target],
            role: None,
            new_owner_id: None,
            child_resource_ids: None,
        })
        .await;

        Ok(())
    }

    async fn guard_system_assignable_role(&self, role: &str) -> AppResult<()> {
        if role == "owner" {
            return Err(AppError::Forbidden("owner cannot be assigned via the member API".to_string()));
        }
        if !SYSTEM_ASSIGNABLE_ROLES.contains(&role) {
            return Err(AppError::BadRequest(format!("role '{role}' is not assignable")));
        }
        Ok(())
    }

    async fn guard_not_sole_owner(&self, namespace: &str, target: &str) -> AppResult<()> {
        let owner = self.store.get_owner(&ScopeCoords::System { namespace: namespace.to_string() }).await?;
        if owner.is_some_and(|o| o.user_id == target) {
            return Err(AppError::Forbidden("cannot modify the sole owner's grant".to_string()));
        }
        Ok(())
    }

    // ---- resource scope ---------------------------------------------------

    pub async fn assign_resource_owner(
        &self,
        caller_id: &str,
        req: AssignResourceOwnerRequest,
    ) -> AppResult<UserRole> {
        let resource_type = normalize::resource_type(&req.resource_type)?;
        let parent_resource_id = self.require_parent_if_needed(resource_type, req.parent_resource_id)?;

        let role = self
            .store
            .create_user_role(NewUserRole {
                user_id: caller_id.to_string(),
                user_type: UserKind::Member,
                role: "owner".to_string(),
                scope: ScopeCoords::Resource {
                    resource_id: req.resource_id.clone(),
                    resource_type,
                    parent_resource_id,
                },
                actor: caller_id.to_string(),
            })
            .await?;

        self.record_history(NewHistoryEntry {
            operation: HistoryOperation::AssignOwner,
            caller_id: caller_id.to_string(),
            scope: ScopeKind::Resource,
            namespace: None,
            resource_id: Some(req.resource_id),
            resource_type: Some(resource_type),
            target_user_ids: vec![caller_id.to_string()],
            role: Some("owner".to_string()),
            new_owner_id: None,
            child_resource_ids: None,
        })
        .await;

        Ok(role)
    }

    pub async fn transfer_resource_owner(
        &self,
        caller_id: &str,
        req: TransferResourceOwnerRequest,
    ) -> AppResult<()> {
        let resource_type = normalize::resource_type(&req.resource_type)?;
        let target = normalize::user_id(&req.user_id)?;

        if target == caller_id {
            return Err(AppError::Forbidden("cannot transfer ownership to self".to_string()));
        }

        self.store
            .transfer_owner_resource(&req.resource_id, resource_type, caller_id, &target, UserKind::Member, caller_id)
            .await?;

        self.record_history(NewHistoryEntry {
            operation: HistoryOperation::TransferOwner,
            caller_id: caller_id.to_string(),
            scope: ScopeKind::Resource,
            namespace: None,
            resource_id: Some(req.resource_id),
            resource_type: Some(resource_type),
            target_user_ids: vec![],
            role: None,
            new_owner_id: Some(target),
            child_resource_ids: None,
        })
        .await;

        Ok(())
    }

    pub async fn assign_resource_user_role(
        &self,
        caller_id: &str,
        req: AssignResourceUserRoleRequest,
    ) -> AppResult<UserRole> {
        let resource_type = normalize::resource_type(&req.resource_type)?;
        let target = normalize::user_id(&req.user_id)?;
        let role = normalize::role(&req.role)?;
        let user_type = normalize::user_type(req.user_type.as_deref());
        let parent_resource_id = self.require_parent_if_needed(resource_type, req.parent_resource_id.clone())?;

        self.guard_resource_assignable_role(&role)?;
        self.guard_target_not_owner(&target, user_type, &req.resource_id, resource_type).await?;

        if resource_type == ResourceType::DashboardWidget {
            let Some(parent_id) = parent_resource_id.as_deref() else {
                return Err(AppError::BadRequest("parent_resource_id is required".to_string()));
            };
            if !self.target_has_parent_read(&target, user_type, parent_id).await? {
                return Err(AppError::BadRequest(PARENT_READ_DENIED_REASON.to_string()));
            }
        }

        let updated = self
            .store
            .upsert_user_role(NewUserRole {
                user_id: target.clone(),
                user_type,
                role: role.clone(),
                scope: ScopeCoords::Resource {
                    resource_id: req.resource_id.clone(),
                    resource_type,
                    parent_resource_id,
                },
                actor: caller_id.to_string(),
            })
            .await?;

        self.record_history(NewHistoryEntry {
            operation: HistoryOperation::AssignUserRole,
            caller_id: caller_id.to_string(),
            scope: ScopeKind::Resource,
            namespace: None,
            resource_id: Some(req.resource_id),
            resource_type: Some(resource_type),
            target_user_ids: vec![target],
            role: Some(role),
            new_owner_id: None,
            child_resource_ids: None,
        })
        .await;

        Ok(updated)
    }

    pub async fn assign_resource_user_roles_batch(
        &self,
        caller_id: &str,
        req: BatchAssignResourceRequest,
    ) -> AppResult<BulkUpsertResult> {
        let resource_type = normalize::resource_type(&req.resource_type)?;
        let role = normalize::role(&req.role)?;
        let user_type = normalize::user_type(req.user_type.as_deref());
        let parent_resource_id = self.require_parent_if_needed(resource_type, req.parent_resource_id.clone())?;
        self.guard_resource_assignable_role(&role)?;

        let mut valid = Vec::new();
        let mut index_by_user_id: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        let mut rejected: Vec<(usize, FailedItem)> = Vec::new();

        for (idx, raw_user_id) in req.user_ids.iter().enumerate() {
            let target = match normalize::user_id(raw_user_id) {
                Ok(t) => t,
                Err(e) => {
                    rejected.push((idx, FailedItem { user_id: raw_user_id.clone(), reason: e.to_string() }));
                    continue;
                }
            };

            if self.guard_target_not_owner(&target, user_type, &req.resource_id, resource_type).await.is_err() {
                rejected.push((
                    idx,
                    FailedItem {
                        user_id: target,
                        reason: "target already holds owner on this resource".to_string(),
                    },
                ));
                continue;
            }

            if resource_type == ResourceType::DashboardWidget {
                let Some(parent_id) = parent_resource_id.as_deref() else {
                    rejected.push((idx, FailedItem { user_id: target, reason: PARENT_READ_DENIED_REASON.to_string() }));
                    continue;
                };
                match self.target_has_parent_read(&target, user_type, parent_id).await {
                    Ok(true) => {}
                    Ok(false) | Err(_) => {
                        rejected.push((idx, FailedItem { user_id: target, reason: PARENT_READ_DENIED_REASON.to_string() }));
                        continue;
                    }
                }
            }

            index_by_user_id.insert(target.clone(), idx);
            valid.push(NewUserRole {
                user_id: target,
                user_type,
                role: role.clone(),
                scope: ScopeCoords::Resource {
                    resource_id: req.resource_id.clone(),
                    resource_type,
                    parent_resource_id: parent_resource_id.clone(),
                },
                actor: caller_id.to_string(),
            });
        }

        let store_result = self.store.bulk_upsert_user_roles(valid).await?;
        let result = merge_bulk_results(store_result, &index_by_user_id, rejected);

        self.record_history(NewHistoryEntry {
            operation: HistoryOperation::AssignUserRolesBatch,
            caller_id: caller_id.to_string(),
            scope: ScopeKind::Resource,
            namespace: None,
            resource_id: Some(req.resource_id),
            resource_type: Some(resource_type),
            target_user_ids: req.user_ids,
            role: Some(role),
            new_owner_id: None,
            child_resource_ids: None,
        })
        .await;

        Ok(result)
    }

    pub async fn delete_resource_user_role(
        &self,
        caller_id: &str,
        req: DeleteResourceUserRoleQuery,
    ) -> AppResult<()> {
        let resource_type = normalize::resource_type(&req.resource_type)?;
        let target = normalize::user_id(&req.user_id)?;
        let user_type = UserKind::Member;

        self.guard_target_not_owner(&target, user_type, &req.resource_id, resource_type).await?;

        let scope = ScopeCoords::Resource {
            resource_id: req.resource_id.clone(),
            resource_type,
            parent_resource_id: req.parent_resource_id.clone(),
        };

        match self.store.delete_user_role(&target, user_type, &scope, caller_id).await {
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        if resource_type == ResourceType::Dashboard {
            self.cascade_delete_widget_grants(&target, user_type, &req.resource_id, caller_id).await;
        }

        self.record_history(NewHistoryEntry {
            operation: HistoryOperation::DeleteUserRole,
            caller_id: caller_id.to_string(),
            scope: ScopeKind::Resource,
            namespace: None,
            resource_id: Some(req.resource_id),
            resource_type: Some(resource_type),
            target_user_ids: vec![target],
            role: None,
            new_owner_id: None,
            child_resource_ids: None,
        })
        .await;

        Ok(())
    }

    async fn cascade_delete_widget_grants(&self, target: &str, user_type: UserKind, dashboard_id: &str, actor: &str) {
        let filter = RoleFilter {
            user_id: Some(target.to_string()),
            user_type: Some(user_type),
            scope: Some(ScopeKind::Resource),
            resource_type: Some(ResourceType::DashboardWidget),
            ..Default::default()
        };
        let rows = match self.store.find(&filter).await {
            Ok(rows) => rows,
            Err(_) => return,
        };
        for row in rows.into_iter().filter(|r| r.parent_resource_id.as_deref() == Some(dashboard_id)) {
            let scope = ScopeCoords::Resource {
                resource_id: row.resource_id.clone().unwrap_or_default(),
                resource_type: ResourceType::DashboardWidget,
                parent_resource_id: row.parent_resource_id.clone(),
            };
            let _ = self.store.delete_user_role(target, user_type, &scope, actor).await;
        }
    }

    async fn guard_resource_assignable_role(&self, role: &str) -> AppResult<()> {
        if role == "owner" {
            return Err(AppError::Forbidden("owner cannot be assigned via the member API".to_string()));
        }
        if !RESOURCE_ASSIGNABLE_ROLES.contains(&role) {
            return Err(AppError::BadRequest(format!("role '{role}' is not assignable")));
        }
        Ok(())
    }

    async fn guard_target_not_owner(
        &self,
        target: &str,
        user_type: UserKind,
        resource_id: &str,
        resource_type: ResourceType,
    ) -> AppResult<()> {
        let holds_owner = self
            .store
            .has_role(
                target,
                user_type,
                &ScopeCoords::Resource { resource_id: resource_id.to_string(), resource_type, parent_resource_id: None },
                "owner",
            )
            .await?;
        if holds_owner {
            return Err(AppError::Forbidden("target already holds owner on this resource".to_string()));
        }
        Ok(())
    }

    async fn target_has_parent_read(&self, target: &str, user_type: UserKind, parent_id: &str) -> AppResult<bool> {
        let roles = self.engine.roles_with_permission("resource.dashboard.read", false);
        if roles.is_empty() {
            return Ok(false);
        }
        Ok(self
            .store
            .has_any_role(
                target,
                user_type,
                &ScopeCoords::Resource {
                    resource_id: parent_id.to_string(),
                    resource_type: ResourceType::Dashboard,
                    parent_resource_id: None,
                },
                &roles,
            )
            .await?)
    }

    fn require_parent_if_needed(
        &self,
        resource_type: ResourceType,
        parent_resource_id: Option<String>,
    ) -> AppResult<Option<String>> {
        if resource_type.requires_parent() && parent_resource_id.as_deref().unwrap_or("").trim().is_empty() {
            return Err(AppError::BadRequest("parent_resource_id is required for dashboard_widget".to_string()));
        }
        Ok(parent_resource_id)
    }

    pub async fn soft_delete_resource(&self, caller_id: &str, req: SoftDeleteResourceRequest) -> AppResult<u64> {
        let resource_type = normalize::resource_type(&req.resource_type)?;
        let mut ids = vec![req.resource_id.clone()];
        let children = normalize::child_resource_ids(req.child_resource_ids.as_deref().unwrap_or(&[]));
        ids.extend(children.clone());

        let namespace = req.namespace.as_deref().map(normalize::namespace).transpose()?;

        let affected = self
            .store
            .soft_delete_resource_user_roles(&ids, resource_type, namespace.as_deref(), caller_id)
            .await?;

        self.record_history(NewHistoryEntry {
            operation: HistoryOperation::DeleteResource,
            caller_id: caller_id.to_string(),
            scope: ScopeKind::Resource,
            namespace,
            resource_id: Some(req.resource_id),
            resource_type: Some(resource_type),
            target_user_ids: vec![],
            role: None,
            new_owner_id: None,
            child_resource_ids: if children.is_empty() { None } else { Some(children) },
        })
        .await;

        Ok(affected)
    }

    pub async fn get_dashboard_resource(
        &self,
        caller_id: &str,
        req: DashboardResourceRequest,
    ) -> AppResult<DashboardResourceResponse> {
        let dashboard_roles = self.engine.roles_with_permission("resource.dashboard.read", false);
        let widget_roles = self.engine.roles_with_permission("resource.dashboard_widget.read", false);

        let caller_has_dashboard_read = !dashboard_roles.is_empty()
            && self
                .store
                .has_any_role(
                    caller_id,
                    UserKind::Member,
                    &ScopeCoords::Resource { resource_id: req.resource_id.clone(), resource_type: ResourceType::Dashboard, parent_resource_id: None },
                    &dashboard_roles,
                )
                .await?;

        let mut accessible = Vec::new();
        for widget_id in &req.child_resource_ids {
            let live_roles = self.store.count_resource_roles(widget_id, ResourceType::DashboardWidget).await?;
            let accessible_here = if live_roles == 0 {
                caller_has_dashboard_read
            } else if widget_roles.is_empty() {
                false
            } else {
                self.store
                    .has_any_role(
                        caller_id,
                        UserKind::Member,
                        &ScopeCoords::Resource { resource_id: widget_id.clone(), resource_type: ResourceType::DashboardWidget, parent_resource_id: None },
                        &widget_roles,
                    )
                    .await?
            };
            if accessible_here {
                accessible.push(widget_id.clone());
            }
        }

        Ok(DashboardResourceResponse { resource_id: req.resource_id, accessible_widget_ids: accessible })
    }

    // ---- read paths ---------------------------------------------------

    pub async fn get_user_roles_me(
        &self,
        caller_id: &str,
        caller_user_type: UserKind,
        query: GetMyRolesQuery,
    ) -> AppResult<Vec<UserRole>> {
        let scope = parse_scope(&query.scope)?;
        let resource_type = query.resource_type.as_deref().map(normalize::resource_type).transpose()?;

        let filter = RoleFilter {
            user_id: Some(caller_id.to_string()),
            user_type: Some(caller_user_type),
            scope: Some(scope),
            resource_type,
            ..Default::default()
        };
        let roles = self.store.find(&filter).await?;

        let entity = match scope {
            ScopeKind::System => "system".to_string(),
            ScopeKind::Resource => resource_type.map(|t| t.as_str().to_string()).unwrap_or_else(|| "dashboard".to_string()),
        };
        let policy = self.catalog.operation(&entity, "get_my_roles");
        if let Some(policy) = policy {
            let pairs: Vec<(ScopeKind, String)> = roles.iter().map(|r| (r.scope, r.role.clone())).collect();
            if !self.engine.check_roles_have_permission(&pairs, &policy.permission) {
                return Err(AppError::Forbidden("caller's roles do not grant get_my_roles".to_string()));
            }
        }

        Ok(roles)
    }

    pub async fn get_user_roles(&self, caller_id: &str, query: ListUserRolesQuery) -> AppResult<Vec<UserRole>> {
        let scope = query.scope.as_deref().map(parse_scope).transpose()?;
        let resource_type = query.resource_type.as_deref().map(normalize::resource_type).transpose()?;
        let namespace = query.namespace.as_deref().map(normalize::namespace).transpose()?;

        self.authorize_get_members(caller_id, namespace.as_deref(), query.resource_id.as_deref(), resource_type).await?;

        let filter = RoleFilter {
            scope,
            namespace,
            role: query.role,
            resource_id: query.resource_id,
            resource_type,
            ..Default::default()
        };
        Ok(self.store.find(&filter).await?)
    }

    async fn authorize_get_members(
        &self,
        caller_id: &str,
        namespace: Option<&str>,
        resource_id: Option<&str>,
        resource_type: Option<ResourceType>,
    ) -> AppResult<()> {
        let mut authorized = false;

        if let Some(ns) = namespace {
            let roles = self.engine.roles_with_permission("platform.system.get_members", true);
            authorized |= !roles.is_empty()
                && self
                    .store
                    .has_any_role(caller_id, UserKind::Member, &ScopeCoords::System { namespace: ns.to_string() }, &roles)
                    .await?;
        }

        if let (Some(id), Some(rt)) = (resource_id, resource_type) {
            let permission = format!("resource.{}.get_members", rt.as_str());
            let roles = self.engine.roles_with_permission(&permission, false);
            authorized |= !roles.is_empty()
                && self
                    .store
                    .has_any_role(
                        caller_id,
                        UserKind::Member,
                        &ScopeCoords::Resource { resource_id: id.to_string(), resource_type: rt, parent_resource_id: None },
                        &roles,
                    )
                    .await?;
        }

        if namespace.is_none() && resource_id.is_none() {
            return Err(AppError::Forbidden("no scope coordinates to authorize against".to_string()));
        }

        if authorized {
            Ok(())
        } else {
            Err(AppError::Forbidden("caller lacks get_members permission".to_string()))
        }
    }

    pub async fn get_history(&self, caller_id: &str, query: HistoryQuery) -> AppResult<PagedHistory> {
        let scope = parse_scope(&query.scope)?;
        let resource_type = query.resource_type.as_deref().map(normalize::resource_type).transpose()?;
        let namespace = query.namespace.as_deref().map(normalize::namespace).transpose()?;

        match scope {
            ScopeKind::System => {
                let ns = namespace.clone().ok_or_else(|| AppError::BadRequest("namespace is required".to_string()))?;
                let roles = self.engine.roles_with_permission("platform.system.get_logs", true);
                let ok = !roles.is_empty()
                    && self
                        .store
                        .has_any_role(caller_id, UserKind::Member, &ScopeCoords::System { namespace: ns }, &roles)
                        .await?;
                if !ok {
                    return Err(AppError::Forbidden("caller lacks get_logs permission".to_string()));
                }
            }
            ScopeKind::Resource => {
                let id = query.resource_id.clone().ok_or_else(|| AppError::BadRequest("resource_id is required".to_string()))?;
                let rt = resource_type.ok_or_else(|| AppError::BadRequest("resource_type is required".to_string()))?;
                let permission = format!("resource.{}.get_logs", rt.as_str());
                let roles = self.engine.roles_with_permission(&permission, false);
                let ok = !roles.is_empty()
                    && self
                        .store
                        .has_any_role(caller_id, UserKind::Member, &ScopeCoords::Resource { resource_id: id, resource_type: rt, parent_resource_id: None }, &roles)
                        .await?;
                if !ok {
                    return Err(AppError::Forbidden("caller lacks get_logs permission".to_string()));
                }
            }
        }

        let filter = HistoryFilter {
            scope: Some(scope),
            namespace,
            resource_id: query.resource_id,
            resource_type,
            since: query.since,
            until: query.until,
        };
        let page = Page { page: query.page.max(1), page_size: query.page_size.clamp(1, 200) };
        Ok(self.store.query_history(&filter, page).await?)
    }

    pub async fn check_permission(
        &self,
        caller_id: &str,
        caller_user_type: UserKind,
        req: CheckPermissionRequest,
    ) -> AppResult<bool> {
        let scope = parse_scope(&req.scope)?;
        match scope {
            ScopeKind::System => {
                let namespace = req.namespace.as_deref().map(normalize::namespace).transpose()?
                    .ok_or_else(|| AppError::BadRequest("namespace is required".to_string()))?;
                let roles = self.engine.roles_with_permission(&req.permission, true);
                if roles.is_empty() {
                    return Ok(false);
                }
                Ok(self
                    .store
                    .has_any_role(caller_id, caller_user_type, &ScopeCoords::System { namespace }, &roles)
                    .await?)
            }
            ScopeKind::Resource => {
                let resource_id = req.resource_id.ok_or_else(|| AppError::BadRequest("resource_id is required".to_string()))?;
                let resource_type = req
                    .resource_type
                    .as_deref()
                    .map(normalize::resource_type)
                    .transpose()?
                    .ok_or_else(|| AppError::BadRequest("resource_type is required".to_string()))?;

                Ok(self
                    .engine
                    .check_resource_access(
                        &resource_id,
                        resource_type,
                        &req.permission,
                        req.parent_resource_id.as_deref(),
                        caller_id,
                        caller_user_type,
                    )
                    .await?)
            }
        }
    }

    /// Re-derives an `OperationRequest` and resolves a catalog policy
    /// for it, used by call sites that need a declarative check outside
    /// the enforcement middleware (mirrors the `self_roles` re-verify
    /// pattern for other check_scope kinds).
    pub fn resolve(&self, entity: &str, operation: &str) -> Option<OperationPolicy> {
        self.engine.resolve_policy(entity, operation)
    }

    pub async fn recheck(&self, req: &OperationRequest, policy: &OperationPolicy) -> AppResult<bool> {
        Ok(self.engine.check_operation_permission(req, policy).await?)
    }
}

fn parse_scope(raw: &str) -> AppResult<ScopeKind> {
    match raw.trim().to_lowercase().as_str() {
        "system" => Ok(ScopeKind::System),
        "resource" => Ok(ScopeKind::Resource),
        other => Err(AppError::BadRequest(format!("unknown scope: {other}"))),
    }
}

/// Merges store-level failures (identified only by `user_id`) with
/// caller-side pre-store rejections (which carry their original batch
/// position) and restores the request's `user_ids` order. A store
/// failure whose `user_id` can't be traced back to the submitted batch
/// (shouldn't happen — the store only ever sees items this call built)
/// sorts after every traceable entry rather than panicking.
fn merge_bulk_results(
    store_result: BulkUpsertResult,
    index_by_user_id: &std::collections::HashMap<String, usize>,
    rejected: Vec<(usize, FailedItem)>,
) -> BulkUpsertResult {
    let mut indexed: Vec<(usize, FailedItem)> = store_result
        .failed_items
        .into_iter()
        .map(|item| {
            let idx = index_by_user_id.get(&item.user_id).copied().unwrap_or(usize::MAX);
            (idx, item)
        })
        .collect();
    indexed.extend(rejected);
    indexed.sort_by_key(|(idx, _)| *idx);

    let failed_items: Vec<FailedItem> = indexed.into_iter().map(|(_, item)| item).collect();
    BulkUpsertResult {
        success: store_result.success,
        failed: failed_items.len(),
        failed_items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scope_accepts_known_values() {
        assert_eq!(parse_scope("system").unwrap(), ScopeKind::System);
        assert_eq!(parse_scope("RESOURCE").unwrap(), ScopeKind::Resource);
        assert!(parse_scope("tenant").is_err());
    }

    #[test]
    fn merge_bulk_results_preserves_batch_order() {
        // Batch was ["a", "b", "c"]: "a" rejected pre-store at index 0,
        // "b" went to the store and failed, "c" succeeded.
        let store_result = BulkUpsertResult {
            success: 1,
            failed: 1,
            failed_items: vec![FailedItem { user_id: "b".to_string(), reason: "duplicate key".to_string() }],
        };
        let mut index_by_user_id = std::collections::HashMap::new();
        index_by_user_id.insert("b".to_string(), 1);
        index_by_user_id.insert("c".to_string(), 2);
        let rejected = vec![(0, FailedItem { user_id: "a".to_string(), reason: "manual".to_string() })];

        let merged = merge_bulk_results(store_result, &index_by_user_id, rejected);
        assert_eq!(merged.success, 1);
        assert_eq!(merged.failed, 2);
        assert_eq!(
            merged.failed_items.iter().map(|f| f.user_id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }
}
