use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use thiserror::Error;

use crate::catalog::{CheckScope, InheritanceMode, OperationPolicy, PolicyCatalog};
use crate::store::{ResourceType, RoleFilter, RoleStore, ScopeCoords, ScopeKind, StoreError, UserKind};

use super::types::OperationRequest;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("operation requires a parent_resource_id that was not supplied")]
    MissingParent,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The data-driven permission evaluator. Holds no state beyond its two
/// read-only collaborators plus a short-lived role cache; safe to
/// share across workers once built.
pub struct PolicyEngine {
    catalog: Arc<PolicyCatalog>,
    store: Arc<dyn RoleStore>,
    /// Caller's live roles at a scope, keyed by caller+scope: fetch
    /// the full live-role set once, then check membership in memory
    /// on every subsequent permission check within the TTL window.
    roles_cache: Cache<String, Vec<String>>,
}

impl PolicyEngine {
    pub fn new(catalog: Arc<PolicyCatalog>, store: Arc<dyn RoleStore>, cache_ttl: Duration) -> Self {
        let roles_cache = Cache::builder().time_to_live(cache_ttl).max_capacity(10_000).build();
        Self {
            catalog,
            store,
            roles_cache,
        }
    }

    fn cache_key(caller_id: &str, caller_user_type: UserKind, scope: &ScopeCoords) -> String {
        match scope {
            ScopeCoords::System { namespace } => {
                format!("sys:{caller_id}:{}:{namespace}", caller_user_type.as_str())
            }
            ScopeCoords::Resource {
                resource_id,
                resource_type,
                ..
            } => format!(
                "res:{caller_id}:{}:{}:{resource_id}",
                caller_user_type.as_str(),
                resource_type.as_str()
            ),
        }
    }

    async fn roles_for_caller(
        &self,
        caller_id: &str,
        caller_user_type: UserKind,
        scope: &ScopeCoords,
    ) -> Result<Vec<String>, EngineError> {
        let key = Self::cache_key(caller_id, caller_user_type, scope);
        if let Some(roles) = self.roles_cache.get(&key).await {
            return Ok(roles);
        }

        let filter = match scope {
            ScopeCoords::System { namespace } => RoleFilter {
                user_id: Some(caller_id.to_string()),
                user_type: Some(caller_user_type),
                scope: Some(ScopeKind::System),
                namespace: Some(namespace.clone()),
                ..Default::default()
            },
            ScopeCoords::Resource {
                resource_id,
                resource_type,
                ..
            } => RoleFilter {
                user_id: Some(caller_id.to_string()),
                user_type: Some(caller_user_type),
                scope: Some(ScopeKind::Resource),
                resource_id: Some(resource_id.clone()),
                resource_type: Some(*resource_type),
                ..Default::default()
            },
        };

        let rows = self.store.find(&filter).await?;
        let roles: Vec<String> = rows.into_iter().filter(|r| r.is_live()).map(|r| r.role).collect();
        self.roles_cache.insert(key, roles.clone()).await;
        Ok(roles)
    }

    async fn has_any_role_cached(
        &self,
        caller_id: &str,
        caller_user_type: UserKind,
        scope: &ScopeCoords,
        roles: &[String],
    ) -> Result<bool, EngineError> {
        let held = self.roles_for_caller(caller_id, caller_user_type, scope).await?;
        Ok(roles.iter().any(|r| held.contains(r)))
    }

    /// `ResolvePolicy(entity, operation) -> OperationPolicy | Unknown`.
    pub fn resolve_policy(&self, entity: &str, operation: &str) -> Option<OperationPolicy> {
        self.catalog.operation(entity, operation).cloned()
    }

    /// Normalizes a request and re-resolves its policy against the
    /// (possibly rewritten) operation name. Used by the enforcement
    /// middleware, which only knows the route's nominal operation
    /// before the widget viewer redirect has had a chance to run.
    pub fn normalize_and_resolve(&self, mut req: OperationRequest) -> (OperationRequest, Option<OperationPolicy>) {
        self.normalize_request(&mut req);
        let entity = req.entity.clone().unwrap_or_default();
        let policy = self.resolve_policy(&entity, &req.operation);
        (req, policy)
    }

    /// Entity inference plus the widget viewer-redirection rule.
    pub fn normalize_request(&self, req: &mut OperationRequest) {
        if req.entity.is_none() {
            req.entity = Some(match req.scope {
                Some(ScopeKind::System) => "system".to_string(),
                _ => req
                    .resource_type
                    .map(|rt| rt.as_str().to_string())
                    .unwrap_or_else(|| "system".to_string()),
            });
        }

        let is_widget = matches!(req.resource_type, Some(ResourceType::DashboardWidget));
        let is_viewer_target = req.role.as_deref() == Some("viewer");

        if is_widget && is_viewer_target {
            req.operation = match req.operation.as_str() {
                "assign_user_role" => "assign_viewer".to_string(),
                "assign_user_roles_batch" => "assign_viewers_batch".to_string(),
                "delete_user_role" => "delete_viewer".to_string(),
                other => other.to_string(),
            };
        }
    }

    /// `CheckOperationPermission(req) -> bool`.
    pub async fn check_operation_permission(
        &self,
        req: &OperationRequest,
        policy: &OperationPolicy,
    ) -> Result<bool, EngineError> {
        match policy.check_scope {
            CheckScope::None => Ok(true),
            CheckScope::SelfRoles => Ok(true),
            CheckScope::System => {
                let namespace = req.namespace.as_deref().unwrap_or_default();
                let roles = self
                    .catalog
                    .role_permissions()
                    .roles_with_permission(&policy.permission, true);
                if roles.is_empty() {
                    return Ok(false);
                }
                self.has_any_role_cached(
                    &req.caller_id,
                    req.caller_user_type,
                    &ScopeCoords::System {
                        namespace: namespace.to_string(),
                    },
                    &roles,
                )
                .await
            }
            CheckScope::Resource => {
                let Some(resource_id) = req.resource_id.clone() else {
                    return Ok(false);
                };
                let Some(resource_type) = req.resource_type else {
                    return Ok(false);
                };
                self.check_resource_permission(req, &resource_id, resource_type, &policy.permission)
                    .await
            }
            CheckScope::ParentResource => {
                let Some(parent_id) = req.parent_resource_id.clone() else {
                    return Err(EngineError::MissingParent);
                };
                let parent_entity = req
                    .entity
                    .as_deref()
                    .and_then(|e| self.catalog.entity(e))
                    .and_then(|e| e.parent_entity.clone())
                    .unwrap_or_else(|| "dashboard".to_string());
                let parent_type = ResourceType::parse(&parent_entity).unwrap_or(ResourceType::Dashboard);
                self.check_resource_permission(req, &parent_id, parent_type, &policy.permission)
                    .await
            }
        }
    }

    async fn check_resource_permission(
        &self,
        req: &OperationRequest,
        resource_id: &str,
        resource_type: ResourceType,
        permission: &str,
    ) -> Result<bool, EngineError> {
        let roles = self
            .catalog
            .role_permissions()
            .roles_with_permission(permission, false);
        if roles.is_empty() {
            return Ok(false);
        }
        self.has_any_role_cached(
            &req.caller_id,
            req.caller_user_type,
            &ScopeCoords::Resource {
                resource_id: resource_id.to_string(),
                resource_type,
                parent_resource_id: None,
            },
            &roles,
        )
        .await
    }

    /// `GetRolesWithPermission`.
    pub fn roles_with_permission(&self, permission: &str, is_system: bool) -> Vec<String> {
        self.catalog.role_permissions().roles_with_permission(permission, is_system)
    }

    /// `CheckRolesHavePermission` — checks a caller-supplied
    /// `(scope, role)` list against the union of both permission
    /// partitions.
    pub fn check_roles_have_permission(&self, roles: &[(ScopeKind, String)], permission: &str) -> bool {
        let perms = self.catalog.role_permissions();
        roles.iter().any(|(scope, role)| match scope {
            ScopeKind::System => perms.system_role_has(role, permission),
            ScopeKind::Resource => perms.resource_role_has(role, permission),
        })
    }

    /// `CheckResourceAccess` — implements `parent_if_no_roles`: a
    /// resource with at least one live role assignment is checked in
    /// whitelist mode (strictly against itself); otherwise falls
    /// through to the parent with the rule's permission remap
    /// applied, if the rule declares one.
    pub async fn check_resource_access(
        &self,
        resource_id: &str,
        resource_type: ResourceType,
        permission: &str,
        parent_id: Option<&str>,
        caller_id: &str,
        caller_user_type: crate::store::UserKind,
    ) -> Result<bool, EngineError> {
        let live_roles = self.store.count_resource_roles(resource_id, resource_type).await?;

        if live_roles > 0 {
            return self
                .resource_has_permission(resource_id, resource_type, permission, caller_id, caller_user_type)
                .await;
        }

        let rule = self.catalog.check_permission_rule(resource_type.as_str());
        let inherits = rule.is_some_and(|r| r.inheritance_mode == InheritanceMode::ParentIfNoRoles);
        if !inherits {
            return self
                .resource_has_permission(resource_id, resource_type, permission, caller_id, caller_user_type)
                .await;
        }

        let Some(parent_id) = parent_id else {
            return Ok(false);
        };
        let rule = rule.unwrap();
        let Some(parent_type_name) = rule.parent_type.as_deref() else {
            return Ok(false);
        };
        let parent_type = ResourceType::parse(parent_type_name).unwrap_or(ResourceType::Dashboard);
        let remapped = rule
            .permission_remap
            .get(permission)
            .map(String::as_str)
            .unwrap_or(permission);

        self.resource_has_permission(parent_id, parent_type, remapped, caller_id, caller_user_type)
            .await
    }

    async fn resource_has_permission(
        &self,
        resource_id: &str,
        resource_type: ResourceType,
        permission: &str,
        caller_id: &str,
        caller_user_type: crate::store::UserKind,
    ) -> Result<bool, EngineError> {
        let roles = self.catalog.role_permissions().roles_with_permission(permission, false);
        if roles.is_empty() {
            return Ok(false);
        }
        self.has_any_role_cached(
            caller_id,
            caller_user_type,
            &ScopeCoords::Resource {
                resource_id: resource_id.to_string(),
                resource_type,
                parent_resource_id: None,
            },
            &roles,
        )
        .await
    }
}
