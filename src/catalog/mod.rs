pub mod types;

pub use types::*;

use std::collections::HashMap;

use thiserror::Error;

const SYSTEM_JSON: &str = include_str!("../policies/entities/system.json");
const DASHBOARD_JSON: &str = include_str!("../policies/entities/dashboard.json");
const DASHBOARD_WIDGET_JSON: &str = include_str!("../policies/entities/dashboard_widget.json");
const LIBRARY_WIDGET_JSON: &str = include_str!("../policies/entities/library_widget.json");
const CHECK_PERMISSION_JSON: &str = include_str!("../policies/check_permission.json");
const ROLE_PERMISSIONS_JSON: &str = include_str!("../policies/role_permissions.json");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse embedded policy document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One route-index entry: the owning entity and operation name plus
/// its policy, kept together so a condition match can report back
/// which (entity, operation) it resolved to for re-resolution after
/// normalization (the dashboard_widget viewer redirect changes which
/// operation — and so which policy — actually governs the call).
#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub entity: String,
    pub operation: String,
    pub policy: OperationPolicy,
}

/// Loaded once at process start. Load failures are fatal —
/// `PolicyCatalog::load` is called from `main` before the server
/// starts accepting connections.
pub struct PolicyCatalog {
    entities: HashMap<String, EntityPolicy>,
    check_permission: CheckPermissionConfig,
    role_permissions: RolePermissions,
    /// `"METHOD:PATH"` -> ordered configs, multiple entries permitting
    /// condition-based disambiguation.
    routes: HashMap<String, Vec<RouteConfig>>,
}

impl PolicyCatalog {
    pub fn load() -> Result<Self, CatalogError> {
        let documents = [SYSTEM_JSON, DASHBOARD_JSON, DASHBOARD_WIDGET_JSON, LIBRARY_WIDGET_JSON];
        let mut entities = HashMap::new();
        for doc in documents {
            let policy: EntityPolicy = serde_json::from_str(doc)?;
            entities.insert(policy.entity.clone(), policy);
        }

        let check_permission: CheckPermissionConfig = serde_json::from_str(CHECK_PERMISSION_JSON)?;
        let role_permissions: RolePermissions = serde_json::from_str(ROLE_PERMISSIONS_JSON)?;

        let mut routes: HashMap<String, Vec<RouteConfig>> = HashMap::new();
        for entity in entities.values() {
            for (op_name, op) in entity.operations.iter() {
                let (Some(method), Some(path)) = (&op.method, &op.path) else {
                    continue;
                };
                let key = format!("{}:{}", method.to_uppercase(), path);
                routes.entry(key).or_default().push(RouteConfig {
                    entity: entity.entity.clone(),
                    operation: op_name.clone(),
                    policy: op.clone(),
                });
            }
        }

        Ok(Self {
            entities,
            check_permission,
            role_permissions,
            routes,
        })
    }

    pub fn entity(&self, name: &str) -> Option<&EntityPolicy> {
        self.entities.get(name)
    }

    pub fn operation(&self, entity: &str, operation: &str) -> Option<&OperationPolicy> {
        self.entities.get(entity)?.operations.get(operation)
    }

    pub fn route(&self, method: &str, path: &str) -> Option<&[RouteConfig]> {
        self.routes
            .get(&format!("{}:{}", method.to_uppercase(), path))
            .map(Vec::as_slice)
    }

    pub fn check_permission_rule(&self, resource_type: &str) -> Option<&CheckPermissionRule> {
        self.check_permission.resource_types.get(resource_type)
    }

    pub fn role_permissions(&self) -> &RolePermissions {
        &self.role_permissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_all_embedded_documents() {
        let catalog = PolicyCatalog::load().expect("embedded catalog documents must parse");
        assert!(catalog.entity("system").is_some());
        assert!(catalog.entity("dashboard").is_some());
        assert!(catalog.entity("dashboard_widget").is_some());
        assert!(catalog.entity("library_widget").is_some());
    }

    #[test]
    fn route_index_disambiguates_by_condition() {
        let catalog = PolicyCatalog::load().unwrap();
        let configs = catalog
            .route("POST", "/api/v1/user_roles/resources")
            .expect("three resource types share this route");
        assert_eq!(configs.len(), 3);
    }

    #[test]
    fn dashboard_widget_requires_parent_on_assign() {
        let catalog = PolicyCatalog::load().unwrap();
        let op = catalog
            .operation("dashboard_widget", "assign_user_role")
            .unwrap();
        assert!(op.parent_resource_required);
    }

    #[test]
    fn widget_inherits_from_dashboard_when_unassigned() {
        let catalog = PolicyCatalog::load().unwrap();
        let rule = catalog.check_permission_rule("dashboard_widget").unwrap();
        assert_eq!(rule.inheritance_mode, InheritanceMode::ParentIfNoRoles);
        assert_eq!(rule.parent_type.as_deref(), Some("dashboard"));
    }

    #[test]
    fn owner_role_carries_every_resource_permission_the_system_defines() {
        let catalog = PolicyCatalog::load().unwrap();
        let perms = catalog.role_permissions();
        assert!(perms.resource_role_has("owner", "resource.dashboard.transfer_owner"));
        assert!(!perms.resource_role_has("viewer", "resource.dashboard.transfer_owner"));
    }
}
