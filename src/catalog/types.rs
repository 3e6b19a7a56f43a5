use std::collections::HashMap;

use serde::Deserialize;

/// check_scope dispatch target for an `OperationPolicy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckScope {
    None,
    System,
    Resource,
    ParentResource,
    SelfRoles,
}

/// A single entry in an entity's `operations` map.
/// The `method`/`path`/`params`/`condition` fields are only present on
/// records that also drive the enforcement middleware; purely
/// service-level operations (e.g. `assign_viewer`, produced only by
/// request normalization remapping) omit them.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationPolicy {
    pub permission: String,
    pub check_scope: CheckScope,
    #[serde(default)]
    pub namespace_required: bool,
    #[serde(default)]
    pub parent_resource_required: bool,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    /// param name -> source spec, e.g. `"body.namespace"`, `"query.user_id"`.
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// condition source -> expected literal value, used for
    /// disambiguating multiple configs registered at the same
    /// `METHOD:PATH` key.
    #[serde(default)]
    pub condition: HashMap<String, String>,
}

/// One document per entity (`system`, `dashboard`,
/// `dashboard_widget`, `library_widget`).
#[derive(Debug, Clone, Deserialize)]
pub struct EntityPolicy {
    pub entity: String,
    pub scope: String,
    #[serde(default)]
    pub parent_entity: Option<String>,
    pub operations: HashMap<String, OperationPolicy>,
}

/// One entry per resource type, consulted by the resource-access and
/// check-permission checks for the `parent_if_no_roles` rule.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckPermissionRule {
    pub inheritance_mode: InheritanceMode,
    #[serde(default)]
    pub parent_type: Option<String>,
    #[serde(default)]
    pub permission_remap: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceMode {
    None,
    ParentIfNoRoles,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckPermissionConfig {
    pub resource_types: HashMap<String, CheckPermissionRule>,
}

/// Role-to-permission table, loaded once at startup, read-only thereafter.
#[derive(Debug, Clone, Deserialize)]
pub struct RolePermissions {
    pub system: HashMap<String, Vec<String>>,
    pub resource: HashMap<String, Vec<String>>,
}

impl RolePermissions {
    pub fn system_role_has(&self, role: &str, permission: &str) -> bool {
        self.system
            .get(role)
            .is_some_and(|perms| perms.iter().any(|p| p == permission))
    }

    pub fn resource_role_has(&self, role: &str, permission: &str) -> bool {
        self.resource
            .get(role)
            .is_some_and(|perms| perms.iter().any(|p| p == permission))
    }

    /// Inverse lookup: every role name, in the given partition, whose permission list
    /// contains `permission`. Sorted for deterministic downstream set
    /// membership probes.
    pub fn roles_with_permission(&self, permission: &str, is_system: bool) -> Vec<String> {
        let map = if is_system { &self.system } else { &self.resource };
        let mut roles: Vec<String> = map
            .iter()
            .filter(|(_, perms)| perms.iter().any(|p| p == permission))
            .map(|(role, _)| role.clone())
            .collect();
        roles.sort();
        roles
    }
}

/// Parsed `"source.field"` param/condition reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource {
    Body,
    Query,
    Path,
    Header,
}

impl ParamSource {
    /// Splits `"body.user_id"` into `(Body, "user_id")`. Unknown
    /// prefixes default to `Body`, matching the catalog's own
    /// documents which never emit anything else.
    pub fn parse(spec: &str) -> (Self, &str) {
        match spec.split_once('.') {
            Some(("body", field)) => (ParamSource::Body, field),
            Some(("query", field)) => (ParamSource::Query, field),
            Some(("path", field)) => (ParamSource::Path, field),
            Some(("header", field)) => (ParamSource::Header, field),
            _ => (ParamSource::Body, spec),
        }
    }
}
