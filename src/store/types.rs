use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two kinds of principal a grant can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserKind {
    #[default]
    Member,
    Org,
}

impl UserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserKind::Member => "member",
            UserKind::Org => "org",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(UserKind::Member),
            "org" => Some(UserKind::Org),
            _ => None,
        }
    }
}

/// The resource types that can carry resource-scoped grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Dashboard,
    DashboardWidget,
    LibraryWidget,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Dashboard => "dashboard",
            ResourceType::DashboardWidget => "dashboard_widget",
            ResourceType::LibraryWidget => "library_widget",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "dashboard" => Some(ResourceType::Dashboard),
            "dashboard_widget" => Some(ResourceType::DashboardWidget),
            "library_widget" => Some(ResourceType::LibraryWidget),
            _ => None,
        }
    }

    /// Resource types that carry a mandatory `parent_resource_id`.
    pub fn requires_parent(&self) -> bool {
        matches!(self, ResourceType::DashboardWidget)
    }
}

/// Tagged scope variant. The wire format preserves the strings
/// `"system"`/`"resource"`; everything downstream matches on this enum
/// instead of inspecting a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeCoords {
    System {
        namespace: String,
    },
    Resource {
        resource_id: String,
        resource_type: ResourceType,
        parent_resource_id: Option<String>,
    },
}

impl ScopeCoords {
    pub fn kind(&self) -> ScopeKind {
        match self {
            ScopeCoords::System { .. } => ScopeKind::System,
            ScopeCoords::Resource { .. } => ScopeKind::Resource,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    System,
    Resource,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::System => "system",
            ScopeKind::Resource => "resource",
        }
    }
}

/// A grant, possibly soft-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRole {
    pub id: Uuid,
    pub user_id: String,
    pub user_type: UserKind,
    pub role: String,
    pub scope: ScopeKind,
    pub namespace: Option<String>,
    pub resource_id: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub parent_resource_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub updated_by: String,
    pub deleted_by: Option<String>,
}

impl UserRole {
    pub fn is_owner(&self) -> bool {
        self.role == "owner"
    }

    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Row shape as it comes back from either `system_roles` or
/// `resource_roles`; kept separate from `UserRole` since sqlx decodes
/// plain `TEXT` columns, not our enums.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRoleRow {
    pub id: Uuid,
    pub user_id: String,
    pub user_type: String,
    pub role: String,
    pub namespace: Option<String>,
    pub resource_id: Option<String>,
    pub resource_type: Option<String>,
    pub parent_resource_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub updated_by: String,
    pub deleted_by: Option<String>,
}

impl UserRoleRow {
    pub fn into_system(self) -> UserRole {
        UserRole {
            id: self.id,
            user_id: self.user_id,
            user_type: UserKind::parse(&self.user_type).unwrap_or(UserKind::Member),
            role: self.role,
            scope: ScopeKind::System,
            namespace: self.namespace,
            resource_id: None,
            resource_type: None,
            parent_resource_id: None,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            created_by: self.created_by,
            updated_by: self.updated_by,
            deleted_by: self.deleted_by,
        }
    }

    pub fn into_resource(self) -> UserRole {
        UserRole {
            id: self.id,
            user_id: self.user_id,
            user_type: UserKind::parse(&self.user_type).unwrap_or(UserKind::Member),
            role: self.role,
            scope: ScopeKind::Resource,
            namespace: None,
            resource_id: self.resource_id,
            resource_type: self.resource_type.as_deref().and_then(ResourceType::parse),
            parent_resource_id: self.parent_resource_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            created_by: self.created_by,
            updated_by: self.updated_by,
            deleted_by: self.deleted_by,
        }
    }
}

/// Parameters for a create/upsert against either scope partition.
#[derive(Debug, Clone)]
pub struct NewUserRole {
    pub user_id: String,
    pub user_type: UserKind,
    pub role: String,
    pub scope: ScopeCoords,
    pub actor: String,
}

/// Filter for listing grants. `scope: None` searches both partitions
/// and unions the results.
#[derive(Debug, Clone, Default)]
pub struct RoleFilter {
    pub user_id: Option<String>,
    pub user_type: Option<UserKind>,
    pub scope: Option<ScopeKind>,
    pub namespace: Option<String>,
    pub role: Option<String>,
    pub resource_id: Option<String>,
    pub resource_type: Option<ResourceType>,
}

/// Result of a batch upsert — partial success, not raised.
#[derive(Debug, Clone, Serialize)]
pub struct BulkUpsertResult {
    pub success: usize,
    pub failed: usize,
    pub failed_items: Vec<FailedItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedItem {
    pub user_id: String,
    pub reason: String,
}

/// The kinds of mutation recorded in the audit history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOperation {
    AssignOwner,
    TransferOwner,
    AssignUserRole,
    AssignUserRolesBatch,
    DeleteUserRole,
    DeleteResource,
}

impl HistoryOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryOperation::AssignOwner => "assign_owner",
            HistoryOperation::TransferOwner => "transfer_owner",
            HistoryOperation::AssignUserRole => "assign_user_role",
            HistoryOperation::AssignUserRolesBatch => "assign_user_roles_batch",
            HistoryOperation::DeleteUserRole => "delete_user_role",
            HistoryOperation::DeleteResource => "delete_resource",
        }
    }
}

/// Append-only audit entry, mirroring the mutating call that produced it.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub operation: HistoryOperation,
    pub caller_id: String,
    pub scope: ScopeKind,
    pub namespace: Option<String>,
    pub resource_id: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub target_user_ids: Vec<String>,
    pub role: Option<String>,
    pub new_owner_id: Option<String>,
    pub child_resource_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub operation: HistoryOperation,
    pub caller_id: String,
    pub scope: ScopeKind,
    pub namespace: Option<String>,
    pub resource_id: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub target_user_ids: Vec<String>,
    pub role: Option<String>,
    pub new_owner_id: Option<String>,
    pub child_resource_ids: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub scope: Option<ScopeKind>,
    pub namespace: Option<String>,
    pub resource_id: Option<String>,
    pub resource_type: Option<ResourceType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.page_size as i64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PagedHistory {
    pub items: Vec<HistoryEntry>,
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
}
