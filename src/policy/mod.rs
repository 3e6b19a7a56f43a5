pub mod engine;
pub mod types;

pub use engine::{EngineError, PolicyEngine};
pub use types::{OperationRequest, ResolvedPolicy};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::catalog::PolicyCatalog;
    use crate::store::{
        BulkUpsertResult, HistoryFilter, NewHistoryEntry, NewUserRole, Page, PagedHistory, ResourceType,
        RoleFilter, RoleStore, ScopeCoords, ScopeKind, StoreError, UserKind, UserRole,
    };

    use super::*;

    /// In-memory double standing in for `PgRoleStore` so the policy
    /// engine's branching can be exercised without a database.
    struct FakeStore {
        widget_roles: std::sync::Mutex<u32>,
        caller_has_dashboard_read: bool,
    }

    #[async_trait]
    impl RoleStore for FakeStore {
        async fn get_owner(&self, _scope: &ScopeCoords) -> Result<Option<UserRole>, StoreError> {
            Ok(None)
        }
        async fn count_owners(&self, _namespace: &str) -> Result<i64, StoreError> {
            Ok(0)
        }
        async fn count_resource_roles(
            &self,
            _resource_id: &str,
            _resource_type: ResourceType,
        ) -> Result<i64, StoreError> {
            Ok(*self.widget_roles.lock().unwrap() as i64)
        }
        async fn has_role(
            &self,
            _user_id: &str,
            _user_type: UserKind,
            _scope: &ScopeCoords,
            _role: &str,
        ) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn has_any_role(
            &self,
            _user_id: &str,
            _user_type: UserKind,
            scope: &ScopeCoords,
            roles: &[String],
        ) -> Result<bool, StoreError> {
            match scope {
                ScopeCoords::Resource { resource_type, .. }
                    if *resource_type == ResourceType::Dashboard =>
                {
                    Ok(self.caller_has_dashboard_read && roles.iter().any(|r| r == "viewer" || r == "owner"))
                }
                _ => Ok(false),
            }
        }
        async fn find(&self, filter: &RoleFilter) -> Result<Vec<UserRole>, StoreError> {
            let grants_dashboard_read = self.caller_has_dashboard_read
                && filter.scope == Some(ScopeKind::Resource)
                && filter.resource_type == Some(ResourceType::Dashboard);
            if !grants_dashboard_read {
                return Ok(vec![]);
            }
            let now = chrono::Utc::now();
            Ok(vec![UserRole {
                id: uuid::Uuid::new_v4(),
                user_id: filter.user_id.clone().unwrap_or_default(),
                user_type: filter.user_type.unwrap_or_default(),
                role: "viewer".to_string(),
                scope: ScopeKind::Resource,
                namespace: None,
                resource_id: filter.resource_id.clone(),
                resource_type: filter.resource_type,
                parent_resource_id: None,
                created_at: now,
                updated_at: now,
                deleted_at: None,
                created_by: "test".to_string(),
                updated_by: "test".to_string(),
                deleted_by: None,
            }])
        }
        async fn create_user_role(&self, _new: NewUserRole) -> Result<UserRole, StoreError> {
            unimplemented!()
        }
        async fn upsert_user_role(&self, _new: NewUserRole) -> Result<UserRole, StoreError> {
            unimplemented!()
        }
        async fn bulk_upsert_user_roles(
            &self,
            _items: Vec<NewUserRole>,
        ) -> Result<BulkUpsertResult, StoreError> {
            unimplemented!()
        }
        async fn delete_user_role(
            &self,
            _user_id: &str,
            _user_type: UserKind,
            _scope: &ScopeCoords,
            _actor: &str,
        ) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn soft_delete_resource_user_roles(
            &self,
            _resource_ids: &[String],
            _resource_type: ResourceType,
            _namespace: Option<&str>,
            _actor: &str,
        ) -> Result<u64, StoreError> {
            unimplemented!()
        }
        async fn transfer_owner_system(
            &self,
            _namespace: &str,
            _current_owner_id: &str,
            _new_owner_id: &str,
            _new_owner_type: UserKind,
            _actor: &str,
        ) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn transfer_owner_resource(
            &self,
            _resource_id: &str,
            _resource_type: ResourceType,
            _current_owner_id: &str,
            _new_owner_id: &str,
            _new_owner_type: UserKind,
            _actor: &str,
        ) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn append_history(&self, _entry: NewHistoryEntry) -> Result<(), StoreError> {
            Ok(())
        }
        async fn query_history(
            &self,
            _filter: &HistoryFilter,
            _page: Page,
        ) -> Result<PagedHistory, StoreError> {
            unimplemented!()
        }
        async fn ensure_indexes(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn engine(widget_roles: u32, caller_has_dashboard_read: bool) -> PolicyEngine {
        let catalog = Arc::new(PolicyCatalog::load().unwrap());
        let store: Arc<dyn RoleStore> = Arc::new(FakeStore {
            widget_roles: std::sync::Mutex::new(widget_roles),
            caller_has_dashboard_read,
        });
        PolicyEngine::new(catalog, store, std::time::Duration::from_secs(30))
    }

    #[test]
    fn normalize_redirects_widget_viewer_assign() {
        let eng = engine(0, false);
        let mut req = OperationRequest {
            operation: "assign_user_role".to_string(),
            resource_type: Some(ResourceType::DashboardWidget),
            role: Some("viewer".to_string()),
            scope: Some(ScopeKind::Resource),
            ..Default::default()
        };
        eng.normalize_request(&mut req);
        assert_eq!(req.operation, "assign_viewer");
        assert_eq!(req.entity.as_deref(), Some("dashboard_widget"));
    }

    #[test]
    fn normalize_leaves_non_viewer_assign_untouched() {
        let eng = engine(0, false);
        let mut req = OperationRequest {
            operation: "assign_user_role".to_string(),
            resource_type: Some(ResourceType::DashboardWidget),
            role: Some("editor".to_string()),
            scope: Some(ScopeKind::Resource),
            ..Default::default()
        };
        eng.normalize_request(&mut req);
        assert_eq!(req.operation, "assign_user_role");
    }

    #[tokio::test]
    async fn check_resource_access_inherits_when_widget_has_no_roles() {
        let eng = engine(0, true);
        let allowed = eng
            .check_resource_access(
                "W1",
                ResourceType::DashboardWidget,
                "resource.dashboard_widget.read",
                Some("D1"),
                "u1",
                UserKind::Member,
            )
            .await
            .unwrap();
        assert!(allowed);
    }

    #[tokio::test]
    async fn check_resource_access_denies_without_parent_id() {
        let eng = engine(0, true);
        let allowed = eng
            .check_resource_access(
                "W1",
                ResourceType::DashboardWidget,
                "resource.dashboard_widget.read",
                None,
                "u1",
                UserKind::Member,
            )
            .await
            .unwrap();
        assert!(!allowed);
    }

    #[tokio::test]
    async fn check_resource_access_switches_to_whitelist_once_widget_has_roles() {
        let eng = engine(1, true);
        let allowed = eng
            .check_resource_access(
                "W1",
                ResourceType::DashboardWidget,
                "resource.dashboard_widget.read",
                Some("D1"),
                "u1",
                UserKind::Member,
            )
            .await
            .unwrap();
        // Dashboard-level read no longer suffices; the fake store
        // only grants resource-level roles on Dashboard, not widgets.
        assert!(!allowed);
    }
}
