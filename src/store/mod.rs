pub mod error;
pub mod postgres;
pub mod types;

pub use error::StoreError;
pub use postgres::PgRoleStore;
pub use types::*;

use async_trait::async_trait;

/// The transactional storage layer. Abstracted behind a trait so the
/// wire protocol to the underlying engine — Postgres here, a document
/// database in principle — never leaks above this boundary.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn get_owner(&self, scope: &ScopeCoords) -> Result<Option<UserRole>, StoreError>;

    async fn count_owners(&self, namespace: &str) -> Result<i64, StoreError>;

    async fn count_resource_roles(
        &self,
        resource_id: &str,
        resource_type: ResourceType,
    ) -> Result<i64, StoreError>;

    async fn has_role(
        &self,
        user_id: &str,
        user_type: UserKind,
        scope: &ScopeCoords,
        role: &str,
    ) -> Result<bool, StoreError>;

    async fn has_any_role(
        &self,
        user_id: &str,
        user_type: UserKind,
        scope: &ScopeCoords,
        roles: &[String],
    ) -> Result<bool, StoreError>;

    async fn find(&self, filter: &RoleFilter) -> Result<Vec<UserRole>, StoreError>;

    /// Strict insert, used for owner assignment — returns
    /// `DuplicateKey` when a live owner already occupies the scope.
    async fn create_user_role(&self, new: NewUserRole) -> Result<UserRole, StoreError>;

    /// Match-or-insert against the scope-appropriate unique key,
    /// excluding rows whose current role is `owner`.
    async fn upsert_user_role(&self, new: NewUserRole) -> Result<UserRole, StoreError>;

    async fn bulk_upsert_user_roles(
        &self,
        items: Vec<NewUserRole>,
    ) -> Result<BulkUpsertResult, StoreError>;

    /// Soft delete of a single non-owner grant. `Ok(())` is only
    /// returned when a live row matched; callers treat `NotFound` as
    /// idempotent success.
    async fn delete_user_role(
        &self,
        user_id: &str,
        user_type: UserKind,
        scope: &ScopeCoords,
        actor: &str,
    ) -> Result<(), StoreError>;

    /// Bypasses the owner-protection rule: soft-deletes every live
    /// row (including the owner) on the given resource ids.
    async fn soft_delete_resource_user_roles(
        &self,
        resource_ids: &[String],
        resource_type: ResourceType,
        namespace: Option<&str>,
        actor: &str,
    ) -> Result<u64, StoreError>;

    async fn transfer_owner_system(
        &self,
        namespace: &str,
        current_owner_id: &str,
        new_owner_id: &str,
        new_owner_type: UserKind,
        actor: &str,
    ) -> Result<(), StoreError>;

    async fn transfer_owner_resource(
        &self,
        resource_id: &str,
        resource_type: ResourceType,
        current_owner_id: &str,
        new_owner_id: &str,
        new_owner_type: UserKind,
        actor: &str,
    ) -> Result<(), StoreError>;

    async fn append_history(&self, entry: NewHistoryEntry) -> Result<(), StoreError>;

    async fn query_history(
        &self,
        filter: &HistoryFilter,
        page: Page,
    ) -> Result<PagedHistory, StoreError>;

    /// Establishes the uniques and secondary indexes the storage
    /// layer depends on. Idempotent; safe to call on every startup.
    async fn ensure_indexes(&self) -> Result<(), StoreError>;
}
