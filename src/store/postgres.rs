use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::error::StoreError;
use super::types::*;

/// Postgres-backed `RoleStore`. Three tables back the three
/// collections: `system_roles`, `resource_roles`, `user_role_history`.
pub struct PgRoleStore {
    pool: PgPool,
}

impl PgRoleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_unique_violation(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return StoreError::DuplicateKey;
        }
    }
    StoreError::Internal(err)
}

const SYSTEM_ROW_COLUMNS: &str = r#"id, user_id, user_type, role, namespace,
    NULL::text AS resource_id, NULL::text AS resource_type, NULL::text AS parent_resource_id,
    created_at, updated_at, deleted_at, created_by, updated_by, deleted_by"#;

const RESOURCE_ROW_COLUMNS: &str = r#"id, user_id, user_type, role,
    NULL::text AS namespace, resource_id, resource_type, parent_resource_id,
    created_at, updated_at, deleted_at, created_by, updated_by, deleted_by"#;

#[async_trait]
impl RoleStore for PgRoleStore {
    async fn get_owner(&self, scope: &ScopeCoords) -> Result<Option<UserRole>, StoreError> {
        match scope {
            ScopeCoords::System { namespace } => {
                let row = sqlx::query_as::<_, UserRoleRow>(&format!(
                    r#"SELECT {SYSTEM_ROW_COLUMNS} FROM system_roles
                       WHERE namespace = $1 AND role = 'owner' AND deleted_at IS NULL
                       LIMIT 1"#
                ))
                .bind(namespace)
                .fetch_optional(&self.pool)
                .await?;
                Ok(row.map(UserRoleRow::into_system))
            }
            ScopeCoords::Resource {
                resource_id,
                resource_type,
                ..
            } => {
                let row = sqlx::query_as::<_, UserRoleRow>(&format!(
                    r#"SELECT {RESOURCE_ROW_COLUMNS} FROM resource_roles
                       WHERE resource_id = $1 AND resource_type = $2
                         AND role = 'owner' AND deleted_at IS NULL
                       LIMIT 1"#
                ))
                .bind(resource_id)
                .bind(resource_type.as_str())
                .fetch_optional(&self.pool)
                .await?;
                Ok(row.map(UserRoleRow::into_resource))
            }
        }
    }

    async fn count_owners(&self, namespace: &str) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM system_roles
               WHERE namespace = $1 AND role = 'owner' AND deleted_at IS NULL"#,
        )
        .bind(namespace)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_resource_roles(
        &self,
        resource_id: &str,
        resource_type: ResourceType,
    ) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM resource_roles
               WHERE resource_id = $1 AND resource_type = $2 AND deleted_at IS NULL"#,
        )
        .bind(resource_id)
        .bind(resource_type.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn has_role(
        &self,
        user_id: &str,
        user_type: UserKind,
        scope: &ScopeCoords,
        role: &str,
    ) -> Result<bool, StoreError> {
        let found = match scope {
            ScopeCoords::System { namespace } => sqlx::query_scalar::<_, Option<i32>>(
                r#"SELECT 1 FROM system_roles
                   WHERE user_id = $1 AND user_type = $2 AND namespace = $3
                     AND role = $4 AND deleted_at IS NULL
                   LIMIT 1"#,
            )
            .bind(user_id)
            .bind(user_type.as_str())
            .bind(namespace)
            .bind(role)
            .fetch_optional(&self.pool)
            .await?,
            ScopeCoords::Resource {
                resource_id,
                resource_type,
                ..
            } => sqlx::query_scalar::<_, Option<i32>>(
                r#"SELECT 1 FROM resource_roles
                   WHERE user_id = $1 AND user_type = $2 AND resource_id = $3
                     AND resource_type = $4 AND role = $5 AND deleted_at IS NULL
                   LIMIT 1"#,
            )
            .bind(user_id)
            .bind(user_type.as_str())
            .bind(resource_id)
            .bind(resource_type.as_str())
            .bind(role)
            .fetch_optional(&self.pool)
            .await?,
        };
        Ok(found.flatten().is_some())
    }

    async fn has_any_role(
        &self,
        user_id: &str,
        user_type: UserKind,
        scope: &ScopeCoords,
        roles: &[String],
    ) -> Result<bool, StoreError> {
        if roles.is_empty() {
            return Ok(false);
        }
        let found = match scope {
            ScopeCoords::System { namespace } => sqlx::query_scalar::<_, Option<i32>>(
                r#"SELECT 1 FROM system_roles
                   WHERE user_id = $1 AND user_type = $2 AND namespace = $3
                     AND role = ANY($4) AND deleted_at IS NULL
                   LIMIT 1"#,
            )
            .bind(user_id)
            .bind(user_type.as_str())
            .bind(namespace)
            .bind(roles)
            .fetch_optional(&self.pool)
            .await?,
            ScopeCoords::Resource {
                resource_id,
                resource_type,
                ..
            } => sqlx::query_scalar::<_, Option<i32>>(
                r#"SELECT 1 FROM resource_roles
                   WHERE user_id = $1 AND user_type = $2 AND resource_id = $3
                     AND resource_type = $4 AND role = ANY($5) AND deleted_at IS NULL
                   LIMIT 1"#,
            )
            .bind(user_id)
            .bind(user_type.as_str())
            .bind(resource_id)
            .bind(resource_type.as_str())
            .bind(roles)
            .fetch_optional(&self.pool)
            .await?,
        };
        Ok(found.flatten().is_some())
    }

    async fn find(&self, filter: &RoleFilter) -> Result<Vec<UserRole>, StoreError> {
        let mut results = Vec::new();

        if matches!(filter.scope, None | Some(ScopeKind::System)) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("SELECT {SYSTEM_ROW_COLUMNS} FROM system_roles WHERE deleted_at IS NULL"));
            if let Some(ref user_id) = filter.user_id {
                qb.push(" AND user_id = ").push_bind(user_id.clone());
            }
            if let Some(user_type) = filter.user_type {
                qb.push(" AND user_type = ").push_bind(user_type.as_str());
            }
            if let Some(ref namespace) = filter.namespace {
                qb.push(" AND namespace = ").push_bind(namespace.clone());
            }
            if let Some(ref role) = filter.role {
                qb.push(" AND role = ").push_bind(role.clone());
            }
            qb.push(" ORDER BY created_at");
            let rows: Vec<UserRoleRow> = qb.build_query_as().fetch_all(&self.pool).await?;
            results.extend(rows.into_iter().map(UserRoleRow::into_system));
        }

        if matches!(filter.scope, None | Some(ScopeKind::Resource)) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "SELECT {RESOURCE_ROW_COLUMNS} FROM resource_roles WHERE deleted_at IS NULL"
            ));
            if let Some(ref user_id) = filter.user_id {
                qb.push(" AND user_id = ").push_bind(user_id.clone());
            }
            if let Some(user_type) = filter.user_type {
                qb.push(" AND user_type = ").push_bind(user_type.as_str());
            }
            if let Some(ref resource_id) = filter.resource_id {
                qb.push(" AND resource_id = ").push_bind(resource_id.clone());
            }
            if let Some(resource_type) = filter.resource_type {
                qb.push(" AND resource_type = ").push_bind(resource_type.as_str());
            }
            if let Some(ref role) = filter.role {
                qb.push(" AND role = ").push_bind(role.clone());
            }
            qb.push(" ORDER BY created_at");
            let rows: Vec<UserRoleRow> = qb.build_query_as().fetch_all(&self.pool).await?;
            results.extend(rows.into_iter().map(UserRoleRow::into_resource));
        }

        Ok(results)
    }

    async fn create_user_role(&self, new: NewUserRole) -> Result<UserRole, StoreError> {
        let now = Utc::now();
        match &new.scope {
            ScopeCoords::System { namespace } => {
                let row = sqlx::query_as::<_, UserRoleRow>(&format!(
                    r#"INSERT INTO system_roles
                         (user_id, user_type, role, namespace, created_at, updated_at, created_by, updated_by)
                       VALUES ($1, $2, $3, $4, $5, $5, $6, $6)
                       RETURNING {SYSTEM_ROW_COLUMNS}"#
                ))
                .bind(&new.user_id)
                .bind(new.user_type.as_str())
                .bind(&new.role)
                .bind(namespace)
                .bind(now)
                .bind(&new.actor)
                .fetch_one(&self.pool)
                .await
                .map_err(map_unique_violation)?;
                Ok(row.into_system())
            }
            ScopeCoords::Resource {
                resource_id,
                resource_type,
                parent_resource_id,
            } => {
                let row = sqlx::query_as::<_, UserRoleRow>(&format!(
                    r#"INSERT INTO resource_roles
                         (user_id, user_type, role, resource_id, resource_type, parent_resource_id,
                          created_at, updated_at, created_by, updated_by)
                       VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8, $8)
                       RETURNING {RESOURCE_ROW_COLUMNS}"#
                ))
                .bind(&new.user_id)
                .bind(new.user_type.as_str())
                .bind(&new.role)
                .bind(resource_id)
                .bind(resource_type.as_str())
                .bind(parent_resource_id)
                .bind(now)
                .bind(&new.actor)
                .fetch_one(&self.pool)
                .await
                .map_err(map_unique_violation)?;
                Ok(row.into_resource())
            }
        }
    }

    async fn upsert_user_role(&self, new: NewUserRole) -> Result<UserRole, StoreError> {
        let now = Utc::now();
        match &new.scope {
            ScopeCoords::System { namespace } => {
                let updated = sqlx::query_as::<_, UserRoleRow>(&format!(
                    r#"UPDATE system_roles
                       SET role = $1, updated_at = $2, updated_by = $3, deleted_at = NULL, deleted_by = NULL
                       WHERE user_id = $4 AND user_type = $5 AND namespace = $6 AND role <> 'owner'
                         AND deleted_at IS NULL
                       RETURNING {SYSTEM_ROW_COLUMNS}"#
                ))
                .bind(&new.role)
                .bind(now)
                .bind(&new.actor)
                .bind(&new.user_id)
                .bind(new.user_type.as_str())
                .bind(namespace)
                .fetch_optional(&self.pool)
                .await?;

                if let Some(row) = updated {
                    return Ok(row.into_system());
                }

                let inserted = sqlx::query_as::<_, UserRoleRow>(&format!(
                    r#"INSERT INTO system_roles
                         (user_id, user_type, role, namespace, created_at, updated_at, created_by, updated_by)
                       VALUES ($1, $2, $3, $4, $5, $5, $6, $6)
                       RETURNING {SYSTEM_ROW_COLUMNS}"#
                ))
                .bind(&new.user_id)
                .bind(new.user_type.as_str())
                .bind(&new.role)
                .bind(namespace)
                .bind(now)
                .bind(&new.actor)
                .fetch_one(&self.pool)
                .await
                .map_err(map_unique_violation)?;
                Ok(inserted.into_system())
            }
            ScopeCoords::Resource {
                resource_id,
                resource_type,
                parent_resource_id,
            } => {
                let updated = sqlx::query_as::<_, UserRoleRow>(&format!(
                    r#"UPDATE resource_roles
                       SET role = $1, updated_at = $2, updated_by = $3, deleted_at = NULL, deleted_by = NULL,
                           parent_resource_id = COALESCE($4, parent_resource_id)
                       WHERE user_id = $5 AND user_type = $6 AND resource_id = $7 AND resource_type = $8
                         AND role <> 'owner' AND deleted_at IS NULL
                       RETURNING {RESOURCE_ROW_COLUMNS}"#
                ))
                .bind(&new.role)
                .bind(now)
                .bind(&new.actor)
                .bind(parent_resource_id)
                .bind(&new.user_id)
                .bind(new.user_type.as_str())
                .bind(resource_id)
                .bind(resource_type.as_str())
                .fetch_optional(&self.pool)
                .await?;

                if let Some(row) = updated {
                    return Ok(row.into_resource());
                }

                let inserted = sqlx::query_as::<_, UserRoleRow>(&format!(
                    r#"INSERT INTO resource_roles
                         (user_id, user_type, role, resource_id, resource_type, parent_resource_id,
                          created_at, updated_at, created_by, updated_by)
                       VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8, $8)
                       RETURNING {RESOURCE_ROW_COLUMNS}"#
                ))
                .bind(&new.user_id)
                .bind(new.user_type.as_str())
                .bind(&new.role)
                .bind(resource_id)
                .bind(resource_type.as_str())
                .bind(parent_resource_id)
                .bind(now)
                .bind(&new.actor)
                .fetch_one(&self.pool)
                .await
                .map_err(map_unique_violation)?;
                Ok(inserted.into_resource())
            }
        }
    }

    async fn bulk_upsert_user_roles(
        &self,
        items: Vec<NewUserRole>,
    ) -> Result<BulkUpsertResult, StoreError> {
        let mut success = 0usize;
        let mut failed_items = Vec::new();

        // Unordered as far as the store is concerned; the caller
        // (service layer) is responsible for input-order bookkeeping
        // via `failed_items` carrying the original user_id.
        for item in items {
            let user_id = item.user_id.clone();
            match self.upsert_user_role(item).await {
                Ok(_) => success += 1,
                Err(StoreError::DuplicateKey) => failed_items.push(FailedItem {
                    user_id,
                    reason: "duplicate key".to_string(),
                }),
                Err(StoreError::NotFound) => failed_items.push(FailedItem {
                    user_id,
                    reason: "not found".to_string(),
                }),
                Err(StoreError::Internal(e)) => failed_items.push(FailedItem {
                    user_id,
                    reason: e.to_string(),
                }),
            }
        }

        Ok(BulkUpsertResult {
            success,
            failed: failed_items.len(),
            failed_items,
        })
    }

    async fn delete_user_role(
        &self,
        user_id: &str,
        user_type: UserKind,
        scope: &ScopeCoords,
        actor: &str,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let rows_affected = match scope {
            ScopeCoords::System { namespace } => {
                sqlx::query(
                    r#"UPDATE system_roles SET deleted_at = $1, deleted_by = $2
                       WHERE user_id = $3 AND user_type = $4 AND namespace = $5
                         AND role <> 'owner' AND deleted_at IS NULL"#,
                )
                .bind(now)
                .bind(actor)
                .bind(user_id)
                .bind(user_type.as_str())
                .bind(namespace)
                .execute(&self.pool)
                .await?
                .rows_affected()
            }
            ScopeCoords::Resource {
                resource_id,
                resource_type,
                ..
            } => {
                sqlx::query(
                    r#"UPDATE resource_roles SET deleted_at = $1, deleted_by = $2
                       WHERE user_id = $3 AND user_type = $4 AND resource_id = $5 AND resource_type = $6
                         AND role <> 'owner' AND deleted_at IS NULL"#,
                )
                .bind(now)
                .bind(actor)
                .bind(user_id)
                .bind(user_type.as_str())
                .bind(resource_id)
                .bind(resource_type.as_str())
                .execute(&self.pool)
                .await?
                .rows_affected()
            }
        };

        if rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn soft_delete_resource_user_roles(
        &self,
        resource_ids: &[String],
        resource_type: ResourceType,
        _namespace: Option<&str>,
        actor: &str,
    ) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "UPDATE resource_roles SET deleted_at = ",
        );
        qb.push_bind(now);
        qb.push(", deleted_by = ").push_bind(actor.to_string());
        qb.push(" WHERE resource_type = ").push_bind(resource_type.as_str());
        qb.push(" AND resource_id = ANY(").push_bind(resource_ids.to_vec()).push(")");
        qb.push(" AND deleted_at IS NULL");

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn transfer_owner_system(
        &self,
        namespace: &str,
        current_owner_id: &str,
        new_owner_id: &str,
        new_owner_type: UserKind,
        actor: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let demoted = sqlx::query(
            r#"UPDATE system_roles SET role = 'admin', updated_at = $1, updated_by = $2
               WHERE namespace = $3 AND user_id = $4 AND role = 'owner' AND deleted_at IS NULL"#,
        )
        .bind(now)
        .bind(actor)
        .bind(namespace)
        .bind(current_owner_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if demoted == 0 {
            return Err(StoreError::NotFound);
        }

        let existing_new_owner = sqlx::query(
            r#"UPDATE system_roles SET role = 'owner', updated_at = $1, updated_by = $2,
                    deleted_at = NULL, deleted_by = NULL, user_type = $3
               WHERE namespace = $4 AND user_id = $5 AND deleted_at IS NULL"#,
        )
        .bind(now)
        .bind(actor)
        .bind(new_owner_type.as_str())
        .bind(namespace)
        .bind(new_owner_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if existing_new_owner == 0 {
            sqlx::query(
                r#"INSERT INTO system_roles
                     (user_id, user_type, role, namespace, created_at, updated_at, created_by, updated_by)
                   VALUES ($1, $2, 'owner', $3, $4, $4, $5, $5)"#,
            )
            .bind(new_owner_id)
            .bind(new_owner_type.as_str())
            .bind(namespace)
            .bind(now)
            .bind(actor)
            .execute(&mut *tx)
            .await
            .map_err(map_unique_violation)?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn transfer_owner_resource(
        &self,
        resource_id: &str,
        resource_type: ResourceType,
        current_owner_id: &str,
        new_owner_id: &str,
        new_owner_type: UserKind,
        actor: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let demoted = sqlx::query(
            r#"UPDATE resource_roles SET role = 'admin', updated_at = $1, updated_by = $2
               WHERE resource_id = $3 AND resource_type = $4 AND user_id = $5
                 AND role = 'owner' AND deleted_at IS NULL"#,
        )
        .bind(now)
        .bind(actor)
        .bind(resource_id)
        .bind(resource_type.as_str())
        .bind(current_owner_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if demoted == 0 {
            return Err(StoreError::NotFound);
        }

        let existing_new_owner = sqlx::query(
            r#"UPDATE resource_roles SET role = 'owner', updated_at = $1, updated_by = $2,
                    deleted_at = NULL, deleted_by = NULL, user_type = $3
               WHERE resource_id = $4 AND resource_type = $5 AND user_id = $6 AND deleted_at IS NULL"#,
        )
        .bind(now)
        .bind(actor)
        .bind(new_owner_type.as_str())
        .bind(resource_id)
        .bind(resource_type.as_str())
        .bind(new_owner_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if existing_new_owner == 0 {
            sqlx::query(
                r#"INSERT INTO resource_roles
                     (user_id, user_type, role, resource_id, resource_type, created_at, updated_at, created_by, updated_by)
                   VALUES ($1, $2, 'owner', $3, $4, $5, $5, $6, $6)"#,
            )
            .bind(new_owner_id)
            .bind(new_owner_type.as_str())
            .bind(resource_id)
            .bind(resource_type.as_str())
            .bind(now)
            .bind(actor)
            .execute(&mut *tx)
            .await
            .map_err(map_unique_violation)?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn append_history(&self, entry: NewHistoryEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO user_role_history
                 (id, operation, caller_id, scope, namespace, resource_id, resource_type,
                  target_user_ids, role, new_owner_id, child_resource_ids, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.operation.as_str())
        .bind(&entry.caller_id)
        .bind(entry.scope.as_str())
        .bind(&entry.namespace)
        .bind(&entry.resource_id)
        .bind(entry.resource_type.map(|t| t.as_str()))
        .bind(&entry.target_user_ids)
        .bind(&entry.role)
        .bind(&entry.new_owner_id)
        .bind(&entry.child_resource_ids)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query_history(
        &self,
        filter: &HistoryFilter,
        page: Page,
    ) -> Result<PagedHistory, StoreError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"SELECT id, operation, caller_id, scope, namespace, resource_id, resource_type,
                      target_user_ids, role, new_owner_id, child_resource_ids, created_at
               FROM user_role_history WHERE 1 = 1"#,
        );
        Self::push_history_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.page_size as i64)
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows: Vec<HistoryRow> = qb.build_query_as().fetch_all(&self.pool).await?;

        let mut count_qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM user_role_history WHERE 1 = 1");
        Self::push_history_filter(&mut count_qb, filter);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        Ok(PagedHistory {
            items: rows.into_iter().map(HistoryRow::into_entry).collect(),
            page: page.page,
            page_size: page.page_size,
            total,
        })
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }
}

impl PgRoleStore {
    fn push_history_filter(qb: &mut QueryBuilder<Postgres>, filter: &HistoryFilter) {
        if let Some(scope) = filter.scope {
            qb.push(" AND scope = ").push_bind(scope.as_str());
        }
        if let Some(ref namespace) = filter.namespace {
            qb.push(" AND namespace = ").push_bind(namespace.clone());
        }
        if let Some(ref resource_id) = filter.resource_id {
            qb.push(" AND resource_id = ").push_bind(resource_id.clone());
        }
        if let Some(resource_type) = filter.resource_type {
            qb.push(" AND resource_type = ").push_bind(resource_type.as_str());
        }
        if let Some(since) = filter.since {
            qb.push(" AND created_at >= ").push_bind(since);
        }
        if let Some(until) = filter.until {
            qb.push(" AND created_at <= ").push_bind(until);
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    operation: String,
    caller_id: String,
    scope: String,
    namespace: Option<String>,
    resource_id: Option<String>,
    resource_type: Option<String>,
    target_user_ids: Vec<String>,
    role: Option<String>,
    new_owner_id: Option<String>,
    child_resource_ids: Option<Vec<String>>,
    created_at: chrono::DateTime<Utc>,
}

impl HistoryRow {
    fn into_entry(self) -> HistoryEntry {
        HistoryEntry {
            id: self.id,
            operation: match self.operation.as_str() {
                "assign_owner" => HistoryOperation::AssignOwner,
                "transfer_owner" => HistoryOperation::TransferOwner,
                "assign_user_role" => HistoryOperation::AssignUserRole,
                "assign_user_roles_batch" => HistoryOperation::AssignUserRolesBatch,
                "delete_user_role" => HistoryOperation::DeleteUserRole,
                _ => HistoryOperation::DeleteResource,
            },
            caller_id: self.caller_id,
            scope: if self.scope == "system" {
                ScopeKind::System
            } else {
                ScopeKind::Resource
            },
            namespace: self.namespace,
            resource_id: self.resource_id,
            resource_type: self.resource_type.as_deref().and_then(ResourceType::parse),
            target_user_ids: self.target_user_ids,
            role: self.role,
            new_owner_id: self.new_owner_id,
            child_resource_ids: self.child_resource_ids,
            created_at: self.created_at,
        }
    }
}

/// Schema + index bootstrap, run once from `main`.
/// Plain `CREATE ... IF NOT EXISTS` statements rather than a migration
/// framework — this crate has no migration runner in its dependency
/// stack.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS system_roles (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id TEXT NOT NULL,
    user_type TEXT NOT NULL,
    role TEXT NOT NULL,
    namespace TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    deleted_at TIMESTAMPTZ,
    created_by TEXT NOT NULL,
    updated_by TEXT NOT NULL,
    deleted_by TEXT
);

CREATE TABLE IF NOT EXISTS resource_roles (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id TEXT NOT NULL,
    user_type TEXT NOT NULL,
    role TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    resource_type TEXT NOT NULL,
    parent_resource_id TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    deleted_at TIMESTAMPTZ,
    created_by TEXT NOT NULL,
    updated_by TEXT NOT NULL,
    deleted_by TEXT
);

CREATE TABLE IF NOT EXISTS user_role_history (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    operation TEXT NOT NULL,
    caller_id TEXT NOT NULL,
    scope TEXT NOT NULL,
    namespace TEXT,
    resource_id TEXT,
    resource_type TEXT,
    target_user_ids TEXT[] NOT NULL DEFAULT '{}',
    role TEXT,
    new_owner_id TEXT,
    child_resource_ids TEXT[],
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX IF NOT EXISTS system_roles_unique_grant
    ON system_roles (user_id, user_type, namespace) WHERE deleted_at IS NULL;

CREATE UNIQUE INDEX IF NOT EXISTS resource_roles_unique_grant
    ON resource_roles (user_id, user_type, resource_type, resource_id) WHERE deleted_at IS NULL;

CREATE UNIQUE INDEX IF NOT EXISTS system_roles_unique_owner
    ON system_roles (namespace) WHERE deleted_at IS NULL AND role = 'owner';

CREATE UNIQUE INDEX IF NOT EXISTS resource_roles_unique_owner
    ON resource_roles (resource_id, resource_type) WHERE deleted_at IS NULL AND role = 'owner';

CREATE INDEX IF NOT EXISTS user_role_history_system_idx
    ON user_role_history (scope, namespace, created_at DESC);

CREATE INDEX IF NOT EXISTS user_role_history_resource_idx
    ON user_role_history (scope, resource_id, resource_type, created_at DESC);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_type_round_trips_through_as_str() {
        for rt in [
            ResourceType::Dashboard,
            ResourceType::DashboardWidget,
            ResourceType::LibraryWidget,
        ] {
            assert_eq!(ResourceType::parse(rt.as_str()), Some(rt));
        }
    }

    #[test]
    fn page_offset_is_zero_based() {
        let page = Page {
            page: 1,
            page_size: 20,
        };
        assert_eq!(page.offset(), 0);
        let page2 = Page {
            page: 3,
            page_size: 20,
        };
        assert_eq!(page2.offset(), 40);
    }
}
