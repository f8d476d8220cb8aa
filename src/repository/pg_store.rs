//! PostgreSQL authority store (角色/权限数据访问)

use super::{AuthorityStore, TableNames};
use crate::{
    error::{StoreError, StoreResult},
    models::*,
};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, FromRow, PgPool, Postgres, QueryBuilder};

const ENTITY_COLUMNS: &str = "id, name, display_name, created_at, updated_at, deleted_at";

pub struct PgAuthorityStore {
    db: PgPool,
    tables: TableNames,
}

impl PgAuthorityStore {
    pub fn new(db: PgPool, table_prefix: &str) -> StoreResult<Self> {
        Ok(Self {
            db,
            tables: TableNames::with_prefix(table_prefix)?,
        })
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    async fn find_entity<T>(&self, table: &str, id: i64) -> StoreResult<Option<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM {table} WHERE id = $1 AND deleted_at IS NULL"
        );
        let row = sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(row)
    }

    async fn find_entity_by_name<T>(&self, table: &str, name: &str) -> StoreResult<Option<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM {table} WHERE name = $1 AND deleted_at IS NULL"
        );
        let row = sqlx::query_as::<_, T>(&sql)
            .bind(name)
            .fetch_optional(&self.db)
            .await?;

        Ok(row)
    }

    async fn insert_entity<T>(
        &self,
        table: &str,
        name: &str,
        display_name: Option<&str>,
    ) -> StoreResult<T>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let sql = format!(
            r#"
            INSERT INTO {table} (name, display_name)
            VALUES ($1, $2)
            RETURNING {ENTITY_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, T>(&sql)
            .bind(name)
            .bind(display_name)
            .fetch_one(&self.db)
            .await?;

        Ok(row)
    }

    async fn list_entities<T>(&self, table: &str) -> StoreResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let sql =
            format!("SELECT {ENTITY_COLUMNS} FROM {table} WHERE deleted_at IS NULL ORDER BY id");
        let rows = sqlx::query_as::<_, T>(&sql).fetch_all(&self.db).await?;

        Ok(rows)
    }

    async fn entities_by_ids<T>(&self, table: &str, ids: &[i64]) -> StoreResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM {table} WHERE id = ANY($1) AND deleted_at IS NULL ORDER BY id"
        );
        let rows = sqlx::query_as::<_, T>(&sql)
            .bind(ids.to_vec())
            .fetch_all(&self.db)
            .await?;

        Ok(rows)
    }

    async fn count_where(&self, table: &str, column: &str, value: i64) -> StoreResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE {column} = $1");
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(value)
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }

    /// 建表语句（幂等）
    fn schema_statements(&self) -> Vec<String> {
        let TableNames {
            roles,
            permissions,
            role_permissions,
            user_roles,
        } = &self.tables;

        let mut statements = Vec::new();
        for table in [roles, permissions] {
            statements.push(format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id BIGSERIAL PRIMARY KEY,
                    name VARCHAR(50) NOT NULL,
                    display_name VARCHAR(50),
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    deleted_at TIMESTAMPTZ
                )
                "#
            ));
            // 名称仅在未删除的行中唯一
            statements.push(format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {table}_name_key ON {table} (name) WHERE deleted_at IS NULL"
            ));
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {table}_deleted_at_idx ON {table} (deleted_at)"
            ));
        }

        statements.push(format!(
            r#"
            CREATE TABLE IF NOT EXISTS {role_permissions} (
                role_id BIGINT NOT NULL,
                permission_id BIGINT NOT NULL,
                PRIMARY KEY (role_id, permission_id)
            )
            "#
        ));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {role_permissions}_permission_id_idx ON {role_permissions} (permission_id)"
        ));

        statements.push(format!(
            r#"
            CREATE TABLE IF NOT EXISTS {user_roles} (
                user_id BIGINT NOT NULL,
                role_id BIGINT NOT NULL,
                PRIMARY KEY (user_id, role_id)
            )
            "#
        ));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {user_roles}_role_id_idx ON {user_roles} (role_id)"
        ));

        statements
    }
}

#[async_trait]
impl AuthorityStore for PgAuthorityStore {
    // ==================== Roles ====================

    async fn find_role(&self, id: i64) -> StoreResult<Option<Role>> {
        self.find_entity(&self.tables.roles, id).await
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        self.find_entity_by_name(&self.tables.roles, name).await
    }

    async fn insert_role(&self, role: &NewRole) -> StoreResult<Role> {
        self.insert_entity(&self.tables.roles, &role.name, role.display_name.as_deref())
            .await
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        self.list_entities(&self.tables.roles).await
    }

    async fn roles_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Role>> {
        self.entities_by_ids(&self.tables.roles, ids).await
    }

    async fn delete_role_cascade(&self, id: i64) -> StoreResult<()> {
        // 开始事务；提前返回时事务在 drop 时回滚
        let mut tx = self.db.begin().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to begin transaction");
            StoreError::from(e)
        })?;

        let sql = format!("DELETE FROM {} WHERE role_id = $1", self.tables.role_permissions);
        let unlinked = sqlx::query(&sql).bind(id).execute(&mut *tx).await?;

        // 成员检查与软删除在同一条语句中完成
        let sql = format!(
            r#"
            UPDATE {roles} SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
              AND NOT EXISTS (SELECT 1 FROM {user_roles} WHERE role_id = $1)
            "#,
            roles = self.tables.roles,
            user_roles = self.tables.user_roles,
        );
        let deleted = sqlx::query(&sql).bind(id).execute(&mut *tx).await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(match self.find_role(id).await? {
                Some(_) => StoreError::InUse,
                None => StoreError::NotFound,
            });
        }

        tx.commit().await.map_err(|e| {
            tracing::error!(error = %e, role_id = id, "Failed to commit transaction");
            StoreError::from(e)
        })?;

        tracing::debug!(
            role_id = id,
            unlinked_permissions = unlinked.rows_affected(),
            "Role deleted with permission links"
        );

        Ok(())
    }

    // ==================== Permissions ====================

    async fn find_permission(&self, id: i64) -> StoreResult<Option<Permission>> {
        self.find_entity(&self.tables.permissions, id).await
    }

    async fn find_permission_by_name(&self, name: &str) -> StoreResult<Option<Permission>> {
        self.find_entity_by_name(&self.tables.permissions, name).await
    }

    async fn insert_permission(&self, permission: &NewPermission) -> StoreResult<Permission> {
        self.insert_entity(
            &self.tables.permissions,
            &permission.name,
            permission.display_name.as_deref(),
        )
        .await
    }

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        self.list_entities(&self.tables.permissions).await
    }

    async fn permissions_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Permission>> {
        self.entities_by_ids(&self.tables.permissions, ids).await
    }

    async fn delete_permission(&self, id: i64) -> StoreResult<()> {
        let sql = format!(
            r#"
            UPDATE {permissions} SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
              AND NOT EXISTS (SELECT 1 FROM {role_permissions} WHERE permission_id = $1)
            "#,
            permissions = self.tables.permissions,
            role_permissions = self.tables.role_permissions,
        );
        let result = sqlx::query(&sql).bind(id).execute(&self.db).await?;

        if result.rows_affected() == 0 {
            return Err(match self.find_permission(id).await? {
                Some(_) => StoreError::InUse,
                None => StoreError::NotFound,
            });
        }

        Ok(())
    }

    // ==================== Role permissions ====================

    async fn role_permission_exists(&self, link: &RolePermission) -> StoreResult<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE role_id = $1 AND permission_id = $2)",
            self.tables.role_permissions
        );
        let exists: bool = sqlx::query_scalar(&sql)
            .bind(link.role_id)
            .bind(link.permission_id)
            .fetch_one(&self.db)
            .await?;

        Ok(exists)
    }

    async fn insert_role_permissions(
        &self,
        links: &[RolePermission],
    ) -> StoreResult<Vec<RolePermission>> {
        if links.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} (role_id, permission_id) ",
            self.tables.role_permissions
        ));
        builder.push_values(links, |mut row, link| {
            row.push_bind(link.role_id).push_bind(link.permission_id);
        });
        // 冲突的行不会出现在 RETURNING 中
        builder.push(" ON CONFLICT DO NOTHING RETURNING role_id, permission_id");

        let mut tx = self.db.begin().await?;
        let inserted = builder
            .build_query_as::<RolePermission>()
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(inserted)
    }

    async fn delete_role_permission(&self, link: &RolePermission) -> StoreResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE role_id = $1 AND permission_id = $2",
            self.tables.role_permissions
        );
        let result = sqlx::query(&sql)
            .bind(link.role_id)
            .bind(link.permission_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    async fn role_permissions(&self, role_id: i64) -> StoreResult<Vec<RolePermission>> {
        let sql = format!(
            "SELECT role_id, permission_id FROM {} WHERE role_id = $1 ORDER BY permission_id",
            self.tables.role_permissions
        );
        let links = sqlx::query_as::<_, RolePermission>(&sql)
            .bind(role_id)
            .fetch_all(&self.db)
            .await?;

        Ok(links)
    }

    async fn count_permission_links(&self, permission_id: i64) -> StoreResult<i64> {
        self.count_where(&self.tables.role_permissions, "permission_id", permission_id)
            .await
    }

    async fn any_role_grants(&self, role_ids: &[i64], permission_id: i64) -> StoreResult<bool> {
        if role_ids.is_empty() {
            return Ok(false);
        }

        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE role_id = ANY($1) AND permission_id = $2)",
            self.tables.role_permissions
        );
        let exists: bool = sqlx::query_scalar(&sql)
            .bind(role_ids.to_vec())
            .bind(permission_id)
            .fetch_one(&self.db)
            .await?;

        Ok(exists)
    }

    // ==================== User roles ====================

    async fn user_role_exists(&self, link: &UserRole) -> StoreResult<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE user_id = $1 AND role_id = $2)",
            self.tables.user_roles
        );
        let exists: bool = sqlx::query_scalar(&sql)
            .bind(link.user_id)
            .bind(link.role_id)
            .fetch_one(&self.db)
            .await?;

        Ok(exists)
    }

    async fn insert_user_role(&self, link: &UserRole) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO {} (user_id, role_id) VALUES ($1, $2)",
            self.tables.user_roles
        );
        sqlx::query(&sql)
            .bind(link.user_id)
            .bind(link.role_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    async fn delete_user_role(&self, link: &UserRole) -> StoreResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE user_id = $1 AND role_id = $2",
            self.tables.user_roles
        );
        let result = sqlx::query(&sql)
            .bind(link.user_id)
            .bind(link.role_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    async fn user_roles(&self, user_id: i64) -> StoreResult<Vec<UserRole>> {
        let sql = format!(
            "SELECT user_id, role_id FROM {} WHERE user_id = $1 ORDER BY role_id",
            self.tables.user_roles
        );
        let links = sqlx::query_as::<_, UserRole>(&sql)
            .bind(user_id)
            .fetch_all(&self.db)
            .await?;

        Ok(links)
    }

    async fn count_role_members(&self, role_id: i64) -> StoreResult<i64> {
        self.count_where(&self.tables.user_roles, "role_id", role_id)
            .await
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        tracing::info!(roles = %self.tables.roles, "Ensuring authority schema...");

        let mut tx = self.db.begin().await?;
        for statement in self.schema_statements() {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        tracing::info!("Authority schema ready");
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
