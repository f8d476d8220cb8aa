//! 权限中心服务
//!
//! 角色、权限、角色-权限与用户-角色关联的唯一入口。每次成功调用之后：
//! - 未删除的角色/权限名称唯一
//! - 关联行只引用存在的角色/权限
//! - 被引用的角色/权限不可删除
//!
//! 所有 "先查后写" 的预检查都只是快速路径，存储层的唯一约束才是最终判定，
//! 插入时的唯一约束冲突会被映射为与预检查相同的错误。

use crate::{
    config::StoreConfig,
    error::{AuthorityError, Lookup, Result, StoreError},
    models::*,
    repository::{AuthorityStore, PgAuthorityStore},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

/// 记录变更操作指标
fn record(op: &'static str, outcome: &'static str) {
    metrics::counter!("authority_mutations_total", "op" => op, "outcome" => outcome).increment(1);
}

#[derive(Clone)]
pub struct AuthorityService {
    store: Arc<dyn AuthorityStore>,
}

impl AuthorityService {
    pub fn new(store: Arc<dyn AuthorityStore>) -> Self {
        Self { store }
    }

    /// 构建服务，按配置决定是否创建/更新表结构
    pub async fn bootstrap(store: Arc<dyn AuthorityStore>, config: &StoreConfig) -> Result<Self> {
        if config.migrate {
            store.ensure_schema().await?;
        }

        info!(
            backend = store.backend_name(),
            table_prefix = %config.table_prefix,
            migrate = config.migrate,
            "Authority service initialized"
        );

        Ok(Self::new(store))
    }

    /// 基于 PostgreSQL 连接池构建服务
    pub async fn connect(pool: PgPool, config: &StoreConfig) -> Result<Self> {
        let store = PgAuthorityStore::new(pool, &config.table_prefix)?;
        Self::bootstrap(Arc::new(store), config).await
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await?;
        Ok(())
    }

    // ==================== Roles ====================

    /// 创建角色
    pub async fn create_role(&self, role: &NewRole) -> Result<Role> {
        role.validate().map_err(|e| AuthorityError::validation(&e))?;

        if self.store.find_role_by_name(&role.name).await?.is_some() {
            warn!(role = %role.name, "Role already exists");
            record("create_role", "rejected");
            return Err(AuthorityError::RoleAlreadyExists(role.name.clone()));
        }

        let created = self.store.insert_role(role).await.map_err(|e| match e {
            StoreError::UniqueViolation(_) => {
                record("create_role", "rejected");
                AuthorityError::RoleAlreadyExists(role.name.clone())
            }
            other => other.into(),
        })?;

        info!(role_id = created.id, role = %created.name, "Role created");
        record("create_role", "ok");
        Ok(created)
    }

    /// 根据名称获取角色
    pub async fn get_role(&self, name: &str) -> Result<Role> {
        self.store
            .find_role_by_name(name)
            .await?
            .ok_or_else(|| AuthorityError::RoleNotFound(Lookup::Name(name.to_string())))
    }

    /// 根据 ID 获取角色
    pub async fn get_role_by_id(&self, role_id: i64) -> Result<Role> {
        self.store
            .find_role(role_id)
            .await?
            .ok_or(AuthorityError::RoleNotFound(Lookup::Id(role_id)))
    }

    /// 列出所有角色
    pub async fn fetch_all_roles(&self) -> Result<Vec<Role>> {
        Ok(self.store.list_roles().await?)
    }

    /// 删除角色
    ///
    /// 仍有用户持有该角色时拒绝删除；否则在同一事务中删除其权限关联并软删除角色。
    /// 计数只是快速路径，存储层在删除语句内再次确认没有成员。
    pub async fn delete_role(&self, role_id: i64) -> Result<()> {
        let role = self.get_role_by_id(role_id).await?;

        let members = self.store.count_role_members(role_id).await?;
        if members > 0 {
            warn!(role_id, role = %role.name, members, "Cannot delete role in use");
            record("delete_role", "rejected");
            return Err(AuthorityError::RoleInUse(role.name));
        }

        self.store
            .delete_role_cascade(role_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AuthorityError::RoleNotFound(Lookup::Id(role_id)),
                StoreError::InUse => {
                    // 预检查之后有用户获得了该角色
                    warn!(role_id, role = %role.name, "Role gained members before delete");
                    record("delete_role", "rejected");
                    AuthorityError::RoleInUse(role.name.clone())
                }
                other => other.into(),
            })?;

        info!(role_id, role = %role.name, "Role deleted");
        record("delete_role", "ok");
        Ok(())
    }

    // ==================== Permissions ====================

    /// 创建权限
    pub async fn create_permission(&self, permission: &NewPermission) -> Result<Permission> {
        permission
            .validate()
            .map_err(|e| AuthorityError::validation(&e))?;

        if self
            .store
            .find_permission_by_name(&permission.name)
            .await?
            .is_some()
        {
            warn!(permission = %permission.name, "Permission already exists");
            record("create_permission", "rejected");
            return Err(AuthorityError::PermissionAlreadyExists(
                permission.name.clone(),
            ));
        }

        let created = self
            .store
            .insert_permission(permission)
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => {
                    record("create_permission", "rejected");
                    AuthorityError::PermissionAlreadyExists(permission.name.clone())
                }
                other => other.into(),
            })?;

        info!(permission_id = created.id, permission = %created.name, "Permission created");
        record("create_permission", "ok");
        Ok(created)
    }

    /// 根据名称获取权限
    pub async fn get_permission(&self, name: &str) -> Result<Permission> {
        self.store
            .find_permission_by_name(name)
            .await?
            .ok_or_else(|| AuthorityError::PermissionNotFound(Lookup::Name(name.to_string())))
    }

    /// 根据 ID 获取权限
    pub async fn get_permission_by_id(&self, permission_id: i64) -> Result<Permission> {
        self.store
            .find_permission(permission_id)
            .await?
            .ok_or(AuthorityError::PermissionNotFound(Lookup::Id(permission_id)))
    }

    /// 列出所有权限
    pub async fn fetch_all_permissions(&self) -> Result<Vec<Permission>> {
        Ok(self.store.list_permissions().await?)
    }

    /// 删除权限；仍被角色引用时拒绝删除
    pub async fn delete_permission(&self, permission_id: i64) -> Result<()> {
        let permission = self.get_permission_by_id(permission_id).await?;

        let links = self.store.count_permission_links(permission_id).await?;
        if links > 0 {
            warn!(permission_id, permission = %permission.name, links, "Cannot delete permission in use");
            record("delete_permission", "rejected");
            return Err(AuthorityError::PermissionInUse(permission.name));
        }

        self.store
            .delete_permission(permission_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => {
                    AuthorityError::PermissionNotFound(Lookup::Id(permission_id))
                }
                StoreError::InUse => {
                    warn!(permission_id, permission = %permission.name, "Permission granted before delete");
                    record("delete_permission", "rejected");
                    AuthorityError::PermissionInUse(permission.name.clone())
                }
                other => other.into(),
            })?;

        info!(permission_id, permission = %permission.name, "Permission deleted");
        record("delete_permission", "ok");
        Ok(())
    }

    // ==================== Role permissions ====================

    /// 为角色批量分配权限
    ///
    /// 不存在的权限和已分配的权限被跳过并记录在返回的报告中；剩余的新关联
    /// 作为一个批次原子写入。没有任何新关联时返回 `NoOpAssignment`。
    pub async fn assign_permissions_to_role(
        &self,
        req: &RolePermissionRequest,
    ) -> Result<AssignmentReport> {
        let role = self.get_role_by_id(req.role_id).await?;

        let mut report = AssignmentReport::new(role.id);
        let mut batch = Vec::new();

        for &permission_id in &req.permission_ids {
            if report.contains(permission_id) {
                continue;
            }

            let outcome = match self.store.find_permission(permission_id).await? {
                None => AssignmentOutcome::PermissionNotFound,
                Some(permission) => {
                    let link = RolePermission::new(role.id, permission.id);
                    if self.store.role_permission_exists(&link).await? {
                        AssignmentOutcome::AlreadyAssigned
                    } else {
                        batch.push(link);
                        AssignmentOutcome::Assigned
                    }
                }
            };

            if outcome != AssignmentOutcome::Assigned {
                debug!(role_id = role.id, permission_id, ?outcome, "Skipping permission");
            }
            report.push(permission_id, outcome);
        }

        if batch.is_empty() {
            warn!(role_id = role.id, role = %role.name, "No new permissions to assign");
            record("assign_permissions", "rejected");
            return Err(AuthorityError::NoOpAssignment {
                role: role.name,
                report,
            });
        }

        // 只有真正写入的关联才算 Assigned，其余由并发调用者写入
        let inserted = self.store.insert_role_permissions(&batch).await?;
        if inserted.len() != batch.len() {
            for entry in &mut report.entries {
                let link = RolePermission::new(role.id, entry.permission_id);
                if entry.outcome == AssignmentOutcome::Assigned && !inserted.contains(&link) {
                    entry.outcome = AssignmentOutcome::AlreadyAssigned;
                }
            }
            warn!(
                role_id = role.id,
                role = %role.name,
                lost = batch.len() - inserted.len(),
                "Permissions assigned concurrently"
            );
        }

        if report.nothing_assigned() {
            record("assign_permissions", "rejected");
            return Err(AuthorityError::NoOpAssignment {
                role: role.name,
                report,
            });
        }

        info!(
            role_id = role.id,
            role = %role.name,
            requested = req.permission_ids.len(),
            inserted = inserted.len(),
            "Permissions assigned to role"
        );
        record("assign_permissions", "ok");
        Ok(report)
    }

    /// 检查角色是否拥有权限
    pub async fn check_role_permission(&self, role_id: i64, permission_id: i64) -> Result<bool> {
        Ok(self
            .store
            .role_permission_exists(&RolePermission::new(role_id, permission_id))
            .await?)
    }

    /// 撤销角色的权限
    pub async fn revoke_role_permission(&self, role_id: i64, permission_id: i64) -> Result<()> {
        let link = RolePermission::new(role_id, permission_id);

        if self.store.delete_role_permission(&link).await? == 0 {
            let role = self.get_role_by_id(role_id).await?;
            let permission = self.get_permission_by_id(permission_id).await?;

            warn!(role_id, permission_id, "Permission not assigned to role");
            record("revoke_role_permission", "rejected");
            return Err(AuthorityError::PermissionNotAssigned {
                permission: permission.name,
                role: role.name,
            });
        }

        info!(role_id, permission_id, "Permission revoked from role");
        record("revoke_role_permission", "ok");
        Ok(())
    }

    /// 获取角色的所有权限
    pub async fn get_role_permissions(&self, role_id: i64) -> Result<Vec<Permission>> {
        let permission_ids: Vec<i64> = self
            .store
            .role_permissions(role_id)
            .await?
            .into_iter()
            .map(|link| link.permission_id)
            .collect();

        if permission_ids.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self.store.permissions_by_ids(&permission_ids).await?)
    }

    // ==================== User roles ====================

    /// 为用户分配角色
    pub async fn assign_role_to_user(&self, req: &UserRole) -> Result<()> {
        let role = self.get_role_by_id(req.role_id).await?;

        if self.store.user_role_exists(req).await? {
            warn!(user_id = req.user_id, role = %role.name, "Role already assigned to user");
            record("assign_role", "rejected");
            return Err(AuthorityError::RoleAlreadyAssigned {
                role: role.name,
                user_id: req.user_id,
            });
        }

        self.store.insert_user_role(req).await.map_err(|e| match e {
            StoreError::UniqueViolation(_) => {
                record("assign_role", "rejected");
                AuthorityError::RoleAlreadyAssigned {
                    role: role.name.clone(),
                    user_id: req.user_id,
                }
            }
            other => other.into(),
        })?;

        info!(user_id = req.user_id, role_id = role.id, role = %role.name, "Role assigned to user");
        record("assign_role", "ok");
        Ok(())
    }

    /// 检查用户是否持有角色
    pub async fn check_user_role(&self, user_id: i64, role_id: i64) -> Result<bool> {
        Ok(self
            .store
            .user_role_exists(&UserRole::new(user_id, role_id))
            .await?)
    }

    /// 检查用户是否通过任一角色拥有指定权限
    pub async fn check_user_permission(&self, user_id: i64, permission_name: &str) -> Result<bool> {
        let role_ids: Vec<i64> = self
            .store
            .user_roles(user_id)
            .await?
            .into_iter()
            .map(|link| link.role_id)
            .collect();

        if role_ids.is_empty() {
            return Err(AuthorityError::UserHasNoRole(user_id));
        }

        let permission = self.get_permission(permission_name).await?;

        Ok(self
            .store
            .any_role_grants(&role_ids, permission.id)
            .await?)
    }

    /// 撤销用户的角色
    pub async fn revoke_user_role(&self, user_id: i64, role_id: i64) -> Result<()> {
        let link = UserRole::new(user_id, role_id);

        if self.store.delete_user_role(&link).await? == 0 {
            let role = self.get_role_by_id(role_id).await?;

            warn!(user_id, role_id, "Role not assigned to user");
            record("revoke_user_role", "rejected");
            return Err(AuthorityError::RoleNotAssigned {
                role: role.name,
                user_id,
            });
        }

        info!(user_id, role_id, "Role revoked from user");
        record("revoke_user_role", "ok");
        Ok(())
    }

    /// 获取用户的所有角色
    pub async fn get_user_roles(&self, user_id: i64) -> Result<Vec<Role>> {
        let role_ids: Vec<i64> = self
            .store
            .user_roles(user_id)
            .await?
            .into_iter()
            .map(|link| link.role_id)
            .collect();

        if role_ids.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self.store.roles_by_ids(&role_ids).await?)
    }
}
