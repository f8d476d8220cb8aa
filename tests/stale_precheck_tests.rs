//! 预检查失效时的服务行为
//!
//! `StalePrechecks` 包装内存存储，让所有 "先查" 的读取都看不到已有数据，
//! 模拟另一个调用者在预检查与写入之间完成了写入。此时只能依靠存储层的
//! 约束给出正确的错误。

use async_trait::async_trait;
use authority::{
    error::{AuthorityError, ErrorKind, StoreResult},
    models::*,
    repository::{AuthorityStore, InMemoryStore},
    AuthorityService,
};
use std::sync::Arc;

/// 按名称查找、存在性检查与引用计数总是返回 "不存在"
struct StalePrechecks {
    inner: InMemoryStore,
}

#[async_trait]
impl AuthorityStore for StalePrechecks {
    async fn find_role(&self, id: i64) -> StoreResult<Option<Role>> {
        self.inner.find_role(id).await
    }

    async fn find_role_by_name(&self, _name: &str) -> StoreResult<Option<Role>> {
        Ok(None)
    }

    async fn insert_role(&self, role: &NewRole) -> StoreResult<Role> {
        self.inner.insert_role(role).await
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        self.inner.list_roles().await
    }

    async fn roles_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Role>> {
        self.inner.roles_by_ids(ids).await
    }

    async fn delete_role_cascade(&self, id: i64) -> StoreResult<()> {
        self.inner.delete_role_cascade(id).await
    }

    async fn find_permission(&self, id: i64) -> StoreResult<Option<Permission>> {
        self.inner.find_permission(id).await
    }

    async fn find_permission_by_name(&self, _name: &str) -> StoreResult<Option<Permission>> {
        Ok(None)
    }

    async fn insert_permission(&self, permission: &NewPermission) -> StoreResult<Permission> {
        self.inner.insert_permission(permission).await
    }

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        self.inner.list_permissions().await
    }

    async fn permissions_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Permission>> {
        self.inner.permissions_by_ids(ids).await
    }

    async fn delete_permission(&self, id: i64) -> StoreResult<()> {
        self.inner.delete_permission(id).await
    }

    async fn role_permission_exists(&self, _link: &RolePermission) -> StoreResult<bool> {
        Ok(false)
    }

    async fn insert_role_permissions(
        &self,
        links: &[RolePermission],
    ) -> StoreResult<Vec<RolePermission>> {
        self.inner.insert_role_permissions(links).await
    }

    async fn delete_role_permission(&self, link: &RolePermission) -> StoreResult<u64> {
        self.inner.delete_role_permission(link).await
    }

    async fn role_permissions(&self, role_id: i64) -> StoreResult<Vec<RolePermission>> {
        self.inner.role_permissions(role_id).await
    }

    async fn count_permission_links(&self, _permission_id: i64) -> StoreResult<i64> {
        Ok(0)
    }

    async fn any_role_grants(&self, role_ids: &[i64], permission_id: i64) -> StoreResult<bool> {
        self.inner.any_role_grants(role_ids, permission_id).await
    }

    async fn user_role_exists(&self, _link: &UserRole) -> StoreResult<bool> {
        Ok(false)
    }

    async fn insert_user_role(&self, link: &UserRole) -> StoreResult<()> {
        self.inner.insert_user_role(link).await
    }

    async fn delete_user_role(&self, link: &UserRole) -> StoreResult<u64> {
        self.inner.delete_user_role(link).await
    }

    async fn user_roles(&self, user_id: i64) -> StoreResult<Vec<UserRole>> {
        self.inner.user_roles(user_id).await
    }

    async fn count_role_members(&self, _role_id: i64) -> StoreResult<i64> {
        Ok(0)
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        self.inner.ensure_schema().await
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.inner.health_check().await
    }

    fn backend_name(&self) -> &'static str {
        "memory-stale"
    }
}

/// 返回服务与底层存储；底层存储用于准备数据和核对结果
fn stale_service() -> (AuthorityService, InMemoryStore) {
    let inner = InMemoryStore::new();
    let service = AuthorityService::new(Arc::new(StalePrechecks {
        inner: inner.clone(),
    }));
    (service, inner)
}

#[tokio::test]
async fn test_duplicate_role_rejected_by_store() {
    let (service, store) = stale_service();
    service.create_role(&NewRole::new("admin")).await.unwrap();

    let err = service.create_role(&NewRole::new("admin")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert!(matches!(err, AuthorityError::RoleAlreadyExists(ref name) if name == "admin"));
    assert_eq!(store.list_roles().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_permission_rejected_by_store() {
    let (service, store) = stale_service();
    service
        .create_permission(&NewPermission::new("read"))
        .await
        .unwrap();

    let err = service
        .create_permission(&NewPermission::new("read"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert!(matches!(err, AuthorityError::PermissionAlreadyExists(ref name) if name == "read"));
    assert_eq!(store.list_permissions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_user_role_rejected_by_store() {
    let (service, _store) = stale_service();
    let role = service.create_role(&NewRole::new("editor")).await.unwrap();
    let link = UserRole::new(42, role.id);
    service.assign_role_to_user(&link).await.unwrap();

    let err = service.assign_role_to_user(&link).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert!(matches!(
        err,
        AuthorityError::RoleAlreadyAssigned { ref role, user_id: 42 } if role == "editor"
    ));
}

#[tokio::test]
async fn test_delete_role_with_members_refused_by_store() {
    let (service, store) = stale_service();
    let role = service.create_role(&NewRole::new("ops")).await.unwrap();
    let permission = service
        .create_permission(&NewPermission::new("deploy"))
        .await
        .unwrap();
    store
        .insert_role_permissions(&[RolePermission::new(role.id, permission.id)])
        .await
        .unwrap();
    store.insert_user_role(&UserRole::new(7, role.id)).await.unwrap();

    let err = service.delete_role(role.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InUse);
    assert!(matches!(err, AuthorityError::RoleInUse(ref name) if name == "ops"));

    // 角色与其权限关联保持不变
    assert!(store.find_role(role.id).await.unwrap().is_some());
    assert_eq!(store.role_permissions(role.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_granted_permission_refused_by_store() {
    let (service, store) = stale_service();
    let role = service.create_role(&NewRole::new("ops")).await.unwrap();
    let permission = service
        .create_permission(&NewPermission::new("deploy"))
        .await
        .unwrap();
    store
        .insert_role_permissions(&[RolePermission::new(role.id, permission.id)])
        .await
        .unwrap();

    let err = service.delete_permission(permission.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InUse);
    assert!(matches!(err, AuthorityError::PermissionInUse(ref name) if name == "deploy"));
    assert!(store.find_permission(permission.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_batch_reports_only_rows_actually_inserted() {
    let (service, store) = stale_service();
    let role = service.create_role(&NewRole::new("auditor")).await.unwrap();
    let read = service
        .create_permission(&NewPermission::new("read"))
        .await
        .unwrap();
    let write = service
        .create_permission(&NewPermission::new("write"))
        .await
        .unwrap();
    // 另一个调用者已写入 read
    store
        .insert_role_permissions(&[RolePermission::new(role.id, read.id)])
        .await
        .unwrap();

    let report = service
        .assign_permissions_to_role(&RolePermissionRequest {
            role_id: role.id,
            permission_ids: vec![read.id, write.id],
        })
        .await
        .unwrap();

    assert_eq!(report.assigned(), vec![write.id]);
    assert_eq!(
        report.with_outcome(AssignmentOutcome::AlreadyAssigned),
        vec![read.id]
    );
    assert_eq!(store.role_permissions(role.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_batch_entirely_lost_to_other_caller_is_no_op() {
    let (service, store) = stale_service();
    let role = service.create_role(&NewRole::new("auditor")).await.unwrap();
    let read = service
        .create_permission(&NewPermission::new("read"))
        .await
        .unwrap();
    store
        .insert_role_permissions(&[RolePermission::new(role.id, read.id)])
        .await
        .unwrap();

    let err = service
        .assign_permissions_to_role(&RolePermissionRequest {
            role_id: role.id,
            permission_ids: vec![read.id],
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoOpAssignment);
    match err {
        AuthorityError::NoOpAssignment { report, .. } => {
            assert!(report.nothing_assigned());
            assert_eq!(
                report.with_outcome(AssignmentOutcome::AlreadyAssigned),
                vec![read.id]
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
