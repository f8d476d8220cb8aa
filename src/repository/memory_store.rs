//! In-memory authority store.
//!
//! All four tables live behind a single `tokio::sync::RwLock`, so every
//! mutation (including the batch insert and the role cascade) is applied
//! atomically with respect to other callers. Not durable: state is lost when
//! the store is dropped. Used for tests and local development.

use super::AuthorityStore;
use crate::{
    error::{StoreError, StoreResult},
    models::*,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    next_role_id: i64,
    next_permission_id: i64,
    /// Soft-deleted rows stay here with `deleted_at` set.
    roles: BTreeMap<i64, Role>,
    permissions: BTreeMap<i64, Permission>,
    /// `(role_id, permission_id)`
    role_permissions: BTreeSet<(i64, i64)>,
    /// `(user_id, role_id)`
    user_roles: BTreeSet<(i64, i64)>,
}

impl State {
    fn live_role(&self, id: i64) -> Option<&Role> {
        self.roles.get(&id).filter(|r| !r.is_deleted())
    }

    fn live_permission(&self, id: i64) -> Option<&Permission> {
        self.permissions.get(&id).filter(|p| !p.is_deleted())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthorityStore for InMemoryStore {
    // ==================== Roles ====================

    async fn find_role(&self, id: i64) -> StoreResult<Option<Role>> {
        Ok(self.state.read().await.live_role(id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state
            .roles
            .values()
            .find(|r| !r.is_deleted() && r.name == name)
            .cloned())
    }

    async fn insert_role(&self, role: &NewRole) -> StoreResult<Role> {
        let mut state = self.state.write().await;
        if state
            .roles
            .values()
            .any(|r| !r.is_deleted() && r.name == role.name)
        {
            return Err(StoreError::UniqueViolation("roles_name_key".to_string()));
        }

        state.next_role_id += 1;
        let now = Utc::now();
        let row = Role {
            id: state.next_role_id,
            name: role.name.clone(),
            display_name: role.display_name.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.roles.insert(row.id, row.clone());

        Ok(row)
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.values().filter(|r| !r.is_deleted()).cloned().collect())
    }

    async fn roles_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Role>> {
        let state = self.state.read().await;
        Ok(state
            .roles
            .values()
            .filter(|r| !r.is_deleted() && ids.contains(&r.id))
            .cloned()
            .collect())
    }

    async fn delete_role_cascade(&self, id: i64) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.live_role(id).is_none() {
            return Err(StoreError::NotFound);
        }
        if state.user_roles.iter().any(|&(_, role_id)| role_id == id) {
            return Err(StoreError::InUse);
        }

        state.role_permissions.retain(|&(role_id, _)| role_id != id);
        if let Some(role) = state.roles.get_mut(&id) {
            let now = Utc::now();
            role.deleted_at = Some(now);
            role.updated_at = now;
        }

        Ok(())
    }

    // ==================== Permissions ====================

    async fn find_permission(&self, id: i64) -> StoreResult<Option<Permission>> {
        Ok(self.state.read().await.live_permission(id).cloned())
    }

    async fn find_permission_by_name(&self, name: &str) -> StoreResult<Option<Permission>> {
        let state = self.state.read().await;
        Ok(state
            .permissions
            .values()
            .find(|p| !p.is_deleted() && p.name == name)
            .cloned())
    }

    async fn insert_permission(&self, permission: &NewPermission) -> StoreResult<Permission> {
        let mut state = self.state.write().await;
        if state
            .permissions
            .values()
            .any(|p| !p.is_deleted() && p.name == permission.name)
        {
            return Err(StoreError::UniqueViolation(
                "permissions_name_key".to_string(),
            ));
        }

        state.next_permission_id += 1;
        let now = Utc::now();
        let row = Permission {
            id: state.next_permission_id,
            name: permission.name.clone(),
            display_name: permission.display_name.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.permissions.insert(row.id, row.clone());

        Ok(row)
    }

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        let state = self.state.read().await;
        Ok(state
            .permissions
            .values()
            .filter(|p| !p.is_deleted())
            .cloned()
            .collect())
    }

    async fn permissions_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Permission>> {
        let state = self.state.read().await;
        Ok(state
            .permissions
            .values()
            .filter(|p| !p.is_deleted() && ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn delete_permission(&self, id: i64) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.live_permission(id).is_some()
            && state.role_permissions.iter().any(|&(_, p)| p == id)
        {
            return Err(StoreError::InUse);
        }

        match state.permissions.get_mut(&id) {
            Some(permission) if !permission.is_deleted() => {
                let now = Utc::now();
                permission.deleted_at = Some(now);
                permission.updated_at = now;
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    // ==================== Role permissions ====================

    async fn role_permission_exists(&self, link: &RolePermission) -> StoreResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .role_permissions
            .contains(&(link.role_id, link.permission_id)))
    }

    async fn insert_role_permissions(
        &self,
        links: &[RolePermission],
    ) -> StoreResult<Vec<RolePermission>> {
        let mut state = self.state.write().await;
        let mut inserted = Vec::new();
        for link in links {
            if state
                .role_permissions
                .insert((link.role_id, link.permission_id))
            {
                inserted.push(*link);
            }
        }

        Ok(inserted)
    }

    async fn delete_role_permission(&self, link: &RolePermission) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        Ok(u64::from(
            state
                .role_permissions
                .remove(&(link.role_id, link.permission_id)),
        ))
    }

    async fn role_permissions(&self, role_id: i64) -> StoreResult<Vec<RolePermission>> {
        let state = self.state.read().await;
        Ok(state
            .role_permissions
            .iter()
            .filter(|(r, _)| *r == role_id)
            .map(|&(r, p)| RolePermission::new(r, p))
            .collect())
    }

    async fn count_permission_links(&self, permission_id: i64) -> StoreResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .role_permissions
            .iter()
            .filter(|(_, p)| *p == permission_id)
            .count() as i64)
    }

    async fn any_role_grants(&self, role_ids: &[i64], permission_id: i64) -> StoreResult<bool> {
        let state = self.state.read().await;
        Ok(role_ids
            .iter()
            .any(|&r| state.role_permissions.contains(&(r, permission_id))))
    }

    // ==================== User roles ====================

    async fn user_role_exists(&self, link: &UserRole) -> StoreResult<bool> {
        let state = self.state.read().await;
        Ok(state.user_roles.contains(&(link.user_id, link.role_id)))
    }

    async fn insert_user_role(&self, link: &UserRole) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.user_roles.insert((link.user_id, link.role_id)) {
            return Err(StoreError::UniqueViolation("user_roles_pkey".to_string()));
        }

        Ok(())
    }

    async fn delete_user_role(&self, link: &UserRole) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        Ok(u64::from(
            state.user_roles.remove(&(link.user_id, link.role_id)),
        ))
    }

    async fn user_roles(&self, user_id: i64) -> StoreResult<Vec<UserRole>> {
        let state = self.state.read().await;
        Ok(state
            .user_roles
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|&(u, r)| UserRole::new(u, r))
            .collect())
    }

    async fn count_role_members(&self, role_id: i64) -> StoreResult<i64> {
        let state = self.state.read().await;
        Ok(state.user_roles.iter().filter(|(_, r)| *r == role_id).count() as i64)
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
