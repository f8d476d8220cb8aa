//! Storage layer
//!
//! `AuthorityStore` is the narrow interface the service consumes. Backends must
//! distinguish "not found" from other failures and must enforce name uniqueness
//! themselves; the service's pre-checks are only a fast path.

pub mod memory_store;
pub mod pg_store;

pub use memory_store::InMemoryStore;
pub use pg_store::PgAuthorityStore;

use crate::{
    error::{StoreError, StoreResult},
    models::*,
};
use async_trait::async_trait;

#[async_trait]
pub trait AuthorityStore: Send + Sync {
    // ==================== Roles ====================

    async fn find_role(&self, id: i64) -> StoreResult<Option<Role>>;
    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;
    /// Fails with `UniqueViolation` when a live role already has the name.
    async fn insert_role(&self, role: &NewRole) -> StoreResult<Role>;
    async fn list_roles(&self) -> StoreResult<Vec<Role>>;
    async fn roles_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Role>>;
    /// Deletes the role's permission links and soft-deletes the role in one
    /// transaction. `NotFound` if the role is already gone, `InUse` (and nothing
    /// changed) if a user still holds it.
    async fn delete_role_cascade(&self, id: i64) -> StoreResult<()>;

    // ==================== Permissions ====================

    async fn find_permission(&self, id: i64) -> StoreResult<Option<Permission>>;
    async fn find_permission_by_name(&self, name: &str) -> StoreResult<Option<Permission>>;
    async fn insert_permission(&self, permission: &NewPermission) -> StoreResult<Permission>;
    async fn list_permissions(&self) -> StoreResult<Vec<Permission>>;
    async fn permissions_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Permission>>;
    /// Soft-deletes the permission. `InUse` if any role still grants it.
    async fn delete_permission(&self, id: i64) -> StoreResult<()>;

    // ==================== Role permissions ====================

    async fn role_permission_exists(&self, link: &RolePermission) -> StoreResult<bool>;
    /// Inserts the batch atomically, skipping pairs that already exist.
    /// Returns the pairs this call actually inserted.
    async fn insert_role_permissions(
        &self,
        links: &[RolePermission],
    ) -> StoreResult<Vec<RolePermission>>;
    async fn delete_role_permission(&self, link: &RolePermission) -> StoreResult<u64>;
    async fn role_permissions(&self, role_id: i64) -> StoreResult<Vec<RolePermission>>;
    async fn count_permission_links(&self, permission_id: i64) -> StoreResult<i64>;
    async fn any_role_grants(&self, role_ids: &[i64], permission_id: i64) -> StoreResult<bool>;

    // ==================== User roles ====================

    async fn user_role_exists(&self, link: &UserRole) -> StoreResult<bool>;
    /// Fails with `UniqueViolation` when the pair already exists.
    async fn insert_user_role(&self, link: &UserRole) -> StoreResult<()>;
    async fn delete_user_role(&self, link: &UserRole) -> StoreResult<u64>;
    async fn user_roles(&self, user_id: i64) -> StoreResult<Vec<UserRole>>;
    async fn count_role_members(&self, role_id: i64) -> StoreResult<i64>;

    /// Creates or updates schema objects. No-op for stores without a schema.
    async fn ensure_schema(&self) -> StoreResult<()>;
    async fn health_check(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}

/// Prefixed table names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub roles: String,
    pub permissions: String,
    pub role_permissions: String,
    pub user_roles: String,
}

impl TableNames {
    /// The prefix is spliced into SQL identifiers, so only `[A-Za-z0-9_]` is accepted.
    pub fn with_prefix(prefix: &str) -> StoreResult<Self> {
        if !prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
            || prefix.starts_with(|c: char| c.is_ascii_digit())
        {
            return Err(StoreError::InvalidTablePrefix(prefix.to_string()));
        }

        Ok(Self {
            roles: format!("{prefix}roles"),
            permissions: format!("{prefix}permissions"),
            role_permissions: format!("{prefix}role_permissions"),
            user_roles: format!("{prefix}user_roles"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names_with_prefix() {
        let tables = TableNames::with_prefix("authz_").unwrap();
        assert_eq!(tables.roles, "authz_roles");
        assert_eq!(tables.role_permissions, "authz_role_permissions");

        let plain = TableNames::with_prefix("").unwrap();
        assert_eq!(plain.user_roles, "user_roles");
    }

    #[test]
    fn test_table_prefix_rejects_sql() {
        assert!(TableNames::with_prefix("x; DROP TABLE roles; --").is_err());
        assert!(TableNames::with_prefix("a-b").is_err());
        assert!(TableNames::with_prefix("1abc").is_err());
    }
}
