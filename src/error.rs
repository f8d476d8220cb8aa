//! 统一错误模型
//! 存储层错误 (StoreError) 与服务层错误 (AuthorityError)

use std::fmt;
use thiserror::Error;

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AuthorityError>;

/// 存储层结果类型
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// 存储层错误
///
/// `NotFound` 与其他 I/O 错误区分开，唯一约束冲突单独暴露。
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("record still referenced")]
    InUse,

    #[error("invalid table prefix: {0:?}")]
    InvalidTablePrefix(String),

    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::UniqueViolation(
                    db.constraint()
                        .map(str::to_string)
                        .unwrap_or_else(|| db.message().to_string()),
                )
            }
            other => StoreError::Database(other),
        }
    }
}

/// 实体引用（按 ID 或名称）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Id(i64),
    Name(String),
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Id(id) => write!(f, "id {}", id),
            Lookup::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// 错误语义分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AlreadyExists,
    NotFound,
    InUse,
    NoOpAssignment,
    Invalid,
    Store,
}

/// 服务层错误类型
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("role '{0}' already exists")]
    RoleAlreadyExists(String),

    #[error("permission '{0}' already exists")]
    PermissionAlreadyExists(String),

    #[error("role '{role}' already assigned to user '{user_id}'")]
    RoleAlreadyAssigned { role: String, user_id: i64 },

    #[error("role not found: {0}")]
    RoleNotFound(Lookup),

    #[error("permission not found: {0}")]
    PermissionNotFound(Lookup),

    #[error("user '{0}' doesn't have any role")]
    UserHasNoRole(i64),

    #[error("role '{role}' not assigned to user '{user_id}'")]
    RoleNotAssigned { role: String, user_id: i64 },

    #[error("permission '{permission}' not assigned to role '{role}'")]
    PermissionNotAssigned { permission: String, role: String },

    #[error("cannot delete assigned role '{0}'")]
    RoleInUse(String),

    #[error("cannot delete assigned permission '{0}'")]
    PermissionInUse(String),

    #[error("no new permissions assigned to role '{role}'")]
    NoOpAssignment {
        role: String,
        report: crate::models::AssignmentReport,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthorityError {
    /// 获取错误语义分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthorityError::RoleAlreadyExists(_)
            | AuthorityError::PermissionAlreadyExists(_)
            | AuthorityError::RoleAlreadyAssigned { .. } => ErrorKind::AlreadyExists,
            AuthorityError::RoleNotFound(_)
            | AuthorityError::PermissionNotFound(_)
            | AuthorityError::UserHasNoRole(_)
            | AuthorityError::RoleNotAssigned { .. }
            | AuthorityError::PermissionNotAssigned { .. } => ErrorKind::NotFound,
            AuthorityError::RoleInUse(_) | AuthorityError::PermissionInUse(_) => ErrorKind::InUse,
            AuthorityError::NoOpAssignment { .. } => ErrorKind::NoOpAssignment,
            AuthorityError::Validation(_) | AuthorityError::Store(StoreError::InvalidTablePrefix(_)) => {
                ErrorKind::Invalid
            }
            AuthorityError::Store(_) => ErrorKind::Store,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }

    pub fn validation(err: &validator::ValidationErrors) -> Self {
        AuthorityError::Validation(err.to_string())
    }
}

impl From<sqlx::Error> for AuthorityError {
    fn from(e: sqlx::Error) -> Self {
        AuthorityError::Store(StoreError::from(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            AuthorityError::RoleAlreadyExists("admin".to_string()).kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(AuthorityError::RoleNotFound(Lookup::Id(1)).kind(), ErrorKind::NotFound);
        assert_eq!(
            AuthorityError::PermissionInUse("read".to_string()).kind(),
            ErrorKind::InUse
        );
        assert_eq!(
            AuthorityError::Store(StoreError::NotFound).kind(),
            ErrorKind::Store
        );
        assert_eq!(
            AuthorityError::Validation("bad".to_string()).kind(),
            ErrorKind::Invalid
        );
    }

    #[test]
    fn test_row_not_found_maps_to_store_not_found() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn test_messages_name_entities() {
        let err = AuthorityError::RoleNotAssigned {
            role: "editor".to_string(),
            user_id: 7,
        };
        assert_eq!(err.to_string(), "role 'editor' not assigned to user '7'");
        assert_eq!(
            AuthorityError::PermissionNotFound(Lookup::Name("read".to_string())).to_string(),
            "permission not found: 'read'"
        );
    }
}
