//! User <-> role association

use serde::{Deserialize, Serialize};

/// Join row: existence means "user holds role".
///
/// `user_id` is an opaque external identifier; users are not stored here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRole {
    pub user_id: i64,
    pub role_id: i64,
}

impl UserRole {
    pub fn new(user_id: i64, role_id: i64) -> Self {
        Self { user_id, role_id }
    }
}
