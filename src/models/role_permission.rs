//! Role <-> permission association

use serde::{Deserialize, Serialize};

/// Join row: existence means "role grants permission".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::FromRow)]
pub struct RolePermission {
    pub role_id: i64,
    pub permission_id: i64,
}

impl RolePermission {
    pub fn new(role_id: i64, permission_id: i64) -> Self {
        Self {
            role_id,
            permission_id,
        }
    }
}

/// Assign permissions to role request
#[derive(Debug, Clone, Deserialize)]
pub struct RolePermissionRequest {
    pub role_id: i64,
    pub permission_ids: Vec<i64>,
}

/// What happened to a single permission ID in a batch assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentOutcome {
    Assigned,
    PermissionNotFound,
    AlreadyAssigned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentEntry {
    pub permission_id: i64,
    pub outcome: AssignmentOutcome,
}

/// Per-ID result of `assign_permissions_to_role`.
///
/// Entries follow request order; repeated IDs in a request appear once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentReport {
    pub role_id: i64,
    pub entries: Vec<AssignmentEntry>,
}

impl AssignmentReport {
    pub fn new(role_id: i64) -> Self {
        Self {
            role_id,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, permission_id: i64, outcome: AssignmentOutcome) {
        self.entries.push(AssignmentEntry {
            permission_id,
            outcome,
        });
    }

    pub fn contains(&self, permission_id: i64) -> bool {
        self.entries.iter().any(|e| e.permission_id == permission_id)
    }

    /// IDs with the given outcome
    pub fn with_outcome(&self, outcome: AssignmentOutcome) -> Vec<i64> {
        self.entries
            .iter()
            .filter(|e| e.outcome == outcome)
            .map(|e| e.permission_id)
            .collect()
    }

    pub fn assigned(&self) -> Vec<i64> {
        self.with_outcome(AssignmentOutcome::Assigned)
    }

    /// True when no entry ended up `Assigned`
    pub fn nothing_assigned(&self) -> bool {
        self.assigned().is_empty()
    }
}
