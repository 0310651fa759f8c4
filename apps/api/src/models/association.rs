use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A many-to-many link family between two ATS entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    /// Tags attached to a candidate application.
    ApplicationTags,
    /// Permissions granted to a role.
    RolePermissions,
}

impl AssociationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationKind::ApplicationTags => "application_tags",
            AssociationKind::RolePermissions => "role_permissions",
        }
    }

    /// Backing table name. Also the REST resource name.
    pub fn table(&self) -> &'static str {
        self.as_str()
    }

    pub fn parent_column(&self) -> &'static str {
        match self {
            AssociationKind::ApplicationTags => "application_id",
            AssociationKind::RolePermissions => "role_id",
        }
    }

    pub fn child_column(&self) -> &'static str {
        match self {
            AssociationKind::ApplicationTags => "tag_id",
            AssociationKind::RolePermissions => "permission_id",
        }
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Realtime notification emitted after a dialog commit applied changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationChanged {
    pub kind: AssociationKind,
    pub parent_id: Uuid,
    pub added: Vec<Uuid>,
    pub removed: Vec<Uuid>,
    pub actor: Uuid,
    pub occurred_at: DateTime<Utc>,
}
