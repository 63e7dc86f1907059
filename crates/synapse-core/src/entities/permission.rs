use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{Action, Resource, Role};

/// One row of the RBAC matrix: `role` may perform `action` on `resource`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermissionGrant {
    pub resource: Resource,
    pub action: Action,
    pub role: Role,
}
