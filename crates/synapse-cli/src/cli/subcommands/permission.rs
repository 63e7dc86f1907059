use clap::{Args, Subcommand};
use synapse_core::entities::PermissionGrant;

use super::{ActionArg, ResourceArg, RoleArg};

/// Permission matrix commands.
#[derive(Clone, Debug, Subcommand)]
pub enum PermissionCommands {
    /// List every grant.
    List,
    /// Allow a role to perform an action on a resource.
    Grant(GrantArgs),
    /// Remove a grant.
    Revoke(GrantArgs),
}

#[derive(Clone, Debug, Args)]
pub struct GrantArgs {
    #[arg(value_enum)]
    pub resource: ResourceArg,
    #[arg(value_enum)]
    pub action: ActionArg,
    #[arg(value_enum)]
    pub role: RoleArg,
}

impl GrantArgs {
    #[must_use]
    pub fn grant(&self) -> PermissionGrant {
        PermissionGrant {
            resource: self.resource.into(),
            action: self.action.into(),
            role: self.role.into(),
        }
    }
}
