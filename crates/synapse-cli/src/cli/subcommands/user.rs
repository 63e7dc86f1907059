use clap::Subcommand;

use super::RoleArg;

/// User administration commands.
#[derive(Clone, Debug, Subcommand)]
pub enum UserCommands {
    /// Create a user and print its first API token.
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, value_enum)]
        role: RoleArg,
    },
    /// List users.
    List {
        #[arg(long, value_enum)]
        role: Option<RoleArg>,
    },
    /// Get a user by ID.
    Get { id: String },
    /// Re-enable a deactivated user.
    Activate { id: String },
    /// Disable a user; its token stops working.
    Deactivate { id: String },
    /// Issue a new API token, invalidating the old one.
    RotateToken { id: String },
}
