use clap::{Args, Subcommand};

use super::subcommands::{PermissionCommands, SlaCommands, UserCommands};

/// Top-level commands for `synapse`.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP API server with the SLA monitor.
    Serve(ServeArgs),
    /// Open the database and apply pending migrations.
    Migrate,
    /// Seed the default permission matrix and a first admin user.
    Seed(SeedArgs),
    /// User administration.
    User {
        #[command(subcommand)]
        action: UserCommands,
    },
    /// SLA checks and violations.
    Sla {
        #[command(subcommand)]
        action: SlaCommands,
    },
    /// Query the audit trail.
    Audit(AuditArgs),
    /// Role permission matrix.
    Permission {
        #[command(subcommand)]
        action: PermissionCommands,
    },
}

/// Arguments for `synapse serve`.
#[derive(Clone, Debug, Args)]
pub struct ServeArgs {
    /// Bind address, overriding `server.bind_address`.
    #[arg(long)]
    pub bind: Option<String>,
    /// Port, overriding `server.port`.
    #[arg(long)]
    pub port: Option<u16>,
}

/// Arguments for `synapse seed`.
#[derive(Clone, Debug, Args)]
pub struct SeedArgs {
    #[arg(long, default_value = "admin@synapse.local")]
    pub admin_email: String,
    #[arg(long, default_value = "Administrator")]
    pub admin_name: String,
}

/// Arguments for `synapse audit`.
#[derive(Clone, Debug, Args)]
pub struct AuditArgs {
    #[arg(long)]
    pub entity_type: Option<String>,
    #[arg(long)]
    pub entity_id: Option<String>,
    #[arg(long)]
    pub action: Option<String>,
    /// Only entries recorded by this user id.
    #[arg(long)]
    pub actor: Option<String>,
}
