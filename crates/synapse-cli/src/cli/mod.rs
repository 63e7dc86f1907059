use clap::Parser;

pub mod global;
pub mod root_commands;
pub mod subcommands;

pub use global::{GlobalFlags, OutputFormat};
pub use root_commands::Commands;

/// Top-level CLI parser for the `synapse` binary.
#[derive(Debug, Parser)]
#[command(
    name = "synapse",
    version,
    about = "SynapseDTE - regulatory data testing workflow service"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: json, table, raw
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Max results to return
    #[arg(short, long, global = true)]
    pub limit: Option<u32>,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Database path, overriding `database.path` from config
    #[arg(short, long, global = true)]
    pub database: Option<String>,
}

impl Cli {
    /// Extract ergonomic global flags struct for command handlers.
    #[must_use]
    pub fn global_flags(&self) -> GlobalFlags {
        GlobalFlags {
            format: self.format,
            limit: self.limit,
            quiet: self.quiet,
            verbose: self.verbose,
            database: self.database.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use synapse_core::enums::{Action, Resource, Role};

    use super::subcommands::{PermissionCommands, UserCommands};
    use super::{Cli, Commands, GlobalFlags, OutputFormat};

    #[test]
    fn clap_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_before_subcommand() {
        let cli = Cli::try_parse_from([
            "synapse",
            "--format",
            "table",
            "--limit",
            "10",
            "--verbose",
            "migrate",
        ])
        .expect("cli should parse");

        assert_eq!(cli.format, OutputFormat::Table);
        assert_eq!(cli.limit, Some(10));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Migrate));
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["synapse", "migrate", "--format", "raw", "--quiet"])
            .expect("cli should parse");

        assert_eq!(cli.format, OutputFormat::Raw);
        assert!(cli.quiet);
    }

    #[test]
    fn output_format_rejects_invalid_value() {
        let parsed = Cli::try_parse_from(["synapse", "--format", "xml", "migrate"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn database_flag_is_extracted() {
        let cli = Cli::try_parse_from(["synapse", "--database", "/tmp/s.db", "migrate"])
            .expect("cli should parse");
        let flags: GlobalFlags = cli.global_flags();
        assert_eq!(flags.database.as_deref(), Some("/tmp/s.db"));
    }

    #[test]
    fn user_create_parses_role() {
        let cli = Cli::try_parse_from([
            "synapse",
            "user",
            "create",
            "--email",
            "t@bank.example",
            "--name",
            "Tess",
            "--role",
            "report-owner-executive",
        ])
        .expect("cli should parse");
        let Commands::User {
            action: UserCommands::Create { role, .. },
        } = cli.command
        else {
            panic!("expected user create");
        };
        assert_eq!(Role::from(role), Role::ReportOwnerExecutive);
    }

    #[test]
    fn permission_grant_parses_triple() {
        let cli = Cli::try_parse_from([
            "synapse", "permission", "grant", "audit", "read", "tester",
        ])
        .expect("cli should parse");
        let Commands::Permission {
            action: PermissionCommands::Grant(args),
        } = cli.command
        else {
            panic!("expected permission grant");
        };
        let grant = args.grant();
        assert_eq!(grant.resource, Resource::Audit);
        assert_eq!(grant.action, Action::Read);
        assert_eq!(grant.role, Role::Tester);
    }

    #[test]
    fn serve_accepts_port_override() {
        let cli = Cli::try_parse_from(["synapse", "serve", "--port", "9090"])
            .expect("cli should parse");
        assert!(matches!(cli.command, Commands::Serve(args) if args.port == Some(9090)));
    }
}
