use clap::Subcommand;

/// SLA commands.
#[derive(Clone, Debug, Subcommand)]
pub enum SlaCommands {
    /// Run one SLA evaluation pass now.
    Check,
    /// List recorded violations, newest first.
    Violations {
        /// Only violations that are not yet resolved.
        #[arg(long)]
        open: bool,
    },
}
