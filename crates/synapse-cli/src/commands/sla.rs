use chrono::Utc;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::SlaCommands;
use crate::context::AppContext;
use crate::output::output;

pub async fn handle(action: &SlaCommands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match action {
        SlaCommands::Check => {
            let report = ctx
                .service
                .check_sla(&ctx.actor(), &ctx.config.sla.policy(), Utc::now())
                .await?;
            output(&report, flags.format)
        }
        SlaCommands::Violations { open } => {
            let violations = ctx
                .service
                .list_violations(*open, ctx.limit(flags.limit))
                .await?;
            output(&violations, flags.format)
        }
    }
}
