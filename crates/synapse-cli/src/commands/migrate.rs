use serde::Serialize;

use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
struct MigrateReport<'a> {
    database: &'a str,
    migrated: bool,
    permissions_seeded: bool,
}

/// Migrations run when the context opens the database; this reports the result.
pub async fn handle(ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let report = MigrateReport {
        database: &ctx.config.database.path,
        migrated: true,
        permissions_seeded: ctx.service.permissions_seeded().await?,
    };
    output(&report, flags.format)
}
