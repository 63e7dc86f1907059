use serde::Serialize;
use synapse_core::entities::User;
use synapse_core::enums::Role;
use synapse_core::rbac::PermissionMatrix;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::SeedArgs;
use crate::context::AppContext;
use crate::output::output;

#[derive(Debug, Serialize)]
pub struct SeedReport {
    pub permissions_inserted: u32,
    pub admin: User,
    /// Present only when the admin was created by this run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

pub async fn handle(args: &SeedArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let report = seed(args, ctx).await?;
    if report.api_token.is_some() && !flags.quiet {
        eprintln!("Store the admin API token now; it cannot be shown again.");
    }
    output(&report, flags.format)
}

/// Insert the default permission matrix and ensure an admin exists. Safe to rerun.
pub async fn seed(args: &SeedArgs, ctx: &AppContext) -> anyhow::Result<SeedReport> {
    let actor = ctx.actor();
    let permissions_inserted = ctx
        .service
        .seed_permissions(&actor, &PermissionMatrix::default())
        .await?;

    if let Some(admin) = ctx.service.find_user_by_email(&args.admin_email).await? {
        tracing::info!(user_id = %admin.id, "admin user already present");
        return Ok(SeedReport {
            permissions_inserted,
            admin,
            api_token: None,
        });
    }

    let created = ctx
        .service
        .create_user(&actor, &args.admin_email, &args.admin_name, Role::Admin)
        .await?;
    Ok(SeedReport {
        permissions_inserted,
        admin: created.user,
        api_token: Some(created.api_token),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use synapse_core::enums::Role;

    use super::seed;
    use crate::cli::root_commands::SeedArgs;
    use crate::context::AppContext;

    fn args() -> SeedArgs {
        SeedArgs {
            admin_email: "root@bank.example".to_string(),
            admin_name: "Root".to_string(),
        }
    }

    #[tokio::test]
    async fn first_run_creates_admin_and_grants() {
        let ctx = AppContext::in_memory().await;
        let report = seed(&args(), &ctx).await.expect("seed");

        assert!(report.permissions_inserted > 0);
        assert_eq!(report.admin.role, Role::Admin);
        let token = report.api_token.expect("token on first run");
        assert!(token.starts_with("syn_"));

        let authed = ctx.service.authenticate(&token).await.expect("token works");
        assert_eq!(authed.id, report.admin.id);
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let ctx = AppContext::in_memory().await;
        let first = seed(&args(), &ctx).await.expect("first seed");
        let second = seed(&args(), &ctx).await.expect("second seed");

        assert_eq!(second.permissions_inserted, 0);
        assert_eq!(second.admin.id, first.admin.id);
        assert!(second.api_token.is_none());
    }
}
