use serde::Serialize;
use synapse_core::entities::PermissionGrant;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::PermissionCommands;
use crate::context::AppContext;
use crate::output::output;

/// A grant plus whether the command actually changed the matrix.
#[derive(Debug, Serialize)]
pub struct GrantChange {
    #[serde(flatten)]
    pub grant: PermissionGrant,
    pub changed: bool,
}

pub async fn handle(
    action: &PermissionCommands,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match action {
        PermissionCommands::List => output(&ctx.service.list_permissions().await?, flags.format),
        PermissionCommands::Grant(_) | PermissionCommands::Revoke(_) => {
            output(&apply(action, ctx).await?, flags.format)
        }
    }
}

async fn apply(action: &PermissionCommands, ctx: &AppContext) -> anyhow::Result<GrantChange> {
    let actor = ctx.actor();
    let (grant, changed) = match action {
        PermissionCommands::Grant(args) => {
            let grant = args.grant();
            (grant, ctx.service.grant_permission(&actor, grant).await?)
        }
        PermissionCommands::Revoke(args) => {
            let grant = args.grant();
            (grant, ctx.service.revoke_permission(&actor, grant).await?)
        }
        PermissionCommands::List => anyhow::bail!("list does not change permissions"),
    };
    Ok(GrantChange { grant, changed })
}

#[cfg(test)]
mod tests {
    use synapse_core::enums::{Action, Resource, Role};
    use synapse_core::identity::Actor;

    use super::apply;
    use crate::cli::subcommands::{ActionArg, GrantArgs, PermissionCommands, ResourceArg, RoleArg};
    use crate::context::AppContext;

    fn args(role: RoleArg) -> GrantArgs {
        GrantArgs {
            resource: ResourceArg::Audit,
            action: ActionArg::Read,
            role,
        }
    }

    #[tokio::test]
    async fn grant_and_revoke_report_changes() {
        let ctx = AppContext::in_memory().await;
        let tester = Actor::new("usr-tester", Role::Tester);

        let first = apply(&PermissionCommands::Grant(args(RoleArg::Tester)), &ctx)
            .await
            .expect("grant");
        assert!(first.changed);
        ctx.service
            .check_permission(&tester, Resource::Audit, Action::Read)
            .await
            .expect("tester may read audit");

        let again = apply(&PermissionCommands::Grant(args(RoleArg::Tester)), &ctx)
            .await
            .expect("grant again");
        assert!(!again.changed);

        let revoked = apply(&PermissionCommands::Revoke(args(RoleArg::Tester)), &ctx)
            .await
            .expect("revoke");
        assert!(revoked.changed);
        assert!(
            ctx.service
                .check_permission(&tester, Resource::Audit, Action::Read)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn admin_grants_are_rejected() {
        let ctx = AppContext::in_memory().await;
        let result = apply(&PermissionCommands::Grant(args(RoleArg::Admin)), &ctx).await;
        assert!(result.is_err());
    }
}
