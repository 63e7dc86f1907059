use synapse_core::enums::Role;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::UserCommands;
use crate::context::AppContext;
use crate::output::output;

pub async fn handle(action: &UserCommands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let actor = ctx.actor();
    match action {
        UserCommands::Create { email, name, role } => {
            let created = ctx
                .service
                .create_user(&actor, email, name, Role::from(*role))
                .await?;
            output(&created, flags.format)
        }
        UserCommands::List { role } => {
            let users = ctx
                .service
                .list_users(role.map(Role::from), ctx.limit(flags.limit))
                .await?;
            output(&users, flags.format)
        }
        UserCommands::Get { id } => output(&ctx.service.get_user(id).await?, flags.format),
        UserCommands::Activate { id } => {
            output(&ctx.service.set_user_active(&actor, id, true).await?, flags.format)
        }
        UserCommands::Deactivate { id } => {
            output(&ctx.service.set_user_active(&actor, id, false).await?, flags.format)
        }
        UserCommands::RotateToken { id } => {
            output(&ctx.service.rotate_token(&actor, id).await?, flags.format)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::cli::subcommands::{RoleArg, UserCommands};
    use crate::cli::{GlobalFlags, OutputFormat};
    use crate::context::AppContext;

    use super::handle;

    fn flags() -> GlobalFlags {
        GlobalFlags {
            format: OutputFormat::Raw,
            limit: None,
            quiet: true,
            verbose: false,
            database: None,
        }
    }

    #[tokio::test]
    async fn create_then_deactivate() {
        let ctx = AppContext::in_memory().await;
        let create = UserCommands::Create {
            email: "tess@bank.example".to_string(),
            name: "Tess".to_string(),
            role: RoleArg::Tester,
        };
        handle(&create, &ctx, &flags()).await.expect("create");

        let user = ctx
            .service
            .find_user_by_email("tess@bank.example")
            .await
            .expect("query")
            .expect("user exists");

        let deactivate = UserCommands::Deactivate { id: user.id.clone() };
        handle(&deactivate, &ctx, &flags()).await.expect("deactivate");
        assert!(!ctx.service.get_user(&user.id).await.expect("get").is_active);
    }

    #[tokio::test]
    async fn unknown_user_is_an_error() {
        let ctx = AppContext::in_memory().await;
        let err = handle(&UserCommands::Get { id: "usr-missing".to_string() }, &ctx, &flags())
            .await
            .expect_err("should fail");
        assert!(err.to_string().contains("usr-missing"));
    }
}
