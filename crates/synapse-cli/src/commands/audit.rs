use synapse_core::entities::AuditEntry;
use synapse_core::enums::{AuditAction, EntityType};
use synapse_db::repos::audit::AuditFilter;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::AuditArgs;
use crate::commands::shared::parse::parse_enum;
use crate::context::AppContext;
use crate::output::output;

pub async fn handle(args: &AuditArgs, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let entries = fetch(args, ctx, flags).await?;
    output(&entries, flags.format)
}

pub async fn fetch(
    args: &AuditArgs,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<Vec<AuditEntry>> {
    let filter = AuditFilter {
        entity_type: args
            .entity_type
            .as_deref()
            .map(|value| parse_enum::<EntityType>(value, "entity-type"))
            .transpose()?,
        entity_id: args.entity_id.clone(),
        action: args
            .action
            .as_deref()
            .map(|value| parse_enum::<AuditAction>(value, "action"))
            .transpose()?,
        actor_id: args.actor.clone(),
        limit: Some(ctx.limit(flags.limit)),
    };

    ctx.service.query_audit(&filter).await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use synapse_core::enums::{AuditAction, EntityType};

    use super::fetch;
    use crate::cli::root_commands::{AuditArgs, SeedArgs};
    use crate::cli::{GlobalFlags, OutputFormat};
    use crate::commands::seed::seed;
    use crate::context::AppContext;

    fn flags() -> GlobalFlags {
        GlobalFlags {
            format: OutputFormat::Json,
            limit: Some(500),
            quiet: true,
            verbose: false,
            database: None,
        }
    }

    #[tokio::test]
    async fn filters_by_entity_type_and_action() {
        let ctx = AppContext::in_memory().await;
        let args = SeedArgs {
            admin_email: "root@bank.example".to_string(),
            admin_name: "Root".to_string(),
        };
        seed(&args, &ctx).await.expect("seed");

        let users = fetch(
            &AuditArgs {
                entity_type: Some("user".to_string()),
                entity_id: None,
                action: Some("created".to_string()),
                actor: None,
            },
            &ctx,
            &flags(),
        )
        .await
        .expect("audit query");
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].entity_type, EntityType::User);

        let grants = fetch(
            &AuditArgs {
                entity_type: Some("permission".to_string()),
                entity_id: None,
                action: Some("permission-granted".to_string()),
                actor: Some("system".to_string()),
            },
            &ctx,
            &flags(),
        )
        .await
        .expect("audit query");
        assert!(!grants.is_empty());
        assert!(grants.iter().all(|e| e.action == AuditAction::PermissionGranted));
    }

    #[tokio::test]
    async fn rejects_unknown_entity_type() {
        let ctx = AppContext::in_memory().await;
        let err = fetch(
            &AuditArgs {
                entity_type: Some("widget".to_string()),
                entity_id: None,
                action: None,
                actor: None,
            },
            &ctx,
            &flags(),
        )
        .await
        .expect_err("should fail");
        assert!(err.to_string().contains("entity-type"));
    }
}
