use std::sync::Arc;

use synapse_config::SynapseConfig;
use synapse_core::rbac::PermissionMatrix;
use synapse_server::AppState;

use crate::cli::root_commands::ServeArgs;
use crate::context::AppContext;

pub async fn handle(args: &ServeArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let config = server_config(args, &ctx.config);

    if !ctx.service.permissions_seeded().await? {
        let inserted = ctx
            .service
            .seed_permissions(&ctx.actor(), &PermissionMatrix::default())
            .await?;
        tracing::info!(inserted, "empty permission table seeded with defaults");
    }

    let state = AppState {
        service: Arc::clone(&ctx.service),
        config: Arc::new(config),
    };
    synapse_server::serve(state).await?;
    Ok(())
}

fn server_config(args: &ServeArgs, base: &SynapseConfig) -> SynapseConfig {
    let mut config = base.clone();
    if let Some(bind) = &args.bind {
        config.server.bind_address.clone_from(bind);
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config
}

#[cfg(test)]
mod tests {
    use synapse_config::SynapseConfig;

    use super::server_config;
    use crate::cli::root_commands::ServeArgs;

    #[test]
    fn flags_override_bind_and_port() {
        let args = ServeArgs {
            bind: Some("0.0.0.0".to_string()),
            port: Some(9090),
        };
        let config = server_config(&args, &SynapseConfig::default());
        assert_eq!(config.server.socket_addr(), "0.0.0.0:9090");
    }

    #[test]
    fn absent_flags_keep_config() {
        let args = ServeArgs {
            bind: None,
            port: None,
        };
        let base = SynapseConfig::default();
        let config = server_config(&args, &base);
        assert_eq!(config.server.socket_addr(), base.server.socket_addr());
    }
}
