use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use synapse_config::SynapseConfig;
use synapse_core::identity::Actor;
use synapse_db::service::SynapseService;

/// Shared application resources initialized once at startup.
pub struct AppContext {
    pub service: Arc<SynapseService>,
    pub config: SynapseConfig,
}

impl AppContext {
    /// Open (and migrate) the configured database.
    pub async fn init(config: SynapseConfig) -> anyhow::Result<Self> {
        let parent = Path::new(&config.database.path)
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty());
        if let Some(parent) = parent.filter(|_| !config.database.is_memory()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let service = SynapseService::new_local(&config.database.path)
            .await
            .with_context(|| format!("failed to open database at {}", config.database.path))?;

        Ok(Self {
            service: Arc::new(service),
            config,
        })
    }

    /// Identity for commands run from the shell. Local database access
    /// already implies operator rights, so the CLI acts as the system.
    #[must_use]
    pub fn actor(&self) -> Actor {
        Actor::system()
    }

    /// `--limit` when given, otherwise `general.default_limit`.
    #[must_use]
    pub fn limit(&self, requested: Option<u32>) -> u32 {
        crate::commands::shared::limit::effective_limit(
            requested,
            None,
            self.config.general.default_limit,
        )
    }

    #[cfg(test)]
    pub async fn in_memory() -> Self {
        let mut config = SynapseConfig::default();
        config.database.path = ":memory:".to_string();
        Self::init(config).await.expect("in-memory context")
    }
}
