use synapse_config::SynapseConfig;

use crate::cli::GlobalFlags;

/// Load layered config (`.env`, TOML files, `SYNAPSE_*` env) and apply
/// command-line overrides.
pub fn load_config(flags: &GlobalFlags) -> anyhow::Result<SynapseConfig> {
    let mut config = SynapseConfig::load_with_dotenv()?;
    apply_overrides(&mut config, flags);
    Ok(config)
}

fn apply_overrides(config: &mut SynapseConfig, flags: &GlobalFlags) {
    if let Some(path) = &flags.database {
        tracing::debug!(path, "database path overridden from command line");
        config.database.path.clone_from(path);
    }
}

#[cfg(test)]
mod tests {
    use synapse_config::SynapseConfig;

    use super::apply_overrides;
    use crate::cli::{GlobalFlags, OutputFormat};

    fn flags(database: Option<&str>) -> GlobalFlags {
        GlobalFlags {
            format: OutputFormat::Json,
            limit: None,
            quiet: false,
            verbose: false,
            database: database.map(str::to_string),
        }
    }

    #[test]
    fn database_flag_overrides_config() {
        let mut config = SynapseConfig::default();
        apply_overrides(&mut config, &flags(Some(":memory:")));
        assert!(config.database.is_memory());
    }

    #[test]
    fn no_flag_keeps_config_path() {
        let mut config = SynapseConfig::default();
        let before = config.database.path.clone();
        apply_overrides(&mut config, &flags(None));
        assert_eq!(config.database.path, before);
    }
}
