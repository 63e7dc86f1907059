//! # synapse-config
//!
//! Layered configuration loading for SynapseDTE using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`SYNAPSE_*` prefix, `__` as separator)
//! 2. Project-level `.synapse/config.toml`
//! 3. User-level `~/.config/synapse/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `SYNAPSE_SERVER__PORT` -> `server.port`,
//! `SYNAPSE_SLA__PHASE_HOURS__SCOPING` -> `sla.phase_hours.scoping`, etc.
//!
//! # Usage
//!
//! ```no_run
//! use synapse_config::SynapseConfig;
//!
//! let config = SynapseConfig::load_with_dotenv().expect("config");
//! println!("listening on {}", config.server.socket_addr());
//! ```

mod database;
mod error;
mod general;
mod server;
mod sla;

pub use database::DatabaseConfig;
pub use error::ConfigError;
pub use general::GeneralConfig;
pub use server::ServerConfig;
pub use sla::SlaConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SynapseConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sla: SlaConfig,
    #[serde(default)]
    pub general: GeneralConfig,
}

impl SynapseConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy`; use [`Self::load_with_dotenv`] for `.env` support.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when extraction fails or a value is out of range.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment())
    }

    /// Load configuration after reading `.env` from the working directory or
    /// the workspace root.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Extract and validate from an arbitrary figment.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.sla.validate()?;
        Ok(config)
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can add providers on top.
    #[must_use]
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(".synapse/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed("SYNAPSE_").split("__"))
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("synapse").join("config.toml"))
    }

    /// Walks up from `CARGO_MANIFEST_DIR` (when set) looking for `.env`,
    /// then falls back to the current directory. Missing files are ignored.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }
        let _ = dotenvy::dotenv();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = SynapseConfig::default();
        assert_eq!(config.database.path, ".synapse/synapse.db");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.sla.check_interval_secs, 300);
        assert_eq!(config.general.default_limit, 50);
    }

    #[test]
    fn figment_builds_without_files() {
        figment::Jail::expect_with(|_jail| {
            let config = SynapseConfig::load().expect("should extract defaults");
            assert!(config.sla.enabled);
            assert!(!config.database.is_memory());
            Ok(())
        });
    }
}
