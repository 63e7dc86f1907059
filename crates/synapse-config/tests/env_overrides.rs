use figment::Jail;
use synapse_config::SynapseConfig;
use synapse_core::enums::PhaseName;

#[test]
fn env_overrides_nested_values() {
    Jail::expect_with(|jail| {
        jail.set_env("SYNAPSE_SERVER__PORT", "9191");
        jail.set_env("SYNAPSE_DATABASE__PATH", ":memory:");
        jail.set_env("SYNAPSE_SLA__PHASE_HOURS__SCOPING", "12");

        let config = SynapseConfig::load().expect("config loads");
        assert_eq!(config.server.port, 9191);
        assert!(config.database.is_memory());
        assert_eq!(config.sla.phase_hours.get(&PhaseName::Scoping), Some(&12));
        assert_eq!(config.sla.phase_hours.get(&PhaseName::Planning), Some(&72));
        Ok(())
    });
}

#[test]
fn env_beats_project_toml() {
    Jail::expect_with(|jail| {
        std::fs::create_dir_all(jail.directory().join(".synapse"))
            .map_err(|e| e.to_string())?;
        jail.create_file(".synapse/config.toml", "[server]\nport = 7000\n")?;
        jail.set_env("SYNAPSE_SERVER__PORT", "7001");

        let config = SynapseConfig::load().expect("config loads");
        assert_eq!(config.server.port, 7001);
        Ok(())
    });
}
