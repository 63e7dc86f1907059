//! SLA monitor configuration.
//!
//! Thresholds are in hours. Per-phase keys use the phase's snake_case name
//! (`SYNAPSE_SLA__PHASE_HOURS__REQUEST_INFO=96`), per-priority keys the
//! priority name (`SYNAPSE_SLA__PRIORITY_HOURS__HIGH=12`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use synapse_core::enums::{PhaseName, Priority};
use synapse_core::sla::{SlaPolicy, default_phase_hours, default_priority_hours};

use crate::ConfigError;

const fn default_enabled() -> bool {
    true
}

const fn default_check_interval_secs() -> u64 {
    300
}

const fn default_warning_ratio() -> f64 {
    0.8
}

const fn default_max_escalation_level() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlaConfig {
    /// Run the periodic SLA monitor inside `synapse serve`.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    #[serde(default = "default_warning_ratio")]
    pub warning_ratio: f64,

    #[serde(default = "default_max_escalation_level")]
    pub max_escalation_level: u32,

    #[serde(default = "default_phase_hours")]
    pub phase_hours: BTreeMap<PhaseName, u32>,

    #[serde(default = "default_priority_hours")]
    pub priority_hours: BTreeMap<Priority, u32>,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            check_interval_secs: default_check_interval_secs(),
            warning_ratio: default_warning_ratio(),
            max_escalation_level: default_max_escalation_level(),
            phase_hours: default_phase_hours(),
            priority_hours: default_priority_hours(),
        }
    }
}

impl SlaConfig {
    /// Thresholds handed to `SynapseService::check_sla`.
    #[must_use]
    pub fn policy(&self) -> SlaPolicy {
        SlaPolicy {
            phase_hours: self.phase_hours.clone(),
            priority_hours: self.priority_hours.clone(),
            warning_ratio: self.warning_ratio,
            max_escalation_level: self.max_escalation_level,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !(self.warning_ratio > 0.0 && self.warning_ratio <= 1.0) {
            return Err(ConfigError::invalid(
                "sla.warning_ratio",
                format!("must be in (0, 1], got {}", self.warning_ratio),
            ));
        }
        if self.check_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "sla.check_interval_secs",
                "must be greater than zero",
            ));
        }
        if let Some((phase, _)) = self.phase_hours.iter().find(|(_, h)| **h == 0) {
            return Err(ConfigError::invalid(
                "sla.phase_hours",
                format!("threshold for {phase} must be greater than zero"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy_defaults() {
        let config = SlaConfig::default();
        assert!(config.enabled);
        assert_eq!(config.policy(), SlaPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_ratio() {
        let config = SlaConfig {
            warning_ratio: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "sla.warning_ratio"
        ));
    }
}
