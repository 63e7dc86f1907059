//! Observation update builder.

use serde::{Deserialize, Serialize};
use synapse_core::enums::Severity;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl ObservationUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.severity.is_none()
    }
}

pub struct ObservationUpdateBuilder(ObservationUpdate);

impl ObservationUpdateBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self(ObservationUpdate::default())
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.0.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: Option<String>) -> Self {
        self.0.description = Some(description);
        self
    }

    #[must_use]
    pub const fn severity(mut self, severity: Severity) -> Self {
        self.0.severity = Some(severity);
        self
    }

    #[must_use]
    pub fn build(self) -> ObservationUpdate {
        self.0
    }
}

impl Default for ObservationUpdateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
