//! Test cycle update builder.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_executive_id: Option<Option<String>>,
}

impl CycleUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.test_executive_id.is_none()
    }
}

pub struct CycleUpdateBuilder(CycleUpdate);

impl CycleUpdateBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self(CycleUpdate::default())
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.0.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: Option<String>) -> Self {
        self.0.description = Some(description);
        self
    }

    #[must_use]
    pub const fn start_date(mut self, date: Option<NaiveDate>) -> Self {
        self.0.start_date = Some(date);
        self
    }

    #[must_use]
    pub const fn end_date(mut self, date: Option<NaiveDate>) -> Self {
        self.0.end_date = Some(date);
        self
    }

    #[must_use]
    pub fn test_executive_id(mut self, id: Option<String>) -> Self {
        self.0.test_executive_id = Some(id);
        self
    }

    #[must_use]
    pub fn build(self) -> CycleUpdate {
        self.0
    }
}

impl Default for CycleUpdateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
