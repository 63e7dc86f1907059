use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{ObservationStatus, Severity};

/// A finding raised during testing, rated and approved by the report owner.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Observation {
    pub id: String,
    pub cycle_id: String,
    pub report_id: String,
    pub attribute_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub status: ObservationStatus,
    pub created_by: String,
    pub approved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
