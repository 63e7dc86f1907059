use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A regulatory report under test (e.g. an FR Y-14M schedule).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Report {
    pub id: String,
    pub name: String,
    pub regulation: Option<String>,
    pub line_of_business: Option<String>,
    pub report_owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Membership of a report in a cycle. The workflow runs per cycle report.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle_id: String,
    pub report_id: String,
    pub tester_id: String,
    pub created_at: DateTime<Utc>,
}
