use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{PhaseName, PhaseStatus, StepStatus};

/// One of the eight phases of a cycle report's workflow.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct WorkflowPhase {
    pub id: String,
    pub cycle_id: String,
    pub report_id: String,
    pub phase: PhaseName,
    pub status: PhaseStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub started_by: Option<String>,
    pub completed_by: Option<String>,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A required sub-task of a phase.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PhaseStep {
    pub phase_id: String,
    pub step_key: String,
    pub status: StepStatus,
    pub completed_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}
