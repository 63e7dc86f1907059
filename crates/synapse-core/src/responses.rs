//! Response types returned as JSON by the HTTP API and the `synapse` CLI.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::entities::{Assignment, PhaseStep, TestCycle, User, WorkflowPhase};
use crate::enums::Role;

/// One phase of a workflow with its steps.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PhaseView {
    pub phase: WorkflowPhase,
    pub steps: Vec<PhaseStep>,
    pub next_step: Option<String>,
    /// Every prerequisite phase is complete.
    pub prerequisites_met: bool,
}

/// `GET /api/v1/cycles/{cid}/reports/{rid}/workflow`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct WorkflowStatus {
    pub cycle_id: String,
    pub report_id: String,
    pub phases: Vec<PhaseView>,
    pub progress_percent: u8,
}

/// `GET /api/v1/assignments`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct AssignmentInbox {
    pub user_id: String,
    pub role: Role,
    pub assignments: Vec<Assignment>,
    pub open_count: u32,
}

/// Result of one SLA monitor pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SlaCheckReport {
    /// Active phases and open assignments examined.
    pub checked: u32,
    pub new_violations: u32,
    pub escalated: u32,
    pub resolved: u32,
}

/// Phase status tally across every report of a cycle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PhaseCounts {
    pub not_started: u32,
    pub in_progress: u32,
    pub on_hold: u32,
    pub complete: u32,
}

/// `GET /api/v1/cycles/{id}/summary`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct CycleSummary {
    pub cycle: TestCycle,
    pub reports: u32,
    pub phases: PhaseCounts,
    pub open_assignments: u32,
    pub open_violations: u32,
    pub open_observations: u32,
}

/// Returned once when a user is created or a token rotated. The token is not
/// recoverable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct UserCreated {
    pub user: User,
    pub api_token: String,
}
