use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{AssignmentKind, AssignmentStatus, PhaseName, Priority, Role};

/// Where in the workflow an assignment originated. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct AssignmentContext {
    pub cycle_id: Option<String>,
    pub report_id: Option<String>,
    pub phase: Option<PhaseName>,
    pub step_key: Option<String>,
}

/// A universal assignment: a task or notification from one role to another.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Assignment {
    pub id: String,
    pub kind: AssignmentKind,
    pub title: String,
    pub description: Option<String>,
    pub from_role: Role,
    pub to_role: Role,
    pub from_user_id: String,
    pub to_user_id: Option<String>,
    pub context: AssignmentContext,
    pub status: AssignmentStatus,
    pub priority: Priority,
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
    pub completion_notes: Option<String>,
    pub escalated: bool,
}
