//! Typed audit detail payloads.
//!
//! Each audit action can carry a structured `detail` JSON blob. These types
//! give the common shapes a schema.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{Action, PhaseName, Resource, Role, SlaTarget};

/// Detail for `AuditAction::StatusChanged`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct StatusChangedDetail {
    pub from: String,
    pub to: String,
    pub reason: Option<String>,
}

/// Detail for `AuditAction::StepCompleted`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct StepCompletedDetail {
    pub phase: PhaseName,
    pub step_key: String,
    pub next_step: Option<String>,
}

/// Detail for `AuditAction::Assigned`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct AssignedDetail {
    pub to_role: Role,
    pub to_user_id: Option<String>,
    pub kind: String,
}

/// Detail for `AuditAction::Delegated`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct DelegatedDetail {
    pub from_user_id: Option<String>,
    pub to_user_id: String,
}

/// Detail for `AuditAction::PermissionGranted` and `AuditAction::PermissionRevoked`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PermissionDetail {
    pub resource: Resource,
    pub action: Action,
    pub role: Role,
}

/// Detail for `AuditAction::SlaViolated` and `AuditAction::SlaResolved`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SlaDetail {
    pub target: SlaTarget,
    pub target_id: String,
    pub elapsed_hours: f64,
    pub threshold_hours: f64,
    pub escalation_level: u32,
}
