//! Domain error type shared by every SynapseDTE crate.
//!
//! Persistence errors (`DatabaseError`) and HTTP errors (`ApiError`) live in
//! their own crates and wrap this type when a domain rule is violated.

use thiserror::Error;

use crate::enums::{Action, EntityType, PhaseName, Resource, Role};

/// Errors raised while enforcing workflow, RBAC, and validation rules.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity lookup returned no result.
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: EntityType, id: String },

    /// A state machine transition was attempted that is not allowed.
    #[error("Invalid state transition: {entity_type} {id} from {from} to {to}")]
    InvalidTransition {
        entity_type: EntityType,
        id: String,
        from: String,
        to: String,
    },

    /// A phase was started before every prerequisite phase was complete.
    #[error("Cannot start {phase}: prerequisite phases not complete: {}", join(missing))]
    PrerequisitesIncomplete {
        phase: PhaseName,
        missing: Vec<PhaseName>,
    },

    /// A phase was completed while required steps were still pending.
    #[error("Cannot complete {phase}: steps not done: {}", pending.join(", "))]
    StepsIncomplete {
        phase: PhaseName,
        pending: Vec<String>,
    },

    /// A completed phase was reopened after phases depending on it started.
    #[error("Cannot reopen {phase}: dependent phases already started: {}", join(started))]
    DependentsStarted {
        phase: PhaseName,
        started: Vec<PhaseName>,
    },

    /// The acting role may not perform the action on the resource.
    #[error("Permission denied: {role} may not {action} {resource}")]
    PermissionDenied {
        role: Role,
        resource: Resource,
        action: Action,
    },

    /// Input failed validation (format, missing reference, business rule).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    #[must_use]
    pub fn not_found(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    #[must_use]
    pub fn transition(
        entity_type: EntityType,
        id: impl Into<String>,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidTransition {
            entity_type,
            id: id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

fn join(phases: &[PhaseName]) -> String {
    phases
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prerequisites_message_lists_every_phase() {
        let err = CoreError::PrerequisitesIncomplete {
            phase: PhaseName::RequestInfo,
            missing: vec![PhaseName::SampleSelection, PhaseName::DataOwnerId],
        };
        assert_eq!(
            err.to_string(),
            "Cannot start request_info: prerequisite phases not complete: sample_selection, data_owner_id"
        );
    }

    #[test]
    fn dependents_message_lists_started_phases() {
        let err = CoreError::DependentsStarted {
            phase: PhaseName::Scoping,
            started: vec![PhaseName::DataOwnerId],
        };
        assert_eq!(
            err.to_string(),
            "Cannot reopen scoping: dependent phases already started: data_owner_id"
        );
    }

    #[test]
    fn not_found_message() {
        let err = CoreError::not_found(EntityType::TestCycle, "cyc-00000000");
        assert_eq!(err.to_string(), "test_cycle not found: cyc-00000000");
    }
}
