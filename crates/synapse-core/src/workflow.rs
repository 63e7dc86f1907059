//! The eight-phase workflow graph.
//!
//! Each phase has a fixed list of prerequisite phases and an ordered list of
//! required steps. These functions are pure checks over phase and step
//! statuses; persistence lives in `synapse-db`.

use std::collections::BTreeMap;

use crate::entities::PhaseStep;
use crate::enums::{AssignmentKind, EntityType, PhaseName, PhaseStatus, Role, StepStatus};
use crate::errors::CoreError;

/// Current status of every phase of one cycle report. Missing phases count as
/// `not_started`.
pub type PhaseStatuses = BTreeMap<PhaseName, PhaseStatus>;

/// A required step inside a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDef {
    pub key: &'static str,
    pub name: &'static str,
    /// Roles that may complete the step. Admin always may. The first role
    /// receives the step's assignment.
    pub roles: &'static [Role],
    /// Universal assignment raised when this step becomes the next one due.
    pub assignment: Option<AssignmentKind>,
}

const OWNER_ROLES: &[Role] = &[Role::ReportOwner, Role::ReportOwnerExecutive];
const TESTER_ROLES: &[Role] = &[Role::Tester, Role::TestExecutive];

const PLANNING_STEPS: &[StepDef] = &[
    StepDef {
        key: "define_attributes",
        name: "Define report attributes",
        roles: TESTER_ROLES,
        assignment: None,
    },
    StepDef {
        key: "approve_planning",
        name: "Approve planning",
        roles: OWNER_ROLES,
        assignment: Some(AssignmentKind::General),
    },
];

const SCOPING_STEPS: &[StepDef] = &[
    StepDef {
        key: "select_attributes",
        name: "Select attributes in scope",
        roles: TESTER_ROLES,
        assignment: None,
    },
    StepDef {
        key: "approve_scoping",
        name: "Approve scoping",
        roles: OWNER_ROLES,
        assignment: Some(AssignmentKind::ScopingApproval),
    },
];

const SAMPLE_SELECTION_STEPS: &[StepDef] = &[
    StepDef {
        key: "generate_samples",
        name: "Generate samples",
        roles: TESTER_ROLES,
        assignment: None,
    },
    StepDef {
        key: "approve_samples",
        name: "Approve samples",
        roles: OWNER_ROLES,
        assignment: Some(AssignmentKind::SampleApproval),
    },
];

const DATA_OWNER_ID_STEPS: &[StepDef] = &[
    StepDef {
        key: "identify_lobs",
        name: "Identify lines of business",
        roles: TESTER_ROLES,
        assignment: None,
    },
    StepDef {
        key: "assign_data_owners",
        name: "Assign data owners",
        roles: &[Role::DataExecutive],
        assignment: Some(AssignmentKind::DataOwnerAssignment),
    },
];

const REQUEST_INFO_STEPS: &[StepDef] = &[
    StepDef {
        key: "send_requests",
        name: "Send information requests",
        roles: TESTER_ROLES,
        assignment: None,
    },
    StepDef {
        key: "provide_evidence",
        name: "Provide evidence",
        roles: &[Role::DataOwner],
        assignment: Some(AssignmentKind::InformationRequest),
    },
];

const TEST_EXECUTION_STEPS: &[StepDef] = &[
    StepDef {
        key: "execute_tests",
        name: "Execute tests",
        roles: TESTER_ROLES,
        assignment: None,
    },
    StepDef {
        key: "review_results",
        name: "Review test results",
        roles: OWNER_ROLES,
        assignment: Some(AssignmentKind::EvidenceReview),
    },
];

const OBSERVATIONS_STEPS: &[StepDef] = &[
    StepDef {
        key: "record_observations",
        name: "Record observations",
        roles: TESTER_ROLES,
        assignment: None,
    },
    StepDef {
        key: "rate_observations",
        name: "Rate observations",
        roles: OWNER_ROLES,
        assignment: Some(AssignmentKind::ObservationApproval),
    },
];

const TEST_REPORT_STEPS: &[StepDef] = &[
    StepDef {
        key: "draft_report",
        name: "Draft test report",
        roles: TESTER_ROLES,
        assignment: None,
    },
    StepDef {
        key: "sign_off_report",
        name: "Sign off test report",
        roles: &[Role::ReportOwnerExecutive, Role::TestExecutive],
        assignment: Some(AssignmentKind::ReportSignOff),
    },
];

/// Phases that must be `complete` before `phase` can start.
#[must_use]
pub const fn prerequisites(phase: PhaseName) -> &'static [PhaseName] {
    match phase {
        PhaseName::Planning => &[],
        PhaseName::Scoping => &[PhaseName::Planning],
        PhaseName::SampleSelection | PhaseName::DataOwnerId => &[PhaseName::Scoping],
        PhaseName::RequestInfo => &[PhaseName::SampleSelection, PhaseName::DataOwnerId],
        PhaseName::TestExecution => &[PhaseName::RequestInfo],
        PhaseName::Observations => &[PhaseName::TestExecution],
        PhaseName::TestReport => &[PhaseName::Observations],
    }
}

/// Phases that list `phase` as a prerequisite.
#[must_use]
pub fn dependents(phase: PhaseName) -> Vec<PhaseName> {
    PhaseName::ALL
        .into_iter()
        .filter(|p| prerequisites(*p).contains(&phase))
        .collect()
}

/// Ordered required steps of `phase`.
#[must_use]
pub const fn steps(phase: PhaseName) -> &'static [StepDef] {
    match phase {
        PhaseName::Planning => PLANNING_STEPS,
        PhaseName::Scoping => SCOPING_STEPS,
        PhaseName::SampleSelection => SAMPLE_SELECTION_STEPS,
        PhaseName::DataOwnerId => DATA_OWNER_ID_STEPS,
        PhaseName::RequestInfo => REQUEST_INFO_STEPS,
        PhaseName::TestExecution => TEST_EXECUTION_STEPS,
        PhaseName::Observations => OBSERVATIONS_STEPS,
        PhaseName::TestReport => TEST_REPORT_STEPS,
    }
}

/// Looks up a step definition by key.
#[must_use]
pub fn step(phase: PhaseName, key: &str) -> Option<&'static StepDef> {
    steps(phase).iter().find(|s| s.key == key)
}

fn status_of(statuses: &PhaseStatuses, phase: PhaseName) -> PhaseStatus {
    statuses
        .get(&phase)
        .copied()
        .unwrap_or(PhaseStatus::NotStarted)
}

/// Checks that `phase` can move to `in_progress`.
///
/// The phase itself must be `not_started` or `on_hold`, and every
/// prerequisite must be `complete`.
///
/// # Errors
///
/// `InvalidTransition` when the phase is in the wrong state,
/// `PrerequisitesIncomplete` listing every unmet prerequisite otherwise.
pub fn check_can_start(
    phase_id: &str,
    phase: PhaseName,
    statuses: &PhaseStatuses,
) -> Result<(), CoreError> {
    let current = status_of(statuses, phase);
    if !matches!(current, PhaseStatus::NotStarted | PhaseStatus::OnHold) {
        return Err(CoreError::transition(
            EntityType::WorkflowPhase,
            phase_id,
            current,
            PhaseStatus::InProgress,
        ));
    }

    let missing: Vec<PhaseName> = prerequisites(phase)
        .iter()
        .copied()
        .filter(|p| status_of(statuses, *p) != PhaseStatus::Complete)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CoreError::PrerequisitesIncomplete { phase, missing })
    }
}

/// Checks that `phase` can move to `complete`: it must be `in_progress` and
/// every required step must be done.
///
/// # Errors
///
/// `InvalidTransition` or `StepsIncomplete` listing the pending step keys.
pub fn check_can_complete(
    phase_id: &str,
    phase: PhaseName,
    status: PhaseStatus,
    phase_steps: &[PhaseStep],
) -> Result<(), CoreError> {
    if status != PhaseStatus::InProgress {
        return Err(CoreError::transition(
            EntityType::WorkflowPhase,
            phase_id,
            status,
            PhaseStatus::Complete,
        ));
    }

    let pending: Vec<String> = steps(phase)
        .iter()
        .filter(|def| !is_done(phase_steps, def.key))
        .map(|def| def.key.to_string())
        .collect();
    if pending.is_empty() {
        Ok(())
    } else {
        Err(CoreError::StepsIncomplete { phase, pending })
    }
}

/// Checks that a completed phase can be reopened: no dependent phase may have
/// left `not_started`.
///
/// # Errors
///
/// `InvalidTransition` when the phase is not `complete`, `DependentsStarted`
/// naming the dependent phases that have already started.
pub fn check_can_reopen(
    phase_id: &str,
    phase: PhaseName,
    statuses: &PhaseStatuses,
) -> Result<(), CoreError> {
    let current = status_of(statuses, phase);
    if current != PhaseStatus::Complete {
        return Err(CoreError::transition(
            EntityType::WorkflowPhase,
            phase_id,
            current,
            PhaseStatus::InProgress,
        ));
    }

    let started: Vec<PhaseName> = dependents(phase)
        .into_iter()
        .filter(|p| status_of(statuses, *p) != PhaseStatus::NotStarted)
        .collect();
    if started.is_empty() {
        Ok(())
    } else {
        Err(CoreError::DependentsStarted { phase, started })
    }
}

/// First step in declaration order that is not done.
#[must_use]
pub fn next_pending_step(phase: PhaseName, phase_steps: &[PhaseStep]) -> Option<&'static StepDef> {
    steps(phase).iter().find(|def| !is_done(phase_steps, def.key))
}

/// Checks that `key` is the next step due in a phase that is `in_progress`.
///
/// # Errors
///
/// `Validation` when the step is unknown, already done, or out of order;
/// `InvalidTransition` when the phase is not running.
pub fn check_step_due(
    phase_id: &str,
    phase: PhaseName,
    status: PhaseStatus,
    phase_steps: &[PhaseStep],
    key: &str,
) -> Result<&'static StepDef, CoreError> {
    let def = step(phase, key)
        .ok_or_else(|| CoreError::Validation(format!("unknown step '{key}' for phase {phase}")))?;
    if status != PhaseStatus::InProgress {
        return Err(CoreError::InvalidTransition {
            entity_type: EntityType::WorkflowPhase,
            id: phase_id.to_string(),
            from: status.to_string(),
            to: format!("step {key} done"),
        });
    }
    if is_done(phase_steps, key) {
        return Err(CoreError::Validation(format!("step '{key}' is already done")));
    }
    match next_pending_step(phase, phase_steps) {
        Some(next) if next.key == key => Ok(def),
        Some(next) => Err(CoreError::Validation(format!(
            "step '{key}' cannot be completed before '{}'",
            next.key
        ))),
        None => Err(CoreError::Validation(format!("step '{key}' is already done"))),
    }
}

/// Completion percentage over every step of every phase.
#[must_use]
pub fn progress_percent(done_steps: usize) -> u8 {
    let total: usize = PhaseName::ALL.iter().map(|p| steps(*p).len()).sum();
    if total == 0 {
        return 0;
    }
    let pct = (done_steps.min(total) * 100) / total;
    u8::try_from(pct).unwrap_or(100)
}

fn is_done(phase_steps: &[PhaseStep], key: &str) -> bool {
    phase_steps
        .iter()
        .any(|s| s.step_key == key && s.status == StepStatus::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn statuses(entries: &[(PhaseName, PhaseStatus)]) -> PhaseStatuses {
        entries.iter().copied().collect()
    }

    fn step_row(key: &str, status: StepStatus) -> PhaseStep {
        PhaseStep {
            phase_id: "phs-00000001".to_string(),
            step_key: key.to_string(),
            status,
            completed_by: None,
            completed_at: None,
        }
    }

    #[rstest]
    #[case(PhaseName::Planning, &[])]
    #[case(PhaseName::SampleSelection, &[PhaseName::Scoping])]
    #[case(PhaseName::DataOwnerId, &[PhaseName::Scoping])]
    #[case(PhaseName::RequestInfo, &[PhaseName::SampleSelection, PhaseName::DataOwnerId])]
    #[case(PhaseName::TestReport, &[PhaseName::Observations])]
    fn prerequisite_graph(#[case] phase: PhaseName, #[case] expected: &[PhaseName]) {
        assert_eq!(prerequisites(phase), expected);
    }

    #[test]
    fn prerequisites_precede_their_phase() {
        for phase in PhaseName::ALL {
            for pre in prerequisites(phase) {
                assert!(*pre < phase, "{pre} must precede {phase}");
            }
        }
    }

    #[test]
    fn dependents_invert_prerequisites() {
        assert_eq!(
            dependents(PhaseName::Scoping),
            vec![PhaseName::SampleSelection, PhaseName::DataOwnerId]
        );
        assert!(dependents(PhaseName::TestReport).is_empty());
    }

    #[test]
    fn every_phase_has_steps_with_a_role() {
        for phase in PhaseName::ALL {
            assert!(!steps(phase).is_empty());
            for def in steps(phase) {
                assert!(!def.roles.is_empty(), "{phase}.{} has no role", def.key);
            }
        }
    }

    #[test]
    fn planning_starts_without_prerequisites() {
        assert!(check_can_start("phs-1", PhaseName::Planning, &PhaseStatuses::new()).is_ok());
    }

    #[test]
    fn start_lists_every_incomplete_prerequisite() {
        let s = statuses(&[
            (PhaseName::SampleSelection, PhaseStatus::Complete),
            (PhaseName::DataOwnerId, PhaseStatus::InProgress),
        ]);
        let err = check_can_start("phs-1", PhaseName::RequestInfo, &s).unwrap_err();
        match err {
            CoreError::PrerequisitesIncomplete { phase, missing } => {
                assert_eq!(phase, PhaseName::RequestInfo);
                assert_eq!(missing, vec![PhaseName::DataOwnerId]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn start_rejects_running_phase() {
        let s = statuses(&[(PhaseName::Planning, PhaseStatus::InProgress)]);
        assert!(matches!(
            check_can_start("phs-1", PhaseName::Planning, &s),
            Err(CoreError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn resume_from_hold_passes_start_check() {
        let s = statuses(&[
            (PhaseName::Planning, PhaseStatus::Complete),
            (PhaseName::Scoping, PhaseStatus::OnHold),
        ]);
        assert!(check_can_start("phs-1", PhaseName::Scoping, &s).is_ok());
    }

    #[test]
    fn complete_requires_all_steps() {
        let rows = vec![step_row("define_attributes", StepStatus::Done)];
        let err = check_can_complete("phs-1", PhaseName::Planning, PhaseStatus::InProgress, &rows)
            .unwrap_err();
        match err {
            CoreError::StepsIncomplete { pending, .. } => {
                assert_eq!(pending, vec!["approve_planning".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let rows = vec![
            step_row("define_attributes", StepStatus::Done),
            step_row("approve_planning", StepStatus::Done),
        ];
        assert!(
            check_can_complete("phs-1", PhaseName::Planning, PhaseStatus::InProgress, &rows)
                .is_ok()
        );
    }

    #[test]
    fn complete_requires_in_progress() {
        assert!(matches!(
            check_can_complete("phs-1", PhaseName::Planning, PhaseStatus::OnHold, &[]),
            Err(CoreError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn reopen_blocked_by_started_dependent() {
        let s = statuses(&[
            (PhaseName::Scoping, PhaseStatus::Complete),
            (PhaseName::DataOwnerId, PhaseStatus::InProgress),
        ]);
        assert!(matches!(
            check_can_reopen("phs-1", PhaseName::Scoping, &s),
            Err(CoreError::DependentsStarted { phase: PhaseName::Scoping, ref started })
                if started == &[PhaseName::DataOwnerId]
        ));

        let s = statuses(&[(PhaseName::Scoping, PhaseStatus::Complete)]);
        assert!(check_can_reopen("phs-1", PhaseName::Scoping, &s).is_ok());
    }

    #[test]
    fn steps_complete_in_order() {
        let rows = vec![
            step_row("select_attributes", StepStatus::Pending),
            step_row("approve_scoping", StepStatus::Pending),
        ];
        assert!(
            check_step_due(
                "phs-1",
                PhaseName::Scoping,
                PhaseStatus::InProgress,
                &rows,
                "approve_scoping"
            )
            .is_err()
        );
        let def = check_step_due(
            "phs-1",
            PhaseName::Scoping,
            PhaseStatus::InProgress,
            &rows,
            "select_attributes",
        )
        .unwrap();
        assert_eq!(def.key, "select_attributes");
    }

    #[test]
    fn step_due_rejects_unknown_key() {
        assert!(matches!(
            check_step_due("phs-1", PhaseName::Scoping, PhaseStatus::InProgress, &[], "bogus"),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn next_pending_step_skips_done() {
        let rows = vec![step_row("execute_tests", StepStatus::Done)];
        let next = next_pending_step(PhaseName::TestExecution, &rows).unwrap();
        assert_eq!(next.key, "review_results");
        assert_eq!(next.assignment, Some(AssignmentKind::EvidenceReview));
    }

    #[test]
    fn progress_bounds() {
        assert_eq!(progress_percent(0), 0);
        assert_eq!(progress_percent(16), 100);
        assert_eq!(progress_percent(8), 50);
        assert_eq!(progress_percent(100), 100);
    }
}
