//! Workflow phase repository.
//!
//! Every cycle report carries eight phase rows with their step rows. The
//! graph rules live in `synapse_core::workflow`; this module loads the
//! current state, applies those checks, and persists the result.

use synapse_core::audit_detail::{StatusChangedDetail, StepCompletedDetail};
use synapse_core::entities::{PhaseStep, WorkflowPhase};
use synapse_core::enums::{
    Action, AuditAction, CycleStatus, EntityType, ObservationStatus, PhaseName, PhaseStatus,
    Resource, Role, SlaTarget, StepStatus,
};
use synapse_core::errors::CoreError;
use synapse_core::identity::Actor;
use synapse_core::responses::{PhaseView, WorkflowStatus};
use synapse_core::workflow::{self, PhaseStatuses};

use crate::error::DatabaseError;
use crate::helpers::{get_datetime, get_enum, get_opt_datetime, get_opt_string, now, opt_text, ts};
use crate::service::SynapseService;

const SELECT_COLS: &str = "id, cycle_id, report_id, phase, status, started_at, completed_at, \
     started_by, completed_by, notes, updated_at";

const TESTER_ROLES: &[Role] = &[Role::Tester, Role::TestExecutive];

fn row_to_phase(row: &libsql::Row) -> Result<WorkflowPhase, DatabaseError> {
    Ok(WorkflowPhase {
        id: row.get(0)?,
        cycle_id: row.get(1)?,
        report_id: row.get(2)?,
        phase: get_enum(row, 3)?,
        status: get_enum(row, 4)?,
        started_at: get_opt_datetime(row, 5)?,
        completed_at: get_opt_datetime(row, 6)?,
        started_by: get_opt_string(row, 7)?,
        completed_by: get_opt_string(row, 8)?,
        notes: get_opt_string(row, 9)?,
        updated_at: get_datetime(row, 10)?,
    })
}

fn row_to_step(row: &libsql::Row) -> Result<PhaseStep, DatabaseError> {
    Ok(PhaseStep {
        phase_id: row.get(0)?,
        step_key: row.get(1)?,
        status: get_enum(row, 2)?,
        completed_by: get_opt_string(row, 3)?,
        completed_at: get_opt_datetime(row, 4)?,
    })
}

fn require_roles(actor: &Actor, roles: &[Role], action: Action) -> Result<(), DatabaseError> {
    if actor.has_any_role(roles) {
        Ok(())
    } else {
        Err(DatabaseError::denied(actor.role, Resource::Workflow, action))
    }
}

impl SynapseService {
    /// # Errors
    ///
    /// `NotFound` when the report is not part of the cycle.
    pub async fn get_phase(
        &self,
        cycle_id: &str,
        report_id: &str,
        phase: PhaseName,
    ) -> Result<WorkflowPhase, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM workflow_phases
                     WHERE cycle_id = ?1 AND report_id = ?2 AND phase = ?3"
                ),
                [cycle_id, report_id, phase.as_str()],
            )
            .await?;
        let row = rows.next().await?.ok_or_else(|| {
            DatabaseError::not_found(
                EntityType::WorkflowPhase,
                &format!("{cycle_id}/{report_id}/{phase}"),
            )
        })?;
        row_to_phase(&row)
    }

    /// Every phase row of a cycle report, in workflow order.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_phases(
        &self,
        cycle_id: &str,
        report_id: &str,
    ) -> Result<Vec<WorkflowPhase>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM workflow_phases WHERE cycle_id = ?1 AND report_id = ?2"
                ),
                [cycle_id, report_id],
            )
            .await?;
        let mut phases = Vec::new();
        while let Some(row) = rows.next().await? {
            phases.push(row_to_phase(&row)?);
        }
        phases.sort_by_key(|p| p.phase);
        Ok(phases)
    }

    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn phase_statuses(
        &self,
        cycle_id: &str,
        report_id: &str,
    ) -> Result<PhaseStatuses, DatabaseError> {
        Ok(self
            .list_phases(cycle_id, report_id)
            .await?
            .into_iter()
            .map(|p| (p.phase, p.status))
            .collect())
    }

    /// Step rows of a phase in declaration order.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_phase_steps(&self, phase_id: &str) -> Result<Vec<PhaseStep>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT phase_id, step_key, status, completed_by, completed_at
                 FROM phase_steps WHERE phase_id = ?1 ORDER BY position",
                [phase_id],
            )
            .await?;
        let mut steps = Vec::new();
        while let Some(row) = rows.next().await? {
            steps.push(row_to_step(&row)?);
        }
        Ok(steps)
    }

    async fn require_active_cycle(&self, cycle_id: &str) -> Result<(), DatabaseError> {
        let cycle = self.get_cycle(cycle_id).await?;
        if cycle.status == CycleStatus::Active {
            Ok(())
        } else {
            Err(DatabaseError::validation(format!(
                "cycle {cycle_id} is {}; workflow changes need an active cycle",
                cycle.status
            )))
        }
    }

    async fn set_phase_status(
        &self,
        actor: &Actor,
        phase: &WorkflowPhase,
        status: PhaseStatus,
        reason: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let now = now();
        let sql = match status {
            PhaseStatus::InProgress => {
                "UPDATE workflow_phases SET status = ?1, started_at = ?2, started_by = ?3,
                     completed_at = NULL, completed_by = NULL, notes = COALESCE(?4, notes),
                     updated_at = ?2
                 WHERE id = ?5"
            }
            PhaseStatus::Complete => {
                "UPDATE workflow_phases SET status = ?1, completed_at = ?2, completed_by = ?3,
                     notes = COALESCE(?4, notes), updated_at = ?2
                 WHERE id = ?5"
            }
            PhaseStatus::OnHold | PhaseStatus::NotStarted => {
                "UPDATE workflow_phases SET status = ?1, notes = COALESCE(?4, notes),
                     updated_at = ?2
                 WHERE id = ?5"
            }
        };
        self.db()
            .conn()
            .execute(
                sql,
                libsql::params![
                    status.as_str(),
                    ts(now),
                    actor.user_id.as_str(),
                    opt_text(reason),
                    phase.id.as_str()
                ],
            )
            .await?;

        let detail = StatusChangedDetail {
            from: phase.status.as_str().to_string(),
            to: status.as_str().to_string(),
            reason: reason.map(String::from),
        };
        self.record(
            actor,
            EntityType::WorkflowPhase,
            &phase.id,
            AuditAction::StatusChanged,
            Some(serde_json::to_value(&detail)?),
        )
        .await?;
        tracing::info!(
            phase_id = %phase.id,
            phase = %phase.phase,
            from = %phase.status,
            to = %status,
            "phase status changed"
        );
        Ok(())
    }

    /// Raise the assignment of the next pending step, if it declares one.
    async fn raise_next_step_tx(
        &self,
        actor: &Actor,
        phase: &WorkflowPhase,
    ) -> Result<Option<&'static str>, DatabaseError> {
        let steps = self.list_phase_steps(&phase.id).await?;
        let Some(next) = workflow::next_pending_step(phase.phase, &steps) else {
            return Ok(None);
        };
        self.raise_step_assignment_tx(actor, phase, next).await?;
        Ok(Some(next.key))
    }

    /// Move a phase to `in_progress` once every prerequisite is complete.
    ///
    /// # Errors
    ///
    /// `PrerequisitesIncomplete` listing the unmet phases,
    /// `InvalidTransition` when the phase is already running or complete.
    pub async fn start_phase(
        &self,
        actor: &Actor,
        cycle_id: &str,
        report_id: &str,
        phase: PhaseName,
    ) -> Result<WorkflowPhase, DatabaseError> {
        require_roles(actor, TESTER_ROLES, Action::Start)?;
        let tx = self.begin_write().await?;
        let result = tx.run(self.start_phase_tx(actor, cycle_id, report_id, phase, None)).await;
        tx.finish(result).await
    }

    async fn start_phase_tx(
        &self,
        actor: &Actor,
        cycle_id: &str,
        report_id: &str,
        phase: PhaseName,
        reason: Option<&str>,
    ) -> Result<WorkflowPhase, DatabaseError> {
        self.require_active_cycle(cycle_id).await?;
        let current = self.get_phase(cycle_id, report_id, phase).await?;
        let statuses = self.phase_statuses(cycle_id, report_id).await?;
        workflow::check_can_start(&current.id, phase, &statuses)?;

        self.set_phase_status(actor, &current, PhaseStatus::InProgress, reason)
            .await?;
        let updated = self.get_phase(cycle_id, report_id, phase).await?;
        self.raise_next_step_tx(actor, &updated).await?;
        Ok(updated)
    }

    /// Mark the next due step of a running phase as done.
    ///
    /// Closes the assignments raised for that step and raises the next
    /// step's assignment.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` when the actor's role may not perform the step,
    /// `Validation` for out-of-order steps or failed step guards.
    pub async fn complete_step(
        &self,
        actor: &Actor,
        cycle_id: &str,
        report_id: &str,
        phase: PhaseName,
        step_key: &str,
        notes: Option<&str>,
    ) -> Result<PhaseView, DatabaseError> {
        let tx = self.begin_write().await?;
        let result = tx
            .run(self.complete_step_tx(actor, cycle_id, report_id, phase, step_key, notes))
            .await;
        tx.finish(result).await
    }

    async fn complete_step_tx(
        &self,
        actor: &Actor,
        cycle_id: &str,
        report_id: &str,
        phase: PhaseName,
        step_key: &str,
        notes: Option<&str>,
    ) -> Result<PhaseView, DatabaseError> {
        self.require_active_cycle(cycle_id).await?;
        let current = self.get_phase(cycle_id, report_id, phase).await?;
        let steps = self.list_phase_steps(&current.id).await?;
        let def = workflow::check_step_due(&current.id, phase, current.status, &steps, step_key)?;
        require_roles(actor, def.roles, Action::Complete)?;
        self.check_step_guard(&current, step_key).await?;

        let now = now();
        self.db()
            .conn()
            .execute(
                "UPDATE phase_steps SET status = ?1, completed_by = ?2, completed_at = ?3
                 WHERE phase_id = ?4 AND step_key = ?5",
                libsql::params![
                    StepStatus::Done.as_str(),
                    actor.user_id.as_str(),
                    ts(now),
                    current.id.as_str(),
                    step_key
                ],
            )
            .await?;
        self.db()
            .conn()
            .execute(
                "UPDATE workflow_phases SET updated_at = ?1 WHERE id = ?2",
                libsql::params![ts(now), current.id.as_str()],
            )
            .await?;

        self.complete_step_assignments_tx(actor, &current, step_key, notes)
            .await?;
        let next_step = self.raise_next_step_tx(actor, &current).await?;

        let detail = StepCompletedDetail {
            phase,
            step_key: step_key.to_string(),
            next_step: next_step.map(String::from),
        };
        self.record(
            actor,
            EntityType::WorkflowPhase,
            &current.id,
            AuditAction::StepCompleted,
            Some(serde_json::to_value(&detail)?),
        )
        .await?;
        tracing::info!(phase_id = %current.id, %phase, step_key, "step completed");

        let statuses = self.phase_statuses(cycle_id, report_id).await?;
        self.phase_view(self.get_phase(cycle_id, report_id, phase).await?, &statuses)
            .await
    }

    /// Data-dependent guards on individual steps.
    async fn check_step_guard(
        &self,
        phase: &WorkflowPhase,
        step_key: &str,
    ) -> Result<(), DatabaseError> {
        match (phase.phase, step_key) {
            (PhaseName::Planning, "define_attributes") => {
                let (total, _) = self.attribute_counts(&phase.report_id).await?;
                if total == 0 {
                    return Err(DatabaseError::validation(
                        "define at least one attribute before completing planning",
                    ));
                }
            }
            (PhaseName::Scoping, "select_attributes") => {
                let (_, undecided) = self.attribute_counts(&phase.report_id).await?;
                if undecided > 0 {
                    return Err(DatabaseError::validation(format!(
                        "{undecided} attributes have no scoping decision"
                    )));
                }
            }
            (PhaseName::Observations, "rate_observations") => {
                let pending = self
                    .count_observations(
                        &phase.cycle_id,
                        &phase.report_id,
                        &[ObservationStatus::Draft, ObservationStatus::Submitted],
                    )
                    .await?;
                if pending > 0 {
                    return Err(DatabaseError::validation(format!(
                        "{pending} observations are still draft or submitted"
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Move a running phase to `complete` once every step is done. Resolves
    /// the phase's open SLA violation.
    ///
    /// # Errors
    ///
    /// `StepsIncomplete` listing the pending steps.
    pub async fn complete_phase(
        &self,
        actor: &Actor,
        cycle_id: &str,
        report_id: &str,
        phase: PhaseName,
    ) -> Result<WorkflowPhase, DatabaseError> {
        require_roles(actor, TESTER_ROLES, Action::Complete)?;
        let tx = self.begin_write().await?;
        let result: Result<WorkflowPhase, DatabaseError> = tx
            .run(async {
                self.require_active_cycle(cycle_id).await?;
                let current = self.get_phase(cycle_id, report_id, phase).await?;
                let steps = self.list_phase_steps(&current.id).await?;
                workflow::check_can_complete(&current.id, phase, current.status, &steps)?;

                self.set_phase_status(actor, &current, PhaseStatus::Complete, None)
                    .await?;
                self.resolve_target_violation_tx(actor, SlaTarget::Phase, &current.id, now())
                    .await?;
                self.get_phase(cycle_id, report_id, phase).await
            })
            .await;
        tx.finish(result).await
    }

    /// Pause a running phase. Its SLA clock stops and any open violation is
    /// resolved.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless the phase is `in_progress`.
    pub async fn hold_phase(
        &self,
        actor: &Actor,
        cycle_id: &str,
        report_id: &str,
        phase: PhaseName,
        reason: Option<&str>,
    ) -> Result<WorkflowPhase, DatabaseError> {
        require_roles(actor, TESTER_ROLES, Action::Update)?;
        let tx = self.begin_write().await?;
        let result: Result<WorkflowPhase, DatabaseError> = tx
            .run(async {
                self.require_active_cycle(cycle_id).await?;
                let current = self.get_phase(cycle_id, report_id, phase).await?;
                if !current.status.can_transition_to(PhaseStatus::OnHold) {
                    return Err(CoreError::transition(
                        EntityType::WorkflowPhase,
                        &current.id,
                        current.status,
                        PhaseStatus::OnHold,
                    )
                    .into());
                }
                self.set_phase_status(actor, &current, PhaseStatus::OnHold, reason)
                    .await?;
                self.resolve_target_violation_tx(actor, SlaTarget::Phase, &current.id, now())
                    .await?;
                self.get_phase(cycle_id, report_id, phase).await
            })
            .await;
        tx.finish(result).await
    }

    /// Resume a held phase. The SLA clock restarts from now.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless the phase is `on_hold`.
    pub async fn resume_phase(
        &self,
        actor: &Actor,
        cycle_id: &str,
        report_id: &str,
        phase: PhaseName,
    ) -> Result<WorkflowPhase, DatabaseError> {
        require_roles(actor, TESTER_ROLES, Action::Update)?;
        let tx = self.begin_write().await?;
        let result: Result<WorkflowPhase, DatabaseError> = tx
            .run(async {
                let current = self.get_phase(cycle_id, report_id, phase).await?;
                if current.status != PhaseStatus::OnHold {
                    return Err(CoreError::transition(
                        EntityType::WorkflowPhase,
                        &current.id,
                        current.status,
                        PhaseStatus::InProgress,
                    )
                    .into());
                }
                self.start_phase_tx(actor, cycle_id, report_id, phase, None)
                    .await
            })
            .await;
        tx.finish(result).await
    }

    /// Reopen a completed phase: its steps go back to pending and its open
    /// step assignments are cancelled. Refused once a dependent phase has
    /// started.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` unless the actor is a test executive or admin,
    /// `DependentsStarted` when a dependent phase has started.
    pub async fn reopen_phase(
        &self,
        actor: &Actor,
        cycle_id: &str,
        report_id: &str,
        phase: PhaseName,
        reason: Option<&str>,
    ) -> Result<WorkflowPhase, DatabaseError> {
        require_roles(actor, &[Role::TestExecutive], Action::Approve)?;
        let tx = self.begin_write().await?;
        let result: Result<WorkflowPhase, DatabaseError> = tx
            .run(async {
                self.require_active_cycle(cycle_id).await?;
                let current = self.get_phase(cycle_id, report_id, phase).await?;
                let statuses = self.phase_statuses(cycle_id, report_id).await?;
                workflow::check_can_reopen(&current.id, phase, &statuses)?;

                self.db()
                    .conn()
                    .execute(
                        "UPDATE phase_steps SET status = ?1, completed_by = NULL, completed_at = NULL
                         WHERE phase_id = ?2",
                        [StepStatus::Pending.as_str(), current.id.as_str()],
                    )
                    .await?;
                self.cancel_phase_assignments_tx(actor, &current, "phase reopened")
                    .await?;
                self.set_phase_status(actor, &current, PhaseStatus::InProgress, reason)
                    .await?;
                let updated = self.get_phase(cycle_id, report_id, phase).await?;
                self.raise_next_step_tx(actor, &updated).await?;
                Ok(updated)
            })
            .await;
        tx.finish(result).await
    }

    async fn phase_view(
        &self,
        phase: WorkflowPhase,
        statuses: &PhaseStatuses,
    ) -> Result<PhaseView, DatabaseError> {
        let steps = self.list_phase_steps(&phase.id).await?;
        let next_step = if phase.status == PhaseStatus::Complete {
            None
        } else {
            workflow::next_pending_step(phase.phase, &steps).map(|s| s.key.to_string())
        };
        let prerequisites_met = workflow::prerequisites(phase.phase)
            .iter()
            .all(|p| statuses.get(p) == Some(&PhaseStatus::Complete));
        Ok(PhaseView {
            phase,
            steps,
            next_step,
            prerequisites_met,
        })
    }

    /// Every phase of a cycle report with its steps and overall progress.
    ///
    /// # Errors
    ///
    /// `NotFound` when the report is not part of the cycle.
    pub async fn workflow_status(
        &self,
        cycle_id: &str,
        report_id: &str,
    ) -> Result<WorkflowStatus, DatabaseError> {
        self.get_cycle_report(cycle_id, report_id).await?;
        let phases = self.list_phases(cycle_id, report_id).await?;
        let statuses: PhaseStatuses = phases.iter().map(|p| (p.phase, p.status)).collect();

        let mut views = Vec::with_capacity(phases.len());
        for phase in phases {
            views.push(self.phase_view(phase, &statuses).await?);
        }
        let done = views
            .iter()
            .flat_map(|v| &v.steps)
            .filter(|s| s.status == StepStatus::Done)
            .count();
        Ok(WorkflowStatus {
            cycle_id: cycle_id.to_string(),
            report_id: report_id.to_string(),
            phases: views,
            progress_percent: workflow::progress_percent(done),
        })
    }
}
