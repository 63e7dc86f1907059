//! Universal assignment repository.
//!
//! An assignment is a task sent from one role to another, optionally to a
//! specific user. Unassigned ones sit in the inbox of every member of
//! `to_role` until one of them acknowledges it.
//!
//! Workflow steps raise and close assignments automatically; those
//! closures skip the manual `assigned → acknowledged → in_progress` path.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use synapse_core::audit_detail::{AssignedDetail, DelegatedDetail, StatusChangedDetail};
use synapse_core::entities::{Assignment, AssignmentContext, WorkflowPhase};
use synapse_core::enums::{
    Action, AssignmentKind, AssignmentStatus, AuditAction, EntityType, PhaseName, Priority,
    Resource, Role, SlaTarget,
};
use synapse_core::errors::CoreError;
use synapse_core::identity::Actor;
use synapse_core::ids::PREFIX_ASSIGNMENT;
use synapse_core::responses::AssignmentInbox;
use synapse_core::workflow::StepDef;

use crate::error::DatabaseError;
use crate::helpers::{
    get_bool, get_datetime, get_enum, get_opt_datetime, get_opt_enum, get_opt_string, get_u32,
    now, opt_text, opt_ts, ts,
};
use crate::service::SynapseService;

const SELECT_COLS: &str = "id, kind, title, description, from_role, to_role, from_user_id, \
     to_user_id, cycle_id, report_id, phase, step_key, status, priority, due_at, created_at, \
     acknowledged_at, started_at, completed_at, completed_by, completion_notes, escalated";

const OPEN_STATUSES: &str = "('assigned', 'acknowledged', 'in_progress')";

/// Input for [`SynapseService::create_assignment`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewAssignment {
    pub kind: AssignmentKind,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub to_role: Role,
    #[serde(default)]
    pub to_user_id: Option<String>,
    #[serde(default)]
    pub context: AssignmentContext,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
}

impl NewAssignment {
    #[must_use]
    pub fn new(kind: AssignmentKind, title: impl Into<String>, to_role: Role) -> Self {
        Self {
            kind,
            title: title.into(),
            description: None,
            to_role,
            to_user_id: None,
            context: AssignmentContext::default(),
            priority: None,
            due_at: None,
        }
    }
}

/// Filter criteria for [`SynapseService::list_assignments`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignmentFilter {
    pub status: Option<AssignmentStatus>,
    pub kind: Option<AssignmentKind>,
    pub to_role: Option<Role>,
    pub to_user_id: Option<String>,
    pub cycle_id: Option<String>,
    pub report_id: Option<String>,
    pub escalated: Option<bool>,
    pub open_only: Option<bool>,
    pub limit: Option<u32>,
}

fn row_to_assignment(row: &libsql::Row) -> Result<Assignment, DatabaseError> {
    Ok(Assignment {
        id: row.get(0)?,
        kind: get_enum(row, 1)?,
        title: row.get(2)?,
        description: get_opt_string(row, 3)?,
        from_role: get_enum(row, 4)?,
        to_role: get_enum(row, 5)?,
        from_user_id: row.get(6)?,
        to_user_id: get_opt_string(row, 7)?,
        context: AssignmentContext {
            cycle_id: get_opt_string(row, 8)?,
            report_id: get_opt_string(row, 9)?,
            phase: get_opt_enum(row, 10)?,
            step_key: get_opt_string(row, 11)?,
        },
        status: get_enum(row, 12)?,
        priority: get_enum(row, 13)?,
        due_at: get_opt_datetime(row, 14)?,
        created_at: get_datetime(row, 15)?,
        acknowledged_at: get_opt_datetime(row, 16)?,
        started_at: get_opt_datetime(row, 17)?,
        completed_at: get_opt_datetime(row, 18)?,
        completed_by: get_opt_string(row, 19)?,
        completion_notes: get_opt_string(row, 20)?,
        escalated: get_bool(row, 21)?,
    })
}

/// Whether `actor` is the assignee, or a member of `to_role` when nobody is.
fn is_participant(actor: &Actor, assignment: &Assignment) -> bool {
    if actor.is_admin() {
        return true;
    }
    match assignment.to_user_id {
        Some(ref user_id) => *user_id == actor.user_id,
        None => actor.role == assignment.to_role,
    }
}

impl SynapseService {
    /// # Errors
    ///
    /// `Validation` for an empty title or an assignee that does not hold
    /// `to_role`.
    pub async fn create_assignment(
        &self,
        actor: &Actor,
        new: &NewAssignment,
    ) -> Result<Assignment, DatabaseError> {
        if new.title.trim().is_empty() {
            return Err(DatabaseError::validation("assignment title must not be empty"));
        }
        let tx = self.begin_write().await?;
        let result = tx.run(self.insert_assignment_tx(actor, new)).await;
        tx.finish(result).await
    }

    pub(crate) async fn insert_assignment_tx(
        &self,
        actor: &Actor,
        new: &NewAssignment,
    ) -> Result<Assignment, DatabaseError> {
        if let Some(ref user_id) = new.to_user_id {
            self.require_user_with_role(user_id, &[new.to_role]).await?;
        }
        if let Some(ref cycle_id) = new.context.cycle_id {
            self.require_open_cycle(cycle_id).await?;
        }

        let now = now();
        let id = self.db().generate_id(PREFIX_ASSIGNMENT).await?;
        let priority = new.priority.unwrap_or(Priority::Medium);
        self.db()
            .conn()
            .execute(
                "INSERT INTO assignments (id, kind, title, description, from_role, to_role,
                     from_user_id, to_user_id, cycle_id, report_id, phase, step_key, status,
                     priority, due_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                libsql::params![
                    id.as_str(),
                    new.kind.as_str(),
                    new.title.trim(),
                    opt_text(new.description.as_deref()),
                    actor.role.as_str(),
                    new.to_role.as_str(),
                    actor.user_id.as_str(),
                    opt_text(new.to_user_id.as_deref()),
                    opt_text(new.context.cycle_id.as_deref()),
                    opt_text(new.context.report_id.as_deref()),
                    opt_text(new.context.phase.map(PhaseName::as_str)),
                    opt_text(new.context.step_key.as_deref()),
                    AssignmentStatus::Assigned.as_str(),
                    priority.as_str(),
                    opt_ts(new.due_at),
                    ts(now)
                ],
            )
            .await?;

        let detail = AssignedDetail {
            to_role: new.to_role,
            to_user_id: new.to_user_id.clone(),
            kind: new.kind.as_str().to_string(),
        };
        self.record(
            actor,
            EntityType::Assignment,
            &id,
            AuditAction::Assigned,
            Some(serde_json::to_value(&detail)?),
        )
        .await?;
        tracing::debug!(assignment_id = %id, kind = %new.kind, to_role = %new.to_role, "assignment raised");
        self.get_assignment(&id).await
    }

    /// # Errors
    ///
    /// `NotFound` if no assignment has this ID.
    pub async fn get_assignment(&self, id: &str) -> Result<Assignment, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(&format!("SELECT {SELECT_COLS} FROM assignments WHERE id = ?1"), [id])
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| DatabaseError::not_found(EntityType::Assignment, id))?;
        row_to_assignment(&row)
    }

    /// Assignments addressed to the actor, or to the actor's role while
    /// unassigned. Newest first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn inbox(
        &self,
        actor: &Actor,
        include_closed: bool,
        limit: u32,
    ) -> Result<AssignmentInbox, DatabaseError> {
        let status_clause = if include_closed {
            String::new()
        } else {
            format!("AND status IN {OPEN_STATUSES}")
        };
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM assignments
                     WHERE (to_user_id = ?1 OR (to_user_id IS NULL AND to_role = ?2)) {status_clause}
                     ORDER BY created_at DESC, rowid DESC LIMIT {limit}"
                ),
                [actor.user_id.as_str(), actor.role.as_str()],
            )
            .await?;
        let mut assignments = Vec::new();
        while let Some(row) = rows.next().await? {
            assignments.push(row_to_assignment(&row)?);
        }

        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT COUNT(*) FROM assignments
                     WHERE (to_user_id = ?1 OR (to_user_id IS NULL AND to_role = ?2))
                       AND status IN {OPEN_STATUSES}"
                ),
                [actor.user_id.as_str(), actor.role.as_str()],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;

        Ok(AssignmentInbox {
            user_id: actor.user_id.clone(),
            role: actor.role,
            assignments,
            open_count: get_u32(&row, 0)?,
        })
    }

    /// Query assignments with optional filters, newest first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_assignments(
        &self,
        filter: &AssignmentFilter,
    ) -> Result<Vec<Assignment>, DatabaseError> {
        let mut conditions = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(status) = filter.status {
            params.push(status.as_str().into());
            conditions.push(format!("status = ?{}", params.len()));
        }
        if let Some(kind) = filter.kind {
            params.push(kind.as_str().into());
            conditions.push(format!("kind = ?{}", params.len()));
        }
        if let Some(role) = filter.to_role {
            params.push(role.as_str().into());
            conditions.push(format!("to_role = ?{}", params.len()));
        }
        if let Some(ref user_id) = filter.to_user_id {
            params.push(user_id.as_str().into());
            conditions.push(format!("to_user_id = ?{}", params.len()));
        }
        if let Some(ref cycle_id) = filter.cycle_id {
            params.push(cycle_id.as_str().into());
            conditions.push(format!("cycle_id = ?{}", params.len()));
        }
        if let Some(ref report_id) = filter.report_id {
            params.push(report_id.as_str().into());
            conditions.push(format!("report_id = ?{}", params.len()));
        }
        if let Some(escalated) = filter.escalated {
            params.push(i64::from(escalated).into());
            conditions.push(format!("escalated = ?{}", params.len()));
        }
        if filter.open_only == Some(true) {
            conditions.push(format!("status IN {OPEN_STATUSES}"));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let limit = filter.limit.unwrap_or(100);
        let sql = format!(
            "SELECT {SELECT_COLS} FROM assignments {where_clause}
             ORDER BY created_at DESC, rowid DESC LIMIT {limit}"
        );
        let mut rows = self
            .db()
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_assignment(&row)?);
        }
        Ok(out)
    }

    /// Move an assignment along its lifecycle.
    ///
    /// Only the assignee (or, while unassigned, any member of `to_role`) may
    /// act on it; acknowledging an unassigned assignment claims it.
    /// Cancelling is reserved for its creator, test executives and admins.
    /// Closing it resolves its open SLA violation.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` for a non-participant, `InvalidTransition` for a
    /// disallowed move.
    pub async fn transition_assignment(
        &self,
        actor: &Actor,
        id: &str,
        status: AssignmentStatus,
        notes: Option<&str>,
    ) -> Result<Assignment, DatabaseError> {
        let tx = self.begin_write().await?;
        let result = tx.run(self.transition_assignment_tx(actor, id, status, notes)).await;
        tx.finish(result).await
    }

    async fn transition_assignment_tx(
        &self,
        actor: &Actor,
        id: &str,
        status: AssignmentStatus,
        notes: Option<&str>,
    ) -> Result<Assignment, DatabaseError> {
        let current = self.get_assignment(id).await?;
        let allowed = if status == AssignmentStatus::Cancelled {
            current.from_user_id == actor.user_id || actor.has_any_role(&[Role::TestExecutive])
        } else {
            is_participant(actor, &current)
        };
        if !allowed {
            return Err(DatabaseError::denied(
                actor.role,
                Resource::Assignment,
                Action::Update,
            ));
        }
        if !current.status.can_transition_to(status) {
            return Err(
                CoreError::transition(EntityType::Assignment, id, current.status, status).into(),
            );
        }

        let now = now();
        match status {
            AssignmentStatus::Acknowledged => {
                let claim = current.to_user_id.is_none() && actor.role == current.to_role;
                self.db()
                    .conn()
                    .execute(
                        "UPDATE assignments SET status = ?1, acknowledged_at = ?2,
                             to_user_id = CASE WHEN ?3 = 1 THEN ?4 ELSE to_user_id END
                         WHERE id = ?5",
                        libsql::params![
                            status.as_str(),
                            ts(now),
                            i64::from(claim),
                            actor.user_id.as_str(),
                            id
                        ],
                    )
                    .await?;
            }
            AssignmentStatus::InProgress => {
                self.db()
                    .conn()
                    .execute(
                        "UPDATE assignments SET status = ?1, started_at = ?2 WHERE id = ?3",
                        libsql::params![status.as_str(), ts(now), id],
                    )
                    .await?;
            }
            AssignmentStatus::Completed | AssignmentStatus::Rejected | AssignmentStatus::Cancelled => {
                self.close_assignment_row(actor, id, status, notes, now).await?;
            }
            AssignmentStatus::Assigned => {}
        }

        let detail = StatusChangedDetail {
            from: current.status.as_str().to_string(),
            to: status.as_str().to_string(),
            reason: notes.map(String::from),
        };
        self.record(
            actor,
            EntityType::Assignment,
            id,
            AuditAction::StatusChanged,
            Some(serde_json::to_value(&detail)?),
        )
        .await?;
        self.get_assignment(id).await
    }

    /// Hand an open assignment to another user holding `to_role`.
    ///
    /// # Errors
    ///
    /// `Validation` for a closed assignment or a target without the role;
    /// `PermissionDenied` unless the actor is a participant, the creator, or
    /// a test executive.
    pub async fn delegate_assignment(
        &self,
        actor: &Actor,
        id: &str,
        to_user_id: &str,
    ) -> Result<Assignment, DatabaseError> {
        let tx = self.begin_write().await?;
        let result = tx.run(self.delegate_assignment_tx(actor, id, to_user_id)).await;
        tx.finish(result).await
    }

    async fn delegate_assignment_tx(
        &self,
        actor: &Actor,
        id: &str,
        to_user_id: &str,
    ) -> Result<Assignment, DatabaseError> {
        let current = self.get_assignment(id).await?;
        let allowed = is_participant(actor, &current)
            || current.from_user_id == actor.user_id
            || actor.has_any_role(&[Role::TestExecutive]);
        if !allowed {
            return Err(DatabaseError::denied(
                actor.role,
                Resource::Assignment,
                Action::Assign,
            ));
        }
        if !current.status.is_open() {
            return Err(DatabaseError::validation(format!(
                "assignment {id} is {} and cannot be delegated",
                current.status
            )));
        }
        self.require_user_with_role(to_user_id, &[current.to_role])
            .await?;

        self.db()
            .conn()
            .execute(
                "UPDATE assignments SET to_user_id = ?1 WHERE id = ?2",
                [to_user_id, id],
            )
            .await?;
        let detail = DelegatedDetail {
            from_user_id: current.to_user_id,
            to_user_id: to_user_id.to_string(),
        };
        self.record(
            actor,
            EntityType::Assignment,
            id,
            AuditAction::Delegated,
            Some(serde_json::to_value(&detail)?),
        )
        .await?;
        self.get_assignment(id).await
    }

    async fn close_assignment_row(
        &self,
        actor: &Actor,
        id: &str,
        status: AssignmentStatus,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.db()
            .conn()
            .execute(
                "UPDATE assignments SET status = ?1, completed_at = ?2, completed_by = ?3,
                     completion_notes = COALESCE(?4, completion_notes)
                 WHERE id = ?5",
                libsql::params![
                    status.as_str(),
                    ts(now),
                    actor.user_id.as_str(),
                    opt_text(notes),
                    id
                ],
            )
            .await?;
        self.resolve_target_violation_tx(actor, SlaTarget::Assignment, id, now)
            .await?;
        Ok(())
    }

    /// Close every open assignment matching `where_sql`, auditing each.
    async fn close_open_assignments_tx(
        &self,
        actor: &Actor,
        where_sql: &str,
        params: Vec<libsql::Value>,
        status: AssignmentStatus,
        notes: Option<&str>,
    ) -> Result<u32, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT id, status FROM assignments
                     WHERE {where_sql} AND status IN {OPEN_STATUSES}"
                ),
                libsql::params_from_iter(params),
            )
            .await?;
        let mut open: Vec<(String, AssignmentStatus)> = Vec::new();
        while let Some(row) = rows.next().await? {
            open.push((row.get(0)?, get_enum(&row, 1)?));
        }

        let now = now();
        for (id, from) in &open {
            self.close_assignment_row(actor, id, status, notes, now).await?;
            let detail = StatusChangedDetail {
                from: from.as_str().to_string(),
                to: status.as_str().to_string(),
                reason: notes.map(String::from),
            };
            self.record(
                actor,
                EntityType::Assignment,
                id,
                AuditAction::StatusChanged,
                Some(serde_json::to_value(&detail)?),
            )
            .await?;
        }
        Ok(u32::try_from(open.len()).unwrap_or(u32::MAX))
    }

    /// Cancel every open assignment of a cycle.
    pub(crate) async fn cancel_cycle_assignments_tx(
        &self,
        actor: &Actor,
        cycle_id: &str,
    ) -> Result<u32, DatabaseError> {
        self.close_open_assignments_tx(
            actor,
            "cycle_id = ?1",
            vec![cycle_id.into()],
            AssignmentStatus::Cancelled,
            Some("cycle cancelled"),
        )
        .await
    }

    /// Cancel every open assignment tied to one phase of a cycle report.
    pub(crate) async fn cancel_phase_assignments_tx(
        &self,
        actor: &Actor,
        phase: &WorkflowPhase,
        notes: &str,
    ) -> Result<u32, DatabaseError> {
        self.close_open_assignments_tx(
            actor,
            "cycle_id = ?1 AND report_id = ?2 AND phase = ?3 AND kind != 'sla_escalation'",
            vec![
                phase.cycle_id.as_str().into(),
                phase.report_id.as_str().into(),
                phase.phase.as_str().into(),
            ],
            AssignmentStatus::Cancelled,
            Some(notes),
        )
        .await
    }

    /// Complete the open assignments raised for a step that is now done.
    pub(crate) async fn complete_step_assignments_tx(
        &self,
        actor: &Actor,
        phase: &WorkflowPhase,
        step_key: &str,
        notes: Option<&str>,
    ) -> Result<u32, DatabaseError> {
        self.close_open_assignments_tx(
            actor,
            "cycle_id = ?1 AND report_id = ?2 AND phase = ?3 AND step_key = ?4",
            vec![
                phase.cycle_id.as_str().into(),
                phase.report_id.as_str().into(),
                phase.phase.as_str().into(),
                step_key.into(),
            ],
            AssignmentStatus::Completed,
            notes,
        )
        .await
    }

    /// Raise the assignment a step declares, unless one is already open.
    ///
    /// Steps that a report owner performs go to the report's owner when the
    /// owner's role fits the step; everything else lands in the first step
    /// role's shared inbox.
    pub(crate) async fn raise_step_assignment_tx(
        &self,
        actor: &Actor,
        phase: &WorkflowPhase,
        def: &StepDef,
    ) -> Result<Option<Assignment>, DatabaseError> {
        let Some(kind) = def.assignment else {
            return Ok(None);
        };
        let Some(&first_role) = def.roles.first() else {
            return Ok(None);
        };
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT 1 FROM assignments
                     WHERE cycle_id = ?1 AND report_id = ?2 AND phase = ?3 AND step_key = ?4
                       AND status IN {OPEN_STATUSES}"
                ),
                [
                    phase.cycle_id.as_str(),
                    phase.report_id.as_str(),
                    phase.phase.as_str(),
                    def.key,
                ],
            )
            .await?;
        if rows.next().await?.is_some() {
            return Ok(None);
        }

        let mut to_role = first_role;
        let mut to_user_id = None;
        let report = self.get_report(&phase.report_id).await?;
        if let Some(owner_id) = report.report_owner_id {
            let owner = self.get_user(&owner_id).await?;
            if owner.is_active && def.roles.contains(&owner.role) {
                to_role = owner.role;
                to_user_id = Some(owner.id);
            }
        }

        let new = NewAssignment {
            kind,
            title: format!("{}: {}", phase.phase.label(), def.name),
            description: Some(format!("Report '{}' in cycle {}", report.name, phase.cycle_id)),
            to_role,
            to_user_id,
            context: AssignmentContext {
                cycle_id: Some(phase.cycle_id.clone()),
                report_id: Some(phase.report_id.clone()),
                phase: Some(phase.phase),
                step_key: Some(def.key.to_string()),
            },
            priority: Some(Priority::Medium),
            due_at: None,
        };
        self.insert_assignment_tx(actor, &new).await.map(Some)
    }

    pub(crate) async fn flag_escalated_tx(&self, id: &str) -> Result<(), DatabaseError> {
        self.db()
            .conn()
            .execute("UPDATE assignments SET escalated = 1 WHERE id = ?1", [id])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::helpers::{test_service, users};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn unassigned_lands_in_role_inbox_and_is_claimed() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let new = NewAssignment::new(AssignmentKind::General, "Check LOB mapping", Role::DataOwner);
        let asg = svc.create_assignment(&u.executive, &new).await.unwrap();
        assert_eq!(asg.status, AssignmentStatus::Assigned);
        assert_eq!(asg.from_role, Role::TestExecutive);

        let inbox = svc.inbox(&u.data_owner, false, 50).await.unwrap();
        assert_eq!(inbox.open_count, 1);
        assert_eq!(inbox.assignments[0].id, asg.id);
        assert_eq!(svc.inbox(&u.tester, false, 50).await.unwrap().open_count, 0);

        let acked = svc
            .transition_assignment(&u.data_owner, &asg.id, AssignmentStatus::Acknowledged, None)
            .await
            .unwrap();
        assert_eq!(acked.to_user_id.as_deref(), Some(u.data_owner.user_id.as_str()));
        assert!(acked.acknowledged_at.is_some());
    }

    #[tokio::test]
    async fn lifecycle_to_completion() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let mut new = NewAssignment::new(AssignmentKind::EvidenceReview, "Review", Role::ReportOwner);
        new.to_user_id = Some(u.owner.user_id.clone());
        let asg = svc.create_assignment(&u.tester, &new).await.unwrap();

        let err = svc
            .transition_assignment(&u.owner, &asg.id, AssignmentStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Core(CoreError::InvalidTransition { .. })));

        for status in [AssignmentStatus::Acknowledged, AssignmentStatus::InProgress] {
            svc.transition_assignment(&u.owner, &asg.id, status, None)
                .await
                .unwrap();
        }
        let done = svc
            .transition_assignment(&u.owner, &asg.id, AssignmentStatus::Completed, Some("looks good"))
            .await
            .unwrap();
        assert_eq!(done.status, AssignmentStatus::Completed);
        assert_eq!(done.completed_by.as_deref(), Some(u.owner.user_id.as_str()));
        assert_eq!(done.completion_notes.as_deref(), Some("looks good"));
        assert_eq!(svc.inbox(&u.owner, false, 50).await.unwrap().open_count, 0);
        assert_eq!(svc.inbox(&u.owner, true, 50).await.unwrap().assignments.len(), 1);
    }

    #[tokio::test]
    async fn only_participants_transition() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let mut new = NewAssignment::new(AssignmentKind::General, "Task", Role::Tester);
        new.to_user_id = Some(u.tester.user_id.clone());
        let asg = svc.create_assignment(&u.executive, &new).await.unwrap();

        let err = svc
            .transition_assignment(&u.owner, &asg.id, AssignmentStatus::Acknowledged, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Core(CoreError::PermissionDenied { .. })));

        assert!(
            svc.transition_assignment(&u.tester, &asg.id, AssignmentStatus::Cancelled, None)
                .await
                .is_err(),
            "assignee is not the creator"
        );
        let cancelled = svc
            .transition_assignment(&u.executive, &asg.id, AssignmentStatus::Cancelled, None)
            .await
            .unwrap();
        assert_eq!(cancelled.status, AssignmentStatus::Cancelled);
    }

    #[tokio::test]
    async fn assignee_must_hold_role() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let mut new = NewAssignment::new(AssignmentKind::General, "Task", Role::DataOwner);
        new.to_user_id = Some(u.tester.user_id.clone());
        assert!(svc.create_assignment(&u.executive, &new).await.is_err());
    }

    #[tokio::test]
    async fn delegate_requires_matching_role_and_open_status() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let other = svc
            .create_user(&Actor::system(), "tester2@example.com", "T2", Role::Tester)
            .await
            .unwrap();
        let mut new = NewAssignment::new(AssignmentKind::General, "Task", Role::Tester);
        new.to_user_id = Some(u.tester.user_id.clone());
        let asg = svc.create_assignment(&u.executive, &new).await.unwrap();

        assert!(
            svc.delegate_assignment(&u.tester, &asg.id, &u.owner.user_id)
                .await
                .is_err()
        );
        let moved = svc
            .delegate_assignment(&u.tester, &asg.id, &other.user.id)
            .await
            .unwrap();
        assert_eq!(moved.to_user_id.as_deref(), Some(other.user.id.as_str()));

        svc.transition_assignment(&u.executive, &asg.id, AssignmentStatus::Cancelled, None)
            .await
            .unwrap();
        assert!(
            svc.delegate_assignment(&u.executive, &asg.id, &u.tester.user_id)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn filter_by_kind_and_open() {
        let svc = test_service().await;
        let u = users(&svc).await;
        svc.create_assignment(
            &u.executive,
            &NewAssignment::new(AssignmentKind::General, "A", Role::Tester),
        )
        .await
        .unwrap();
        let b = svc
            .create_assignment(
                &u.executive,
                &NewAssignment::new(AssignmentKind::InformationRequest, "B", Role::DataOwner),
            )
            .await
            .unwrap();
        svc.transition_assignment(&u.executive, &b.id, AssignmentStatus::Cancelled, None)
            .await
            .unwrap();

        let requests = svc
            .list_assignments(&AssignmentFilter {
                kind: Some(AssignmentKind::InformationRequest),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(requests.len(), 1);
        let open = svc
            .list_assignments(&AssignmentFilter {
                open_only: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].title, "A");
    }
}
