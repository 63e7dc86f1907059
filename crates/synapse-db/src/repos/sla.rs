//! SLA violation repository and the periodic check.
//!
//! A target (an in-progress phase of an active cycle, or an open
//! assignment) has at most one open violation. The check is idempotent:
//! re-running it only raises the escalation level when it grew, and
//! resolves violations whose target is no longer active.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use synapse_core::audit_detail::SlaDetail;
use synapse_core::entities::{AssignmentContext, SlaViolation};
use synapse_core::enums::{
    AssignmentKind, AuditAction, EntityType, PhaseName, Priority, Role, SlaTarget,
};
use synapse_core::identity::Actor;
use synapse_core::ids::PREFIX_SLA;
use synapse_core::responses::SlaCheckReport;
use synapse_core::sla::{SlaEvaluation, SlaPolicy};

use crate::error::DatabaseError;
use crate::helpers::{
    get_datetime, get_enum, get_opt_datetime, get_opt_enum, get_opt_string, get_u32, opt_text, ts,
};
use crate::repos::assignment::NewAssignment;
use crate::service::SynapseService;

const SELECT_COLS: &str = "id, target, target_id, cycle_id, report_id, phase, threshold_hours, \
     elapsed_hours, escalation_level, detected_at, resolved_at";

fn row_to_violation(row: &libsql::Row) -> Result<SlaViolation, DatabaseError> {
    Ok(SlaViolation {
        id: row.get(0)?,
        target: get_enum(row, 1)?,
        target_id: row.get(2)?,
        cycle_id: get_opt_string(row, 3)?,
        report_id: get_opt_string(row, 4)?,
        phase: get_opt_enum(row, 5)?,
        threshold_hours: row.get(6)?,
        elapsed_hours: row.get(7)?,
        escalation_level: get_u32(row, 8)?,
        detected_at: get_datetime(row, 9)?,
        resolved_at: get_opt_datetime(row, 10)?,
    })
}

/// One thing the SLA clock runs against.
struct Target {
    target: SlaTarget,
    id: String,
    title: String,
    cycle_id: Option<String>,
    report_id: Option<String>,
    phase: Option<PhaseName>,
    started_at: DateTime<Utc>,
    threshold_hours: Option<f64>,
}

impl Target {
    fn detail(&self, eval: &SlaEvaluation) -> SlaDetail {
        SlaDetail {
            target: self.target,
            target_id: self.id.clone(),
            elapsed_hours: eval.elapsed_hours,
            threshold_hours: eval.threshold_hours,
            escalation_level: eval.escalation_level,
        }
    }
}

impl SynapseService {
    /// Evaluate every active target against `policy` at `now`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if any statement fails; the whole check rolls
    /// back.
    pub async fn check_sla(
        &self,
        actor: &Actor,
        policy: &SlaPolicy,
        now: DateTime<Utc>,
    ) -> Result<SlaCheckReport, DatabaseError> {
        let tx = self.begin_write().await?;
        let result = tx.run(self.check_sla_tx(actor, policy, now)).await;
        let report = tx.finish(result).await?;
        if report.new_violations > 0 || report.escalated > 0 || report.resolved > 0 {
            tracing::info!(
                checked = report.checked,
                new_violations = report.new_violations,
                escalated = report.escalated,
                resolved = report.resolved,
                "sla check"
            );
        } else {
            tracing::debug!(checked = report.checked, "sla check");
        }
        Ok(report)
    }

    async fn check_sla_tx(
        &self,
        actor: &Actor,
        policy: &SlaPolicy,
        now: DateTime<Utc>,
    ) -> Result<SlaCheckReport, DatabaseError> {
        let mut report = SlaCheckReport::default();
        let targets = self.active_sla_targets(policy).await?;
        let active: HashSet<(SlaTarget, String)> = targets
            .iter()
            .map(|t| (t.target, t.id.clone()))
            .collect();

        for target in &targets {
            report.checked += 1;
            let Some(threshold) = target.threshold_hours else {
                continue;
            };
            let eval = policy.evaluate(target.started_at, now, threshold);
            if !eval.is_breached() {
                continue;
            }
            match self.open_violation(target.target, &target.id).await? {
                None => {
                    self.open_violation_tx(actor, target, &eval, now).await?;
                    report.new_violations += 1;
                }
                Some(existing) if eval.escalation_level > existing.escalation_level => {
                    self.escalate_violation_tx(actor, &existing, target, &eval)
                        .await?;
                    report.escalated += 1;
                }
                Some(_) => {}
            }
        }

        for violation in self.list_violations(true, u32::MAX).await? {
            if !active.contains(&(violation.target, violation.target_id.clone())) {
                report.resolved += self
                    .resolve_violations_tx(actor, "id = ?1", vec![violation.id.into()], now)
                    .await?;
            }
        }
        Ok(report)
    }

    async fn active_sla_targets(&self, policy: &SlaPolicy) -> Result<Vec<Target>, DatabaseError> {
        let mut targets = Vec::new();

        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT wp.id, wp.cycle_id, wp.report_id, wp.phase, wp.started_at
                 FROM workflow_phases wp JOIN test_cycles c ON c.id = wp.cycle_id
                 WHERE wp.status = 'in_progress' AND c.status = 'active'
                   AND wp.started_at IS NOT NULL
                 ORDER BY wp.started_at",
                (),
            )
            .await?;
        while let Some(row) = rows.next().await? {
            let phase: PhaseName = get_enum(&row, 3)?;
            targets.push(Target {
                target: SlaTarget::Phase,
                id: row.get(0)?,
                title: phase.label().to_string(),
                cycle_id: Some(row.get(1)?),
                report_id: Some(row.get(2)?),
                phase: Some(phase),
                started_at: get_datetime(&row, 4)?,
                threshold_hours: policy.phase_threshold(phase),
            });
        }

        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT id, title, cycle_id, report_id, phase, priority, due_at, created_at
                 FROM assignments
                 WHERE status IN ('assigned', 'acknowledged', 'in_progress')
                   AND kind != 'sla_escalation'
                 ORDER BY created_at",
                (),
            )
            .await?;
        while let Some(row) = rows.next().await? {
            let created_at = get_datetime(&row, 7)?;
            let priority: Priority = get_enum(&row, 5)?;
            targets.push(Target {
                target: SlaTarget::Assignment,
                id: row.get(0)?,
                title: row.get(1)?,
                cycle_id: get_opt_string(&row, 2)?,
                report_id: get_opt_string(&row, 3)?,
                phase: get_opt_enum(&row, 4)?,
                started_at: created_at,
                threshold_hours: policy.assignment_threshold(
                    created_at,
                    get_opt_datetime(&row, 6)?,
                    priority,
                ),
            });
        }
        Ok(targets)
    }

    async fn open_violation(
        &self,
        target: SlaTarget,
        target_id: &str,
    ) -> Result<Option<SlaViolation>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM sla_violations
                     WHERE target = ?1 AND target_id = ?2 AND resolved_at IS NULL"
                ),
                [target.as_str(), target_id],
            )
            .await?;
        rows.next()
            .await?
            .map(|row| row_to_violation(&row))
            .transpose()
    }

    async fn open_violation_tx(
        &self,
        actor: &Actor,
        target: &Target,
        eval: &SlaEvaluation,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let id = self.db().generate_id(PREFIX_SLA).await?;
        self.db()
            .conn()
            .execute(
                &format!(
                    "INSERT INTO sla_violations ({SELECT_COLS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL)"
                ),
                libsql::params![
                    id.as_str(),
                    target.target.as_str(),
                    target.id.as_str(),
                    opt_text(target.cycle_id.as_deref()),
                    opt_text(target.report_id.as_deref()),
                    opt_text(target.phase.map(PhaseName::as_str)),
                    eval.threshold_hours,
                    eval.elapsed_hours,
                    i64::from(eval.escalation_level),
                    ts(now)
                ],
            )
            .await?;
        self.record(
            actor,
            EntityType::SlaViolation,
            &id,
            AuditAction::SlaViolated,
            Some(serde_json::to_value(target.detail(eval))?),
        )
        .await?;

        if target.target == SlaTarget::Assignment {
            self.flag_escalated_tx(&target.id).await?;
        }
        self.raise_escalation_tx(actor, target, eval).await?;
        tracing::warn!(
            target = %target.target,
            target_id = %target.id,
            elapsed_hours = eval.elapsed_hours,
            threshold_hours = eval.threshold_hours,
            "sla breached"
        );
        Ok(())
    }

    async fn escalate_violation_tx(
        &self,
        actor: &Actor,
        existing: &SlaViolation,
        target: &Target,
        eval: &SlaEvaluation,
    ) -> Result<(), DatabaseError> {
        self.db()
            .conn()
            .execute(
                "UPDATE sla_violations SET escalation_level = ?1, elapsed_hours = ?2 WHERE id = ?3",
                libsql::params![
                    i64::from(eval.escalation_level),
                    eval.elapsed_hours,
                    existing.id.as_str()
                ],
            )
            .await?;
        if target.target == SlaTarget::Assignment {
            self.flag_escalated_tx(&target.id).await?;
        }
        self.record(
            actor,
            EntityType::SlaViolation,
            &existing.id,
            AuditAction::Updated,
            Some(serde_json::to_value(target.detail(eval))?),
        )
        .await
    }

    /// Raise the `sla_escalation` assignment for a new breach. It goes to the
    /// cycle's test executive when one is set and active.
    async fn raise_escalation_tx(
        &self,
        actor: &Actor,
        target: &Target,
        eval: &SlaEvaluation,
    ) -> Result<(), DatabaseError> {
        let mut to_user_id = None;
        if let Some(ref cycle_id) = target.cycle_id {
            if let Some(exec_id) = self.get_cycle(cycle_id).await?.test_executive_id {
                let exec = self.get_user(&exec_id).await?;
                if exec.is_active && exec.role == Role::TestExecutive {
                    to_user_id = Some(exec.id);
                }
            }
        }

        let new = NewAssignment {
            kind: AssignmentKind::SlaEscalation,
            title: format!("SLA breached: {}", target.title),
            description: Some(format!(
                "{} {} exceeded its {:.0}h threshold ({:.1}h elapsed)",
                target.target, target.id, eval.threshold_hours, eval.elapsed_hours
            )),
            to_role: Role::TestExecutive,
            to_user_id,
            context: AssignmentContext {
                cycle_id: target.cycle_id.clone(),
                report_id: target.report_id.clone(),
                phase: target.phase,
                step_key: None,
            },
            priority: Some(Priority::High),
            due_at: None,
        };
        self.insert_assignment_tx(actor, &new).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// `NotFound` if no violation has this ID.
    pub async fn get_violation(&self, id: &str) -> Result<SlaViolation, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM sla_violations WHERE id = ?1"),
                [id],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| DatabaseError::not_found(EntityType::SlaViolation, id))?;
        row_to_violation(&row)
    }

    /// Violations, newest first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_violations(
        &self,
        open_only: bool,
        limit: u32,
    ) -> Result<Vec<SlaViolation>, DatabaseError> {
        let where_clause = if open_only {
            "WHERE resolved_at IS NULL"
        } else {
            ""
        };
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM sla_violations {where_clause}
                     ORDER BY detected_at DESC, rowid DESC LIMIT {limit}"
                ),
                (),
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_violation(&row)?);
        }
        Ok(out)
    }

    async fn resolve_violations_tx(
        &self,
        actor: &Actor,
        where_sql: &str,
        params: Vec<libsql::Value>,
        now: DateTime<Utc>,
    ) -> Result<u32, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT id FROM sla_violations WHERE {where_sql} AND resolved_at IS NULL"
                ),
                libsql::params_from_iter(params),
            )
            .await?;
        let mut ids: Vec<String> = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get(0)?);
        }

        for id in &ids {
            self.db()
                .conn()
                .execute(
                    "UPDATE sla_violations SET resolved_at = ?1 WHERE id = ?2",
                    libsql::params![ts(now), id.as_str()],
                )
                .await?;
            self.record(actor, EntityType::SlaViolation, id, AuditAction::SlaResolved, None)
                .await?;
        }
        Ok(u32::try_from(ids.len()).unwrap_or(u32::MAX))
    }

    pub(crate) async fn resolve_target_violation_tx(
        &self,
        actor: &Actor,
        target: SlaTarget,
        target_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u32, DatabaseError> {
        self.resolve_violations_tx(
            actor,
            "target = ?1 AND target_id = ?2",
            vec![target.as_str().into(), target_id.into()],
            now,
        )
        .await
    }

    pub(crate) async fn resolve_cycle_violations_tx(
        &self,
        actor: &Actor,
        cycle_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u32, DatabaseError> {
        self.resolve_violations_tx(actor, "cycle_id = ?1", vec![cycle_id.into()], now)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::helpers::{active_cycle_report, test_service, users};
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use synapse_core::enums::AssignmentStatus;

    use crate::repos::assignment::AssignmentFilter;

    #[tokio::test]
    async fn breach_is_detected_once_then_escalated() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let (cycle_id, report_id) = active_cycle_report(&svc, &u).await;
        let phase = svc
            .start_phase(&u.tester, &cycle_id, &report_id, PhaseName::Planning)
            .await
            .unwrap();
        let started = phase.started_at.unwrap();
        let policy = SlaPolicy::default();

        let early = svc
            .check_sla(&Actor::system(), &policy, started + Duration::hours(10))
            .await
            .unwrap();
        assert_eq!(early, SlaCheckReport { checked: 1, ..Default::default() });

        let first = svc
            .check_sla(&Actor::system(), &policy, started + Duration::hours(80))
            .await
            .unwrap();
        assert_eq!(first.new_violations, 1);
        let again = svc
            .check_sla(&Actor::system(), &policy, started + Duration::hours(80))
            .await
            .unwrap();
        assert_eq!(again.new_violations, 0);
        assert_eq!(again.escalated, 0);

        let open = svc.list_violations(true, 10).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].target_id, phase.id);
        assert_eq!(open[0].escalation_level, 1);

        let escalations = svc
            .list_assignments(&AssignmentFilter {
                kind: Some(AssignmentKind::SlaEscalation),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].to_role, Role::TestExecutive);
        assert_eq!(escalations[0].status, AssignmentStatus::Assigned);

        let later = svc
            .check_sla(&Actor::system(), &policy, started + Duration::hours(150))
            .await
            .unwrap();
        assert_eq!(later.escalated, 1);
        assert_eq!(svc.get_violation(&open[0].id).await.unwrap().escalation_level, 2);
    }

    #[tokio::test]
    async fn inactive_targets_are_resolved() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let (cycle_id, report_id) = active_cycle_report(&svc, &u).await;
        let phase = svc
            .start_phase(&u.tester, &cycle_id, &report_id, PhaseName::Planning)
            .await
            .unwrap();
        let late = phase.started_at.unwrap() + Duration::hours(100);
        svc.check_sla(&Actor::system(), &SlaPolicy::default(), late)
            .await
            .unwrap();

        svc.hold_phase(&u.tester, &cycle_id, &report_id, PhaseName::Planning, None)
            .await
            .unwrap();
        assert!(svc.list_violations(true, 10).await.unwrap().is_empty());

        let report = svc
            .check_sla(&Actor::system(), &SlaPolicy::default(), late)
            .await
            .unwrap();
        assert_eq!(report.checked, 0);
        assert_eq!(report.new_violations, 0);
    }

    #[tokio::test]
    async fn overdue_assignment_is_flagged() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let mut new = NewAssignment::new(AssignmentKind::General, "Chase", Role::Tester);
        new.priority = Some(Priority::Critical);
        let asg = svc.create_assignment(&u.executive, &new).await.unwrap();

        let report = svc
            .check_sla(
                &Actor::system(),
                &SlaPolicy::default(),
                asg.created_at + Duration::hours(9),
            )
            .await
            .unwrap();
        assert_eq!(report.new_violations, 1);
        assert!(svc.get_assignment(&asg.id).await.unwrap().escalated);

        svc.transition_assignment(&u.executive, &asg.id, AssignmentStatus::Cancelled, None)
            .await
            .unwrap();
        assert!(svc.list_violations(true, 10).await.unwrap().is_empty());
        assert_eq!(svc.list_violations(false, 10).await.unwrap().len(), 1);
    }
}
