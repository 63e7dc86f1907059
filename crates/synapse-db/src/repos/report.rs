//! Report repository and cycle membership.
//!
//! Adding a report to a cycle creates the eight workflow phases for that
//! cycle report, each `not_started` with all of its steps `pending`.

use serde::Deserialize;

use synapse_core::entities::{CycleReport, Report};
use synapse_core::enums::{AuditAction, EntityType, PhaseName, PhaseStatus, Role, StepStatus};
use synapse_core::identity::Actor;
use synapse_core::ids::{PREFIX_PHASE, PREFIX_REPORT};
use synapse_core::workflow;

use crate::error::DatabaseError;
use crate::helpers::{get_datetime, get_opt_string, now, opt_text, ts};
use crate::service::SynapseService;

const SELECT_COLS: &str =
    "id, name, regulation, line_of_business, report_owner_id, created_at, updated_at";

const OWNER_ROLES: &[Role] = &[Role::ReportOwner, Role::ReportOwnerExecutive];

/// Input for [`SynapseService::create_report`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewReport {
    pub name: String,
    #[serde(default)]
    pub regulation: Option<String>,
    #[serde(default)]
    pub line_of_business: Option<String>,
    #[serde(default)]
    pub report_owner_id: Option<String>,
}

fn row_to_report(row: &libsql::Row) -> Result<Report, DatabaseError> {
    Ok(Report {
        id: row.get(0)?,
        name: row.get(1)?,
        regulation: get_opt_string(row, 2)?,
        line_of_business: get_opt_string(row, 3)?,
        report_owner_id: get_opt_string(row, 4)?,
        created_at: get_datetime(row, 5)?,
        updated_at: get_datetime(row, 6)?,
    })
}

fn row_to_cycle_report(row: &libsql::Row) -> Result<CycleReport, DatabaseError> {
    Ok(CycleReport {
        cycle_id: row.get(0)?,
        report_id: row.get(1)?,
        tester_id: row.get(2)?,
        created_at: get_datetime(row, 3)?,
    })
}

fn cycle_report_key(cycle_id: &str, report_id: &str) -> String {
    format!("{cycle_id}/{report_id}")
}

impl SynapseService {
    /// # Errors
    ///
    /// `Validation` for an empty or duplicate name, or an owner without a
    /// report-owner role.
    pub async fn create_report(
        &self,
        actor: &Actor,
        new: &NewReport,
    ) -> Result<Report, DatabaseError> {
        if new.name.trim().is_empty() {
            return Err(DatabaseError::validation("report name must not be empty"));
        }
        let tx = self.begin_write().await?;
        let result = tx.run(self.create_report_tx(actor, new)).await;
        tx.finish(result).await
    }

    async fn create_report_tx(
        &self,
        actor: &Actor,
        new: &NewReport,
    ) -> Result<Report, DatabaseError> {
        if let Some(ref owner) = new.report_owner_id {
            self.require_user_with_role(owner, OWNER_ROLES).await?;
        }
        let mut rows = self
            .db()
            .conn()
            .query("SELECT 1 FROM reports WHERE name = ?1", [new.name.trim()])
            .await?;
        if rows.next().await?.is_some() {
            return Err(DatabaseError::validation(format!(
                "a report named '{}' already exists",
                new.name.trim()
            )));
        }

        let now = now();
        let id = self.db().generate_id(PREFIX_REPORT).await?;
        self.db()
            .conn()
            .execute(
                &format!("INSERT INTO reports ({SELECT_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                libsql::params![
                    id.as_str(),
                    new.name.trim(),
                    opt_text(new.regulation.as_deref()),
                    opt_text(new.line_of_business.as_deref()),
                    opt_text(new.report_owner_id.as_deref()),
                    ts(now),
                    ts(now)
                ],
            )
            .await?;
        self.record(actor, EntityType::Report, &id, AuditAction::Created, None)
            .await?;
        self.get_report(&id).await
    }

    /// # Errors
    ///
    /// `NotFound` if no report has this ID.
    pub async fn get_report(&self, id: &str) -> Result<Report, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(&format!("SELECT {SELECT_COLS} FROM reports WHERE id = ?1"), [id])
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| DatabaseError::not_found(EntityType::Report, id))?;
        row_to_report(&row)
    }

    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_reports(&self, limit: u32) -> Result<Vec<Report>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM reports ORDER BY name LIMIT {limit}"),
                (),
            )
            .await?;
        let mut reports = Vec::new();
        while let Some(row) = rows.next().await? {
            reports.push(row_to_report(&row)?);
        }
        Ok(reports)
    }

    /// Put a report into a cycle with its assigned tester and initialize the
    /// workflow.
    ///
    /// # Errors
    ///
    /// `Validation` if the cycle is terminal, the tester lacks the `tester`
    /// role, or the report is already in the cycle.
    pub async fn add_report_to_cycle(
        &self,
        actor: &Actor,
        cycle_id: &str,
        report_id: &str,
        tester_id: &str,
    ) -> Result<CycleReport, DatabaseError> {
        let tx = self.begin_write().await?;
        let result = tx
            .run(self.add_report_to_cycle_tx(actor, cycle_id, report_id, tester_id))
            .await;
        tx.finish(result).await
    }

    async fn add_report_to_cycle_tx(
        &self,
        actor: &Actor,
        cycle_id: &str,
        report_id: &str,
        tester_id: &str,
    ) -> Result<CycleReport, DatabaseError> {
        self.require_open_cycle(cycle_id).await?;
        self.get_report(report_id).await?;
        self.require_user_with_role(tester_id, &[Role::Tester]).await?;
        if self.find_cycle_report(cycle_id, report_id).await?.is_some() {
            return Err(DatabaseError::validation(format!(
                "report {report_id} is already in cycle {cycle_id}"
            )));
        }

        let now = now();
        self.db()
            .conn()
            .execute(
                "INSERT INTO cycle_reports (cycle_id, report_id, tester_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                libsql::params![cycle_id, report_id, tester_id, ts(now)],
            )
            .await?;

        for phase in PhaseName::ALL {
            let phase_id = self.db().generate_id(PREFIX_PHASE).await?;
            self.db()
                .conn()
                .execute(
                    "INSERT INTO workflow_phases (id, cycle_id, report_id, phase, status, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    libsql::params![
                        phase_id.as_str(),
                        cycle_id,
                        report_id,
                        phase.as_str(),
                        PhaseStatus::NotStarted.as_str(),
                        ts(now)
                    ],
                )
                .await?;
            for (position, step) in (0_i64..).zip(workflow::steps(phase)) {
                self.db()
                    .conn()
                    .execute(
                        "INSERT INTO phase_steps (phase_id, step_key, position, status)
                         VALUES (?1, ?2, ?3, ?4)",
                        libsql::params![
                            phase_id.as_str(),
                            step.key,
                            position,
                            StepStatus::Pending.as_str()
                        ],
                    )
                    .await?;
            }
        }

        let key = cycle_report_key(cycle_id, report_id);
        self.record(
            actor,
            EntityType::CycleReport,
            &key,
            AuditAction::Created,
            Some(serde_json::json!({ "tester_id": tester_id })),
        )
        .await?;
        tracing::info!(cycle_id, report_id, "report added to cycle");

        Ok(CycleReport {
            cycle_id: cycle_id.to_string(),
            report_id: report_id.to_string(),
            tester_id: tester_id.to_string(),
            created_at: now,
        })
    }

    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn find_cycle_report(
        &self,
        cycle_id: &str,
        report_id: &str,
    ) -> Result<Option<CycleReport>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT cycle_id, report_id, tester_id, created_at FROM cycle_reports
                 WHERE cycle_id = ?1 AND report_id = ?2",
                [cycle_id, report_id],
            )
            .await?;
        rows.next()
            .await?
            .map(|row| row_to_cycle_report(&row))
            .transpose()
    }

    /// # Errors
    ///
    /// `NotFound` if the report is not part of the cycle.
    pub async fn get_cycle_report(
        &self,
        cycle_id: &str,
        report_id: &str,
    ) -> Result<CycleReport, DatabaseError> {
        self.find_cycle_report(cycle_id, report_id)
            .await?
            .ok_or_else(|| {
                DatabaseError::not_found(
                    EntityType::CycleReport,
                    &cycle_report_key(cycle_id, report_id),
                )
            })
    }

    /// # Errors
    ///
    /// `NotFound` if the cycle does not exist.
    pub async fn list_cycle_reports(
        &self,
        cycle_id: &str,
    ) -> Result<Vec<CycleReport>, DatabaseError> {
        self.get_cycle(cycle_id).await?;
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT cycle_id, report_id, tester_id, created_at FROM cycle_reports
                 WHERE cycle_id = ?1 ORDER BY created_at",
                [cycle_id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_cycle_report(&row)?);
        }
        Ok(out)
    }

    /// Remove a report from a cycle. Only allowed while every phase is
    /// `not_started`; phases and steps are deleted with it.
    ///
    /// # Errors
    ///
    /// `Validation` once any phase has started.
    pub async fn remove_report_from_cycle(
        &self,
        actor: &Actor,
        cycle_id: &str,
        report_id: &str,
    ) -> Result<(), DatabaseError> {
        let tx = self.begin_write().await?;
        let result = tx.run(self.remove_report_from_cycle_tx(actor, cycle_id, report_id)).await;
        tx.finish(result).await
    }

    async fn remove_report_from_cycle_tx(
        &self,
        actor: &Actor,
        cycle_id: &str,
        report_id: &str,
    ) -> Result<(), DatabaseError> {
        self.require_open_cycle(cycle_id).await?;
        self.get_cycle_report(cycle_id, report_id).await?;
        let statuses = self.phase_statuses(cycle_id, report_id).await?;
        let started: Vec<&str> = statuses
            .iter()
            .filter(|(_, s)| **s != PhaseStatus::NotStarted)
            .map(|(p, _)| p.as_str())
            .collect();
        if !started.is_empty() {
            return Err(DatabaseError::validation(format!(
                "cannot remove report {report_id}: phases already started: {}",
                started.join(", ")
            )));
        }

        self.db()
            .conn()
            .execute(
                "DELETE FROM cycle_reports WHERE cycle_id = ?1 AND report_id = ?2",
                [cycle_id, report_id],
            )
            .await?;
        self.record(
            actor,
            EntityType::CycleReport,
            &cycle_report_key(cycle_id, report_id),
            AuditAction::Deleted,
            None,
        )
        .await
    }
}
