//! Test cycle repository: CRUD plus status transitions.

use chrono::NaiveDate;
use serde::Deserialize;

use synapse_core::audit_detail::StatusChangedDetail;
use synapse_core::entities::TestCycle;
use synapse_core::enums::{AuditAction, CycleStatus, EntityType, PhaseStatus, Role};
use synapse_core::errors::CoreError;
use synapse_core::identity::Actor;
use synapse_core::ids::PREFIX_CYCLE;

use crate::error::DatabaseError;
use crate::helpers::{get_datetime, get_enum, get_opt_date, get_opt_string, now, opt_text, ts};
use crate::service::SynapseService;
use crate::updates::cycle::CycleUpdate;

const SELECT_COLS: &str = "id, name, description, status, start_date, end_date, \
     test_executive_id, created_by, created_at, updated_at";

/// Input for [`SynapseService::create_cycle`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCycle {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub test_executive_id: Option<String>,
}

fn row_to_cycle(row: &libsql::Row) -> Result<TestCycle, DatabaseError> {
    Ok(TestCycle {
        id: row.get(0)?,
        name: row.get(1)?,
        description: get_opt_string(row, 2)?,
        status: get_enum(row, 3)?,
        start_date: get_opt_date(row, 4)?,
        end_date: get_opt_date(row, 5)?,
        test_executive_id: get_opt_string(row, 6)?,
        created_by: row.get(7)?,
        created_at: get_datetime(row, 8)?,
        updated_at: get_datetime(row, 9)?,
    })
}

fn date_value(date: Option<NaiveDate>) -> libsql::Value {
    date.map_or(libsql::Value::Null, |d| {
        libsql::Value::Text(d.format("%Y-%m-%d").to_string())
    })
}

fn check_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), DatabaseError> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(DatabaseError::validation(format!(
                "end date {end} is before start date {start}"
            )));
        }
    }
    Ok(())
}

impl SynapseService {
    /// Create a cycle in `draft`.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty name, inverted dates, or a test executive
    /// that does not hold that role.
    pub async fn create_cycle(
        &self,
        actor: &Actor,
        new: &NewCycle,
    ) -> Result<TestCycle, DatabaseError> {
        if new.name.trim().is_empty() {
            return Err(DatabaseError::validation("cycle name must not be empty"));
        }
        check_dates(new.start_date, new.end_date)?;
        let tx = self.begin_write().await?;
        let result = tx.run(self.create_cycle_tx(actor, new)).await;
        tx.finish(result).await
    }

    async fn create_cycle_tx(
        &self,
        actor: &Actor,
        new: &NewCycle,
    ) -> Result<TestCycle, DatabaseError> {
        if let Some(ref exec) = new.test_executive_id {
            self.require_user_with_role(exec, &[Role::TestExecutive])
                .await?;
        }

        let now = now();
        let id = self.db().generate_id(PREFIX_CYCLE).await?;
        self.db()
            .conn()
            .execute(
                &format!(
                    "INSERT INTO test_cycles ({SELECT_COLS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                libsql::params![
                    id.as_str(),
                    new.name.trim(),
                    opt_text(new.description.as_deref()),
                    CycleStatus::Draft.as_str(),
                    date_value(new.start_date),
                    date_value(new.end_date),
                    opt_text(new.test_executive_id.as_deref()),
                    actor.user_id.as_str(),
                    ts(now),
                    ts(now)
                ],
            )
            .await?;

        self.record(actor, EntityType::TestCycle, &id, AuditAction::Created, None)
            .await?;
        tracing::info!(cycle_id = %id, "test cycle created");
        self.get_cycle(&id).await
    }

    /// # Errors
    ///
    /// `NotFound` if no cycle has this ID.
    pub async fn get_cycle(&self, id: &str) -> Result<TestCycle, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM test_cycles WHERE id = ?1"),
                [id],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| DatabaseError::not_found(EntityType::TestCycle, id))?;
        row_to_cycle(&row)
    }

    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_cycles(
        &self,
        status: Option<CycleStatus>,
        limit: u32,
    ) -> Result<Vec<TestCycle>, DatabaseError> {
        let mut rows = match status {
            Some(status) => {
                self.db()
                    .conn()
                    .query(
                        &format!(
                            "SELECT {SELECT_COLS} FROM test_cycles WHERE status = ?1
                             ORDER BY created_at DESC LIMIT {limit}"
                        ),
                        [status.as_str()],
                    )
                    .await?
            }
            None => {
                self.db()
                    .conn()
                    .query(
                        &format!(
                            "SELECT {SELECT_COLS} FROM test_cycles ORDER BY created_at DESC LIMIT {limit}"
                        ),
                        (),
                    )
                    .await?
            }
        };
        let mut cycles = Vec::new();
        while let Some(row) = rows.next().await? {
            cycles.push(row_to_cycle(&row)?);
        }
        Ok(cycles)
    }

    /// Apply a partial update. Completed and cancelled cycles are read-only.
    ///
    /// # Errors
    ///
    /// `Validation` for a terminal cycle, inverted dates, or a bad executive.
    pub async fn update_cycle(
        &self,
        actor: &Actor,
        id: &str,
        update: CycleUpdate,
    ) -> Result<TestCycle, DatabaseError> {
        let tx = self.begin_write().await?;
        let result = tx.run(self.update_cycle_tx(actor, id, update)).await;
        tx.finish(result).await
    }

    async fn update_cycle_tx(
        &self,
        actor: &Actor,
        id: &str,
        update: CycleUpdate,
    ) -> Result<TestCycle, DatabaseError> {
        let current = self.get_cycle(id).await?;
        if update.is_empty() {
            return Ok(current);
        }
        if current.status.is_terminal() {
            return Err(DatabaseError::validation(format!(
                "cycle {id} is {} and can no longer be edited",
                current.status
            )));
        }
        check_dates(
            update.start_date.unwrap_or(current.start_date),
            update.end_date.unwrap_or(current.end_date),
        )?;

        let mut sets = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(ref name) = update.name {
            if name.trim().is_empty() {
                return Err(DatabaseError::validation("cycle name must not be empty"));
            }
            params.push(name.trim().into());
            sets.push(format!("name = ?{}", params.len()));
        }
        if let Some(ref description) = update.description {
            params.push(opt_text(description.as_deref()));
            sets.push(format!("description = ?{}", params.len()));
        }
        if let Some(start) = update.start_date {
            params.push(date_value(start));
            sets.push(format!("start_date = ?{}", params.len()));
        }
        if let Some(end) = update.end_date {
            params.push(date_value(end));
            sets.push(format!("end_date = ?{}", params.len()));
        }
        if let Some(ref exec) = update.test_executive_id {
            if let Some(exec) = exec {
                self.require_user_with_role(exec, &[Role::TestExecutive])
                    .await?;
            }
            params.push(opt_text(exec.as_deref()));
            sets.push(format!("test_executive_id = ?{}", params.len()));
        }

        params.push(ts(now()).into());
        sets.push(format!("updated_at = ?{}", params.len()));
        params.push(id.into());
        let sql = format!(
            "UPDATE test_cycles SET {} WHERE id = ?{}",
            sets.join(", "),
            params.len()
        );
        self.db()
            .conn()
            .execute(&sql, libsql::params_from_iter(params))
            .await?;

        self.record(
            actor,
            EntityType::TestCycle,
            id,
            AuditAction::Updated,
            Some(serde_json::to_value(&update)?),
        )
        .await?;
        self.get_cycle(id).await
    }

    /// Move a cycle to `status`.
    ///
    /// Completing requires at least one report and every phase of every
    /// report `complete`. Cancelling cancels the cycle's open assignments and
    /// resolves its open SLA violations.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` for a disallowed move, `Validation` when
    /// completion preconditions fail.
    pub async fn transition_cycle(
        &self,
        actor: &Actor,
        id: &str,
        status: CycleStatus,
        reason: Option<&str>,
    ) -> Result<TestCycle, DatabaseError> {
        let tx = self.begin_write().await?;
        let result = tx.run(self.transition_cycle_tx(actor, id, status, reason)).await;
        tx.finish(result).await
    }

    async fn transition_cycle_tx(
        &self,
        actor: &Actor,
        id: &str,
        status: CycleStatus,
        reason: Option<&str>,
    ) -> Result<TestCycle, DatabaseError> {
        let current = self.get_cycle(id).await?;
        if !current.status.can_transition_to(status) {
            return Err(
                CoreError::transition(EntityType::TestCycle, id, current.status, status).into(),
            );
        }

        if status == CycleStatus::Completed {
            self.check_cycle_complete(id).await?;
        }

        let now = now();
        self.db()
            .conn()
            .execute(
                "UPDATE test_cycles SET status = ?1, updated_at = ?2 WHERE id = ?3",
                libsql::params![status.as_str(), ts(now), id],
            )
            .await?;

        if status == CycleStatus::Cancelled {
            let cancelled = self.cancel_cycle_assignments_tx(actor, id).await?;
            let resolved = self.resolve_cycle_violations_tx(actor, id, now).await?;
            tracing::info!(cycle_id = %id, cancelled, resolved, "cycle cancelled");
        }

        let detail = StatusChangedDetail {
            from: current.status.as_str().to_string(),
            to: status.as_str().to_string(),
            reason: reason.map(String::from),
        };
        self.record(
            actor,
            EntityType::TestCycle,
            id,
            AuditAction::StatusChanged,
            Some(serde_json::to_value(&detail)?),
        )
        .await?;
        self.get_cycle(id).await
    }

    async fn check_cycle_complete(&self, id: &str) -> Result<(), DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN status != ?2 THEN 1 ELSE 0 END), 0)
                 FROM workflow_phases WHERE cycle_id = ?1",
                libsql::params![id, PhaseStatus::Complete.as_str()],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        let total = row.get::<i64>(0)?;
        let incomplete = row.get::<i64>(1)?;
        if total == 0 {
            return Err(DatabaseError::validation(format!(
                "cycle {id} has no reports and cannot be completed"
            )));
        }
        if incomplete > 0 {
            return Err(DatabaseError::validation(format!(
                "cycle {id} has {incomplete} workflow phases not complete"
            )));
        }
        Ok(())
    }

    /// Fails unless the cycle exists and is not completed or cancelled.
    pub(crate) async fn require_open_cycle(&self, id: &str) -> Result<TestCycle, DatabaseError> {
        let cycle = self.get_cycle(id).await?;
        if cycle.status.is_terminal() {
            return Err(DatabaseError::validation(format!(
                "cycle {id} is {}",
                cycle.status
            )));
        }
        Ok(cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::helpers::{test_service, users};
    use crate::updates::cycle::CycleUpdateBuilder;
    use pretty_assertions::assert_eq;

    fn new_cycle(name: &str) -> NewCycle {
        NewCycle {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_starts_in_draft() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let cycle = svc.create_cycle(&u.executive, &new_cycle("Q1")).await.unwrap();
        assert_eq!(cycle.status, CycleStatus::Draft);
        assert_eq!(cycle.created_by, u.executive.user_id);
        assert_eq!(svc.get_cycle(&cycle.id).await.unwrap(), cycle);
    }

    #[tokio::test]
    async fn inverted_dates_rejected() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let new = NewCycle {
            name: "Bad".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 6, 1),
            end_date: NaiveDate::from_ymd_opt(2026, 5, 1),
            ..Default::default()
        };
        assert!(svc.create_cycle(&u.executive, &new).await.is_err());
    }

    #[tokio::test]
    async fn executive_must_hold_role() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let new = NewCycle {
            name: "Q2".into(),
            test_executive_id: Some(u.tester.user_id.clone()),
            ..Default::default()
        };
        assert!(svc.create_cycle(&u.executive, &new).await.is_err());
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let cycle = svc.create_cycle(&u.executive, &new_cycle("Q3")).await.unwrap();
        let update = CycleUpdateBuilder::new()
            .description(Some("Quarterly".into()))
            .build();
        let updated = svc.update_cycle(&u.executive, &cycle.id, update).await.unwrap();
        assert_eq!(updated.name, "Q3");
        assert_eq!(updated.description.as_deref(), Some("Quarterly"));
    }

    #[tokio::test]
    async fn transitions_follow_state_machine() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let cycle = svc.create_cycle(&u.executive, &new_cycle("Q4")).await.unwrap();

        let err = svc
            .transition_cycle(&u.executive, &cycle.id, CycleStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Core(CoreError::InvalidTransition { .. })));

        svc.transition_cycle(&u.executive, &cycle.id, CycleStatus::Active, None)
            .await
            .unwrap();
        let err = svc
            .transition_cycle(&u.executive, &cycle.id, CycleStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Core(CoreError::Validation(_))));

        let cancelled = svc
            .transition_cycle(&u.executive, &cycle.id, CycleStatus::Cancelled, Some("descoped"))
            .await
            .unwrap();
        assert_eq!(cancelled.status, CycleStatus::Cancelled);
        assert!(
            svc.update_cycle(&u.executive, &cycle.id, CycleUpdateBuilder::new().name("x").build())
                .await
                .is_err()
        );
    }
}
