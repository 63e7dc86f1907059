//! Observation repository.
//!
//! Observations are findings recorded during the observations phase.
//! Testers draft and submit them; report owners approve or reject.

use serde::Deserialize;

use synapse_core::audit_detail::StatusChangedDetail;
use synapse_core::entities::Observation;
use synapse_core::enums::{
    Action, AuditAction, EntityType, ObservationStatus, PhaseName, PhaseStatus, Resource, Role,
    Severity,
};
use synapse_core::errors::CoreError;
use synapse_core::identity::Actor;
use synapse_core::ids::PREFIX_OBSERVATION;

use crate::error::DatabaseError;
use crate::helpers::{get_datetime, get_enum, get_opt_string, get_u32, now, opt_text, ts};
use crate::service::SynapseService;
use crate::updates::observation::ObservationUpdate;

const SELECT_COLS: &str = "id, cycle_id, report_id, attribute_id, title, description, severity, \
     status, created_by, approved_by, created_at, updated_at";

const OWNER_ROLES: &[Role] = &[Role::ReportOwner, Role::ReportOwnerExecutive];
const TESTER_ROLES: &[Role] = &[Role::Tester, Role::TestExecutive];

/// Input for [`SynapseService::create_observation`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewObservation {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub severity: Severity,
    #[serde(default)]
    pub attribute_id: Option<String>,
}

fn row_to_observation(row: &libsql::Row) -> Result<Observation, DatabaseError> {
    Ok(Observation {
        id: row.get(0)?,
        cycle_id: row.get(1)?,
        report_id: row.get(2)?,
        attribute_id: get_opt_string(row, 3)?,
        title: row.get(4)?,
        description: get_opt_string(row, 5)?,
        severity: get_enum(row, 6)?,
        status: get_enum(row, 7)?,
        created_by: row.get(8)?,
        approved_by: get_opt_string(row, 9)?,
        created_at: get_datetime(row, 10)?,
        updated_at: get_datetime(row, 11)?,
    })
}

impl SynapseService {
    /// Record a draft observation. The report's observations phase must be
    /// running.
    ///
    /// # Errors
    ///
    /// `Validation` when the phase is not `in_progress` or the attribute
    /// belongs to another report.
    pub async fn create_observation(
        &self,
        actor: &Actor,
        cycle_id: &str,
        report_id: &str,
        new: &NewObservation,
    ) -> Result<Observation, DatabaseError> {
        if new.title.trim().is_empty() {
            return Err(DatabaseError::validation("observation title must not be empty"));
        }
        let tx = self.begin_write().await?;
        let result = tx.run(self.create_observation_tx(actor, cycle_id, report_id, new)).await;
        tx.finish(result).await
    }

    async fn create_observation_tx(
        &self,
        actor: &Actor,
        cycle_id: &str,
        report_id: &str,
        new: &NewObservation,
    ) -> Result<Observation, DatabaseError> {
        let phase = self
            .get_phase(cycle_id, report_id, PhaseName::Observations)
            .await?;
        if phase.status != PhaseStatus::InProgress {
            return Err(DatabaseError::validation(format!(
                "observations phase is {}; observations can only be recorded while it is in_progress",
                phase.status
            )));
        }
        if let Some(ref attribute_id) = new.attribute_id {
            let attribute = self.get_attribute(attribute_id).await?;
            if attribute.report_id != report_id {
                return Err(DatabaseError::validation(format!(
                    "attribute {attribute_id} belongs to report {}",
                    attribute.report_id
                )));
            }
        }

        let now = now();
        let id = self.db().generate_id(PREFIX_OBSERVATION).await?;
        self.db()
            .conn()
            .execute(
                &format!(
                    "INSERT INTO observations ({SELECT_COLS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10, ?11)"
                ),
                libsql::params![
                    id.as_str(),
                    cycle_id,
                    report_id,
                    opt_text(new.attribute_id.as_deref()),
                    new.title.trim(),
                    opt_text(new.description.as_deref()),
                    new.severity.as_str(),
                    ObservationStatus::Draft.as_str(),
                    actor.user_id.as_str(),
                    ts(now),
                    ts(now)
                ],
            )
            .await?;
        self.record(
            actor,
            EntityType::Observation,
            &id,
            AuditAction::Created,
            Some(serde_json::json!({ "severity": new.severity })),
        )
        .await?;
        self.get_observation(&id).await
    }

    /// # Errors
    ///
    /// `NotFound` if no observation has this ID.
    pub async fn get_observation(&self, id: &str) -> Result<Observation, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM observations WHERE id = ?1"),
                [id],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| DatabaseError::not_found(EntityType::Observation, id))?;
        row_to_observation(&row)
    }

    /// Observations of a cycle report, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_observations(
        &self,
        cycle_id: &str,
        report_id: &str,
        status: Option<ObservationStatus>,
    ) -> Result<Vec<Observation>, DatabaseError> {
        let mut params: Vec<libsql::Value> = vec![cycle_id.into(), report_id.into()];
        let mut sql = format!(
            "SELECT {SELECT_COLS} FROM observations WHERE cycle_id = ?1 AND report_id = ?2"
        );
        if let Some(status) = status {
            params.push(status.as_str().into());
            sql.push_str(" AND status = ?3");
        }
        sql.push_str(" ORDER BY created_at, rowid");

        let mut rows = self
            .db()
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_observation(&row)?);
        }
        Ok(out)
    }

    pub(crate) async fn count_observations(
        &self,
        cycle_id: &str,
        report_id: &str,
        statuses: &[ObservationStatus],
    ) -> Result<u32, DatabaseError> {
        let list: Vec<String> = statuses.iter().map(|s| format!("'{s}'")).collect();
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT COUNT(*) FROM observations
                     WHERE cycle_id = ?1 AND report_id = ?2 AND status IN ({})",
                    list.join(", ")
                ),
                [cycle_id, report_id],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        get_u32(&row, 0)
    }

    /// Edit a draft or rejected observation.
    ///
    /// # Errors
    ///
    /// `Validation` once the observation is submitted or approved.
    pub async fn update_observation(
        &self,
        actor: &Actor,
        id: &str,
        update: ObservationUpdate,
    ) -> Result<Observation, DatabaseError> {
        let tx = self.begin_write().await?;
        let result = tx.run(self.update_observation_tx(actor, id, update)).await;
        tx.finish(result).await
    }

    async fn update_observation_tx(
        &self,
        actor: &Actor,
        id: &str,
        update: ObservationUpdate,
    ) -> Result<Observation, DatabaseError> {
        let current = self.get_observation(id).await?;
        if update.is_empty() {
            return Ok(current);
        }
        if !matches!(
            current.status,
            ObservationStatus::Draft | ObservationStatus::Rejected
        ) {
            return Err(DatabaseError::validation(format!(
                "observation {id} is {} and can no longer be edited",
                current.status
            )));
        }

        let mut sets = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();
        if let Some(ref title) = update.title {
            if title.trim().is_empty() {
                return Err(DatabaseError::validation("observation title must not be empty"));
            }
            params.push(title.trim().into());
            sets.push(format!("title = ?{}", params.len()));
        }
        if let Some(ref description) = update.description {
            params.push(opt_text(description.as_deref()));
            sets.push(format!("description = ?{}", params.len()));
        }
        if let Some(severity) = update.severity {
            params.push(severity.as_str().into());
            sets.push(format!("severity = ?{}", params.len()));
        }
        params.push(ts(now()).into());
        sets.push(format!("updated_at = ?{}", params.len()));
        params.push(id.into());
        let sql = format!(
            "UPDATE observations SET {} WHERE id = ?{}",
            sets.join(", "),
            params.len()
        );
        self.db()
            .conn()
            .execute(&sql, libsql::params_from_iter(params))
            .await?;

        self.record(
            actor,
            EntityType::Observation,
            id,
            AuditAction::Updated,
            Some(serde_json::to_value(&update)?),
        )
        .await?;
        self.get_observation(id).await
    }

    /// Move an observation through review.
    ///
    /// Approving and rejecting need a report-owner role. Submitting, and
    /// returning a rejected observation to draft, need the creator or a
    /// tester role.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` for the wrong role, `InvalidTransition` for a
    /// disallowed move.
    pub async fn transition_observation(
        &self,
        actor: &Actor,
        id: &str,
        status: ObservationStatus,
        reason: Option<&str>,
    ) -> Result<Observation, DatabaseError> {
        let tx = self.begin_write().await?;
        let result = tx.run(self.transition_observation_tx(actor, id, status, reason)).await;
        tx.finish(result).await
    }

    async fn transition_observation_tx(
        &self,
        actor: &Actor,
        id: &str,
        status: ObservationStatus,
        reason: Option<&str>,
    ) -> Result<Observation, DatabaseError> {
        let current = self.get_observation(id).await?;
        let allowed = match status {
            ObservationStatus::Approved | ObservationStatus::Rejected => {
                actor.has_any_role(OWNER_ROLES)
            }
            ObservationStatus::Submitted | ObservationStatus::Draft => {
                current.created_by == actor.user_id || actor.has_any_role(TESTER_ROLES)
            }
        };
        if !allowed {
            let action = if status == ObservationStatus::Approved
                || status == ObservationStatus::Rejected
            {
                Action::Approve
            } else {
                Action::Update
            };
            return Err(DatabaseError::denied(actor.role, Resource::Observation, action));
        }
        if !current.status.can_transition_to(status) {
            return Err(
                CoreError::transition(EntityType::Observation, id, current.status, status).into(),
            );
        }

        let approved_by = if status == ObservationStatus::Approved {
            Some(actor.user_id.as_str())
        } else {
            None
        };
        self.db()
            .conn()
            .execute(
                "UPDATE observations SET status = ?1, approved_by = ?2, updated_at = ?3 WHERE id = ?4",
                libsql::params![status.as_str(), opt_text(approved_by), ts(now()), id],
            )
            .await?;

        let detail = StatusChangedDetail {
            from: current.status.as_str().to_string(),
            to: status.as_str().to_string(),
            reason: reason.map(String::from),
        };
        self.record(
            actor,
            EntityType::Observation,
            id,
            AuditAction::StatusChanged,
            Some(serde_json::to_value(&detail)?),
        )
        .await?;
        self.get_observation(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::helpers::{active_cycle_report, test_service, users};
    use crate::updates::observation::ObservationUpdateBuilder;
    use pretty_assertions::assert_eq;

    fn finding() -> NewObservation {
        NewObservation {
            title: "Balance mismatch".into(),
            description: None,
            severity: Severity::High,
            attribute_id: None,
        }
    }

    #[tokio::test]
    async fn requires_running_observations_phase() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let (cycle_id, report_id) = active_cycle_report(&svc, &u).await;
        assert!(
            svc.create_observation(&u.tester, &cycle_id, &report_id, &finding())
                .await
                .is_err()
        );
    }

    /// Forces the observations phase into `in_progress` so review rules can
    /// be tested without walking the six earlier phases.
    async fn open_observations_phase(svc: &SynapseService, cycle_id: &str, report_id: &str) {
        svc.db()
            .conn()
            .execute(
                "UPDATE workflow_phases SET status = 'in_progress', started_at = ?1
                 WHERE cycle_id = ?2 AND report_id = ?3 AND phase = 'observations'",
                libsql::params![ts(now()), cycle_id, report_id],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn review_flow_with_role_rules() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let (cycle_id, report_id) = active_cycle_report(&svc, &u).await;
        open_observations_phase(&svc, &cycle_id, &report_id).await;

        let obs = svc
            .create_observation(&u.tester, &cycle_id, &report_id, &finding())
            .await
            .unwrap();
        assert_eq!(obs.status, ObservationStatus::Draft);

        let edited = svc
            .update_observation(
                &u.tester,
                &obs.id,
                ObservationUpdateBuilder::new().severity(Severity::Critical).build(),
            )
            .await
            .unwrap();
        assert_eq!(edited.severity, Severity::Critical);

        let err = svc
            .transition_observation(&u.owner, &obs.id, ObservationStatus::Submitted, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Core(CoreError::PermissionDenied { .. })));
        svc.transition_observation(&u.tester, &obs.id, ObservationStatus::Submitted, None)
            .await
            .unwrap();
        assert!(
            svc.update_observation(&u.tester, &obs.id, ObservationUpdateBuilder::new().title("x").build())
                .await
                .is_err()
        );
        assert_eq!(
            svc.count_observations(&cycle_id, &report_id, &[ObservationStatus::Submitted])
                .await
                .unwrap(),
            1
        );

        let err = svc
            .transition_observation(&u.tester, &obs.id, ObservationStatus::Approved, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Core(CoreError::PermissionDenied { .. })));
        let approved = svc
            .transition_observation(&u.owner, &obs.id, ObservationStatus::Approved, None)
            .await
            .unwrap();
        assert_eq!(approved.approved_by.as_deref(), Some(u.owner.user_id.as_str()));
        assert_eq!(
            svc.list_observations(&cycle_id, &report_id, Some(ObservationStatus::Approved))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn rejected_can_return_to_draft() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let (cycle_id, report_id) = active_cycle_report(&svc, &u).await;
        open_observations_phase(&svc, &cycle_id, &report_id).await;
        let obs = svc
            .create_observation(&u.tester, &cycle_id, &report_id, &finding())
            .await
            .unwrap();
        svc.transition_observation(&u.tester, &obs.id, ObservationStatus::Submitted, None)
            .await
            .unwrap();
        svc.transition_observation(&u.owner_exec, &obs.id, ObservationStatus::Rejected, Some("no evidence"))
            .await
            .unwrap();
        let draft = svc
            .transition_observation(&u.tester, &obs.id, ObservationStatus::Draft, None)
            .await
            .unwrap();
        assert_eq!(draft.status, ObservationStatus::Draft);
        assert!(
            svc.transition_observation(&u.tester, &obs.id, ObservationStatus::Approved, None)
                .await
                .is_err()
        );
    }
}
