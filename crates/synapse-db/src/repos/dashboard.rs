//! Cycle-level aggregates for dashboards.

use synapse_core::enums::PhaseStatus;
use synapse_core::responses::{CycleSummary, PhaseCounts};

use crate::error::DatabaseError;
use crate::helpers::{get_enum, get_u32};
use crate::service::SynapseService;

impl SynapseService {
    async fn count_where(&self, sql: &str, cycle_id: &str) -> Result<u32, DatabaseError> {
        let mut rows = self.db().conn().query(sql, [cycle_id]).await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        get_u32(&row, 0)
    }

    /// Phase counts by status, open assignments, open SLA violations and
    /// unapproved observations for one cycle.
    ///
    /// # Errors
    ///
    /// `NotFound` if the cycle does not exist.
    pub async fn cycle_summary(&self, cycle_id: &str) -> Result<CycleSummary, DatabaseError> {
        let cycle = self.get_cycle(cycle_id).await?;

        let mut phases = PhaseCounts::default();
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT status, COUNT(*) FROM workflow_phases WHERE cycle_id = ?1 GROUP BY status",
                [cycle_id],
            )
            .await?;
        while let Some(row) = rows.next().await? {
            let count = get_u32(&row, 1)?;
            match get_enum::<PhaseStatus>(&row, 0)? {
                PhaseStatus::NotStarted => phases.not_started = count,
                PhaseStatus::InProgress => phases.in_progress = count,
                PhaseStatus::OnHold => phases.on_hold = count,
                PhaseStatus::Complete => phases.complete = count,
            }
        }

        Ok(CycleSummary {
            reports: self
                .count_where("SELECT COUNT(*) FROM cycle_reports WHERE cycle_id = ?1", cycle_id)
                .await?,
            phases,
            open_assignments: self
                .count_where(
                    "SELECT COUNT(*) FROM assignments WHERE cycle_id = ?1
                       AND status IN ('assigned', 'acknowledged', 'in_progress')",
                    cycle_id,
                )
                .await?,
            open_violations: self
                .count_where(
                    "SELECT COUNT(*) FROM sla_violations WHERE cycle_id = ?1 AND resolved_at IS NULL",
                    cycle_id,
                )
                .await?,
            open_observations: self
                .count_where(
                    "SELECT COUNT(*) FROM observations WHERE cycle_id = ?1 AND status != 'approved'",
                    cycle_id,
                )
                .await?,
            cycle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::attribute::NewAttribute;
    use crate::test_support::helpers::{active_cycle_report, test_service, users};
    use pretty_assertions::assert_eq;
    use synapse_core::enums::PhaseName;

    #[tokio::test]
    async fn summary_counts_phases_and_assignments() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let (cycle_id, report_id) = active_cycle_report(&svc, &u).await;
        svc.add_attribute(&u.tester, &report_id, &NewAttribute { name: "acct".into(), ..Default::default() })
            .await
            .unwrap();
        svc.start_phase(&u.tester, &cycle_id, &report_id, PhaseName::Planning)
            .await
            .unwrap();
        svc.complete_step(&u.tester, &cycle_id, &report_id, PhaseName::Planning, "define_attributes", None)
            .await
            .unwrap();

        let summary = svc.cycle_summary(&cycle_id).await.unwrap();
        assert_eq!(summary.reports, 1);
        assert_eq!(
            summary.phases,
            PhaseCounts { not_started: 7, in_progress: 1, on_hold: 0, complete: 0 }
        );
        assert_eq!(summary.open_assignments, 1);
        assert_eq!(summary.open_violations, 0);
        assert_eq!(summary.open_observations, 0);
    }
}
