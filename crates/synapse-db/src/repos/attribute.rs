//! Report attribute repository.
//!
//! CDE and primary-key attributes are mandatory: they can be scoped in but
//! never out.

use serde::Deserialize;

use synapse_core::entities::ReportAttribute;
use synapse_core::enums::{AuditAction, EntityType};
use synapse_core::identity::Actor;
use synapse_core::ids::PREFIX_ATTRIBUTE;

use crate::error::DatabaseError;
use crate::helpers::{
    get_bool, get_datetime, get_opt_bool, get_opt_string, get_u32, now, opt_text, ts,
};
use crate::service::SynapseService;

const SELECT_COLS: &str = "id, report_id, name, description, is_cde, is_primary_key, scoping, \
     created_at, updated_at";

/// Input for [`SynapseService::add_attribute`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAttribute {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_cde: bool,
    #[serde(default)]
    pub is_primary_key: bool,
}

fn row_to_attribute(row: &libsql::Row) -> Result<ReportAttribute, DatabaseError> {
    Ok(ReportAttribute {
        id: row.get(0)?,
        report_id: row.get(1)?,
        name: row.get(2)?,
        description: get_opt_string(row, 3)?,
        is_cde: get_bool(row, 4)?,
        is_primary_key: get_bool(row, 5)?,
        scoping: get_opt_bool(row, 6)?,
        created_at: get_datetime(row, 7)?,
        updated_at: get_datetime(row, 8)?,
    })
}

impl SynapseService {
    /// # Errors
    ///
    /// `NotFound` for an unknown report, `Validation` for an empty or
    /// duplicate name.
    pub async fn add_attribute(
        &self,
        actor: &Actor,
        report_id: &str,
        new: &NewAttribute,
    ) -> Result<ReportAttribute, DatabaseError> {
        if new.name.trim().is_empty() {
            return Err(DatabaseError::validation("attribute name must not be empty"));
        }
        let tx = self.begin_write().await?;
        let result = tx.run(self.add_attribute_tx(actor, report_id, new)).await;
        tx.finish(result).await
    }

    async fn add_attribute_tx(
        &self,
        actor: &Actor,
        report_id: &str,
        new: &NewAttribute,
    ) -> Result<ReportAttribute, DatabaseError> {
        self.get_report(report_id).await?;
        let name = new.name.trim();
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT 1 FROM report_attributes WHERE report_id = ?1 AND name = ?2",
                [report_id, name],
            )
            .await?;
        if rows.next().await?.is_some() {
            return Err(DatabaseError::validation(format!(
                "report {report_id} already has an attribute named '{name}'"
            )));
        }

        let now = now();
        let id = self.db().generate_id(PREFIX_ATTRIBUTE).await?;
        self.db()
            .conn()
            .execute(
                &format!(
                    "INSERT INTO report_attributes ({SELECT_COLS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8)"
                ),
                libsql::params![
                    id.as_str(),
                    report_id,
                    name,
                    opt_text(new.description.as_deref()),
                    i64::from(new.is_cde),
                    i64::from(new.is_primary_key),
                    ts(now),
                    ts(now)
                ],
            )
            .await?;
        self.record(
            actor,
            EntityType::Attribute,
            &id,
            AuditAction::Created,
            Some(serde_json::json!({
                "report_id": report_id,
                "is_cde": new.is_cde,
                "is_primary_key": new.is_primary_key,
            })),
        )
        .await?;
        self.get_attribute(&id).await
    }

    /// # Errors
    ///
    /// `NotFound` if no attribute has this ID.
    pub async fn get_attribute(&self, id: &str) -> Result<ReportAttribute, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM report_attributes WHERE id = ?1"),
                [id],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| DatabaseError::not_found(EntityType::Attribute, id))?;
        row_to_attribute(&row)
    }

    /// # Errors
    ///
    /// `NotFound` for an unknown report.
    pub async fn list_attributes(
        &self,
        report_id: &str,
    ) -> Result<Vec<ReportAttribute>, DatabaseError> {
        self.get_report(report_id).await?;
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!(
                    "SELECT {SELECT_COLS} FROM report_attributes WHERE report_id = ?1
                     ORDER BY created_at, name"
                ),
                [report_id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_attribute(&row)?);
        }
        Ok(out)
    }

    /// Mark an attribute in or out of scope.
    ///
    /// # Errors
    ///
    /// `Validation` when scoping out a CDE or primary-key attribute.
    pub async fn set_attribute_scoping(
        &self,
        actor: &Actor,
        id: &str,
        in_scope: bool,
    ) -> Result<ReportAttribute, DatabaseError> {
        let tx = self.begin_write().await?;
        let result = tx.run(self.set_attribute_scoping_tx(actor, id, in_scope)).await;
        tx.finish(result).await
    }

    async fn set_attribute_scoping_tx(
        &self,
        actor: &Actor,
        id: &str,
        in_scope: bool,
    ) -> Result<ReportAttribute, DatabaseError> {
        let current = self.get_attribute(id).await?;
        if !in_scope && current.is_mandatory() {
            return Err(DatabaseError::validation(format!(
                "attribute '{}' is a CDE or primary key and must stay in scope",
                current.name
            )));
        }
        if current.scoping == Some(in_scope) {
            return Ok(current);
        }

        self.db()
            .conn()
            .execute(
                "UPDATE report_attributes SET scoping = ?1, updated_at = ?2 WHERE id = ?3",
                libsql::params![i64::from(in_scope), ts(now()), id],
            )
            .await?;
        self.record(
            actor,
            EntityType::Attribute,
            id,
            AuditAction::Updated,
            Some(serde_json::json!({ "scoping": in_scope })),
        )
        .await?;
        self.get_attribute(id).await
    }

    /// Attribute counts for a report: `(total, undecided)`.
    pub(crate) async fn attribute_counts(
        &self,
        report_id: &str,
    ) -> Result<(u32, u32), DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN scoping IS NULL THEN 1 ELSE 0 END), 0)
                 FROM report_attributes WHERE report_id = ?1",
                [report_id],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        Ok((get_u32(&row, 0)?, get_u32(&row, 1)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::report::NewReport;
    use crate::test_support::helpers::{test_service, users};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn mandatory_attributes_cannot_be_scoped_out() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let report = svc
            .create_report(&u.executive, &NewReport { name: "R".into(), ..Default::default() })
            .await
            .unwrap();
        let cde = svc
            .add_attribute(
                &u.tester,
                &report.id,
                &NewAttribute { name: "balance".into(), is_cde: true, ..Default::default() },
            )
            .await
            .unwrap();
        let plain = svc
            .add_attribute(
                &u.tester,
                &report.id,
                &NewAttribute { name: "memo".into(), ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(svc.attribute_counts(&report.id).await.unwrap(), (2, 2));

        assert!(svc.set_attribute_scoping(&u.tester, &cde.id, false).await.is_err());
        let cde = svc.set_attribute_scoping(&u.tester, &cde.id, true).await.unwrap();
        assert_eq!(cde.scoping, Some(true));
        let plain = svc.set_attribute_scoping(&u.tester, &plain.id, false).await.unwrap();
        assert_eq!(plain.scoping, Some(false));
        assert_eq!(svc.attribute_counts(&report.id).await.unwrap(), (2, 0));
    }

    #[tokio::test]
    async fn duplicate_name_in_report_rejected() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let report = svc
            .create_report(&u.executive, &NewReport { name: "R".into(), ..Default::default() })
            .await
            .unwrap();
        let new = NewAttribute { name: "acct_id".into(), is_primary_key: true, ..Default::default() };
        svc.add_attribute(&u.tester, &report.id, &new).await.unwrap();
        assert!(svc.add_attribute(&u.tester, &report.id, &new).await.is_err());
        assert_eq!(svc.list_attributes(&report.id).await.unwrap().len(), 1);
    }
}
