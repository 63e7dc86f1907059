//! RBAC permission repository.
//!
//! The `role_permissions` table is the runtime source of truth. The service
//! keeps an in-memory copy so every check is a single dictionary lookup; grant
//! and revoke update both.

use synapse_core::audit_detail::PermissionDetail;
use synapse_core::entities::PermissionGrant;
use synapse_core::enums::{Action, AuditAction, EntityType, Resource, Role};
use synapse_core::errors::CoreError;
use synapse_core::identity::Actor;
use synapse_core::rbac::PermissionMatrix;

use crate::error::DatabaseError;
use crate::helpers::get_enum;
use crate::service::SynapseService;

fn grant_key(grant: &PermissionGrant) -> String {
    format!("{}:{}:{}", grant.resource, grant.action, grant.role)
}

impl SynapseService {
    /// Read every grant from the database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or holds unknown values.
    pub async fn list_permissions(&self) -> Result<Vec<PermissionGrant>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT resource, action, role FROM role_permissions ORDER BY resource, action, role",
                (),
            )
            .await?;
        let mut grants = Vec::new();
        while let Some(row) = rows.next().await? {
            grants.push(PermissionGrant {
                resource: get_enum(&row, 0)?,
                action: get_enum(&row, 1)?,
                role: get_enum(&row, 2)?,
            });
        }
        Ok(grants)
    }

    /// Build the permission matrix from the database.
    ///
    /// # Errors
    ///
    /// See [`Self::list_permissions`].
    pub async fn load_permissions(&self) -> Result<PermissionMatrix, DatabaseError> {
        Ok(self.list_permissions().await?.into_iter().collect())
    }

    /// Refresh the cached matrix from the database.
    ///
    /// # Errors
    ///
    /// See [`Self::list_permissions`].
    pub async fn reload_permissions(&self) -> Result<(), DatabaseError> {
        let matrix = self.load_permissions().await?;
        *self.permissions().write().await = matrix;
        Ok(())
    }

    /// Whether the permission table has any rows.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn permissions_seeded(&self) -> Result<bool, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query("SELECT COUNT(*) FROM role_permissions", ())
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        Ok(row.get::<i64>(0)? > 0)
    }

    /// Insert every grant of `matrix` that is not already present.
    ///
    /// Returns the number of rows inserted; a second run inserts nothing.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if an INSERT fails.
    pub async fn seed_permissions(
        &self,
        actor: &Actor,
        matrix: &PermissionMatrix,
    ) -> Result<u32, DatabaseError> {
        let tx = self.begin_write().await?;
        let result = tx.run(self.seed_permissions_tx(actor, matrix)).await;
        let (inserted, _guard) = tx.finish_held(result).await?;
        self.reload_permissions().await?;
        if inserted > 0 {
            tracing::info!(inserted, "permission matrix seeded");
        }
        Ok(inserted)
    }

    async fn seed_permissions_tx(
        &self,
        actor: &Actor,
        matrix: &PermissionMatrix,
    ) -> Result<u32, DatabaseError> {
        let mut inserted = 0u32;
        for grant in matrix.grants() {
            if self.insert_grant(&grant).await? {
                inserted += 1;
                self.record_grant(actor, &grant, AuditAction::PermissionGranted)
                    .await?;
            }
        }
        Ok(inserted)
    }

    /// Single dictionary lookup against the cached matrix. Admin always passes.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` when the actor's role is not granted.
    pub async fn check_permission(
        &self,
        actor: &Actor,
        resource: Resource,
        action: Action,
    ) -> Result<(), DatabaseError> {
        if self.permissions().read().await.allows(actor.role, resource, action) {
            Ok(())
        } else {
            tracing::debug!(user_id = %actor.user_id, role = %actor.role, %resource, %action, "permission denied");
            Err(CoreError::PermissionDenied {
                role: actor.role,
                resource,
                action,
            }
            .into())
        }
    }

    /// Grant `role` the right to `action` on `resource`.
    ///
    /// Returns `false` if the grant already existed.
    ///
    /// # Errors
    ///
    /// `Validation` when granting to admin, which is always allowed.
    pub async fn grant_permission(
        &self,
        actor: &Actor,
        grant: PermissionGrant,
    ) -> Result<bool, DatabaseError> {
        reject_admin_grant(&grant)?;
        let tx = self.begin_write().await?;
        let result: Result<bool, DatabaseError> = tx
            .run(async {
                let added = self.insert_grant(&grant).await?;
                if added {
                    self.record_grant(actor, &grant, AuditAction::PermissionGranted)
                        .await?;
                }
                Ok(added)
            })
            .await;
        let (added, _guard) = tx.finish_held(result).await?;
        if added {
            self.permissions()
                .write()
                .await
                .grant(grant.resource, grant.action, grant.role);
        }
        Ok(added)
    }

    /// Revoke a grant. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// `Validation` when revoking from admin.
    pub async fn revoke_permission(
        &self,
        actor: &Actor,
        grant: PermissionGrant,
    ) -> Result<bool, DatabaseError> {
        reject_admin_grant(&grant)?;
        let tx = self.begin_write().await?;
        let result: Result<bool, DatabaseError> = tx
            .run(async {
                let removed = self
                    .db()
                    .conn()
                    .execute(
                        "DELETE FROM role_permissions WHERE resource = ?1 AND action = ?2 AND role = ?3",
                        libsql::params![
                            grant.resource.as_str(),
                            grant.action.as_str(),
                            grant.role.as_str()
                        ],
                    )
                    .await?
                    > 0;
                if removed {
                    self.record_grant(actor, &grant, AuditAction::PermissionRevoked)
                        .await?;
                }
                Ok(removed)
            })
            .await;
        let (removed, _guard) = tx.finish_held(result).await?;
        if removed {
            self.permissions()
                .write()
                .await
                .revoke(grant.resource, grant.action, grant.role);
        }
        Ok(removed)
    }

    async fn insert_grant(&self, grant: &PermissionGrant) -> Result<bool, DatabaseError> {
        let changed = self
            .db()
            .conn()
            .execute(
                "INSERT OR IGNORE INTO role_permissions (resource, action, role) VALUES (?1, ?2, ?3)",
                libsql::params![
                    grant.resource.as_str(),
                    grant.action.as_str(),
                    grant.role.as_str()
                ],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn record_grant(
        &self,
        actor: &Actor,
        grant: &PermissionGrant,
        action: AuditAction,
    ) -> Result<(), DatabaseError> {
        let detail = PermissionDetail {
            resource: grant.resource,
            action: grant.action,
            role: grant.role,
        };
        self.record(
            actor,
            EntityType::Permission,
            &grant_key(grant),
            action,
            Some(serde_json::to_value(&detail)?),
        )
        .await
    }
}

fn reject_admin_grant(grant: &PermissionGrant) -> Result<(), DatabaseError> {
    if grant.role == Role::Admin {
        return Err(DatabaseError::validation(
            "admin holds every permission implicitly",
        ));
    }
    Ok(())
}
