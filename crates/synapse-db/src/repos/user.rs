//! User repository: accounts, roles, and bearer tokens.
//!
//! Tokens are random, shown once, and stored only as a SHA-256 digest.

use sha2::{Digest, Sha256};

use synapse_core::audit_detail::StatusChangedDetail;
use synapse_core::entities::User;
use synapse_core::enums::{AuditAction, EntityType, Role};
use synapse_core::identity::Actor;
use synapse_core::ids::PREFIX_USER;
use synapse_core::responses::UserCreated;

use crate::error::DatabaseError;
use crate::helpers::{get_bool, get_datetime, get_enum, now, ts};
use crate::service::SynapseService;

const SELECT_COLS: &str = "id, email, display_name, role, is_active, created_at, updated_at";

/// Prefix on every issued API token.
pub const TOKEN_PREFIX: &str = "syn_";

fn row_to_user(row: &libsql::Row) -> Result<User, DatabaseError> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        role: get_enum(row, 3)?,
        is_active: get_bool(row, 4)?,
        created_at: get_datetime(row, 5)?,
        updated_at: get_datetime(row, 6)?,
    })
}

/// Hex SHA-256 digest of a token.
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn validate_user_input(email: &str, display_name: &str) -> Result<(), DatabaseError> {
    let email = email.trim();
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(DatabaseError::validation(format!("invalid email '{email}'")));
    }
    if display_name.trim().is_empty() {
        return Err(DatabaseError::validation("display name must not be empty"));
    }
    Ok(())
}

impl SynapseService {
    async fn issue_token(&self) -> Result<(String, String), DatabaseError> {
        let token = format!("{TOKEN_PREFIX}{}", self.db().random_hex(20).await?);
        let hash = hash_token(&token);
        Ok((token, hash))
    }

    /// Create a user and issue its first API token.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed email, empty name, or duplicate email.
    pub async fn create_user(
        &self,
        actor: &Actor,
        email: &str,
        display_name: &str,
        role: Role,
    ) -> Result<UserCreated, DatabaseError> {
        validate_user_input(email, display_name)?;
        let tx = self.begin_write().await?;
        let result = tx.run(self.create_user_tx(actor, email, display_name, role)).await;
        tx.finish(result).await
    }

    async fn create_user_tx(
        &self,
        actor: &Actor,
        email: &str,
        display_name: &str,
        role: Role,
    ) -> Result<UserCreated, DatabaseError> {
        let email = email.trim().to_lowercase();
        if self.find_user_by_email(&email).await?.is_some() {
            return Err(DatabaseError::validation(format!(
                "a user with email '{email}' already exists"
            )));
        }

        let now = now();
        let id = self.db().generate_id(PREFIX_USER).await?;
        let (token, hash) = self.issue_token().await?;

        self.db()
            .conn()
            .execute(
                "INSERT INTO users (id, email, display_name, role, is_active, token_hash, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?7)",
                libsql::params![
                    id.as_str(),
                    email.as_str(),
                    display_name.trim(),
                    role.as_str(),
                    hash,
                    ts(now),
                    ts(now)
                ],
            )
            .await?;

        let user = User {
            id: id.clone(),
            email,
            display_name: display_name.trim().to_string(),
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.record(
            actor,
            EntityType::User,
            &id,
            AuditAction::Created,
            Some(serde_json::json!({ "email": user.email, "role": role })),
        )
        .await?;

        tracing::info!(user_id = %id, %role, "user created");
        Ok(UserCreated {
            user,
            api_token: token,
        })
    }

    /// # Errors
    ///
    /// `NotFound` if no user has this ID.
    pub async fn get_user(&self, id: &str) -> Result<User, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(&format!("SELECT {SELECT_COLS} FROM users WHERE id = ?1"), [id])
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| DatabaseError::not_found(EntityType::User, id))?;
        row_to_user(&row)
    }

    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM users WHERE email = ?1"),
                [email.trim().to_lowercase()],
            )
            .await?;
        rows.next().await?.map(|row| row_to_user(&row)).transpose()
    }

    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_users(
        &self,
        role: Option<Role>,
        limit: u32,
    ) -> Result<Vec<User>, DatabaseError> {
        let mut rows = match role {
            Some(role) => {
                self.db()
                    .conn()
                    .query(
                        &format!(
                            "SELECT {SELECT_COLS} FROM users WHERE role = ?1 ORDER BY email LIMIT {limit}"
                        ),
                        [role.as_str()],
                    )
                    .await?
            }
            None => {
                self.db()
                    .conn()
                    .query(
                        &format!("SELECT {SELECT_COLS} FROM users ORDER BY email LIMIT {limit}"),
                        (),
                    )
                    .await?
            }
        };
        let mut users = Vec::new();
        while let Some(row) = rows.next().await? {
            users.push(row_to_user(&row)?);
        }
        Ok(users)
    }

    /// Resolve a bearer token to its active user.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` for an unknown token or an inactive user.
    pub async fn authenticate(&self, token: &str) -> Result<User, DatabaseError> {
        let token = token.trim();
        if !token.starts_with(TOKEN_PREFIX) {
            return Err(DatabaseError::Unauthenticated("malformed token".into()));
        }
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM users WHERE token_hash = ?1"),
                [hash_token(token)],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Err(DatabaseError::Unauthenticated("unknown token".into()));
        };
        let user = row_to_user(&row)?;
        if !user.is_active {
            return Err(DatabaseError::Unauthenticated(format!(
                "user {} is deactivated",
                user.id
            )));
        }
        Ok(user)
    }

    /// Activate or deactivate a user.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown user; `Validation` when an actor deactivates
    /// itself.
    pub async fn set_user_active(
        &self,
        actor: &Actor,
        id: &str,
        active: bool,
    ) -> Result<User, DatabaseError> {
        if !active && actor.user_id == id {
            return Err(DatabaseError::validation("users cannot deactivate themselves"));
        }
        let tx = self.begin_write().await?;
        let result = tx.run(self.set_user_active_tx(actor, id, active)).await;
        tx.finish(result).await
    }

    async fn set_user_active_tx(
        &self,
        actor: &Actor,
        id: &str,
        active: bool,
    ) -> Result<User, DatabaseError> {
        let current = self.get_user(id).await?;
        if current.is_active == active {
            return Ok(current);
        }
        let now = now();
        self.db()
            .conn()
            .execute(
                "UPDATE users SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
                libsql::params![i64::from(active), ts(now), id],
            )
            .await?;

        let label = |a: bool| if a { "active" } else { "inactive" };
        let detail = StatusChangedDetail {
            from: label(current.is_active).to_string(),
            to: label(active).to_string(),
            reason: None,
        };
        self.record(
            actor,
            EntityType::User,
            id,
            AuditAction::StatusChanged,
            Some(serde_json::to_value(&detail)?),
        )
        .await?;
        self.get_user(id).await
    }

    /// Replace a user's token. The old token stops working immediately.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown user.
    pub async fn rotate_token(&self, actor: &Actor, id: &str) -> Result<UserCreated, DatabaseError> {
        let tx = self.begin_write().await?;
        let result = tx.run(self.rotate_token_tx(actor, id)).await;
        tx.finish(result).await
    }

    async fn rotate_token_tx(&self, actor: &Actor, id: &str) -> Result<UserCreated, DatabaseError> {
        self.get_user(id).await?;
        let (token, hash) = self.issue_token().await?;
        self.db()
            .conn()
            .execute(
                "UPDATE users SET token_hash = ?1, updated_at = ?2 WHERE id = ?3",
                libsql::params![hash, ts(now()), id],
            )
            .await?;
        self.record(actor, EntityType::User, id, AuditAction::TokenRotated, None)
            .await?;
        Ok(UserCreated {
            user: self.get_user(id).await?,
            api_token: token,
        })
    }

    /// Load a user and check that it is active and holds one of `roles`.
    pub(crate) async fn require_user_with_role(
        &self,
        id: &str,
        roles: &[Role],
    ) -> Result<User, DatabaseError> {
        let user = self.get_user(id).await?;
        if !user.is_active {
            return Err(DatabaseError::validation(format!("user {id} is deactivated")));
        }
        if !roles.contains(&user.role) {
            let names: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
            return Err(DatabaseError::validation(format!(
                "user {id} has role {}, expected one of: {}",
                user.role,
                names.join(", ")
            )));
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::helpers::test_service;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn create_and_authenticate() {
        let svc = test_service().await;
        let created = svc
            .create_user(&Actor::system(), "Tess@Example.com", "Tess Ter", Role::Tester)
            .await
            .unwrap();
        assert!(created.api_token.starts_with(TOKEN_PREFIX));
        assert_eq!(created.user.email, "tess@example.com");

        let user = svc.authenticate(&created.api_token).await.unwrap();
        assert_eq!(user, created.user);
        assert_eq!(svc.get_user(&user.id).await.unwrap(), created.user);
    }

    #[tokio::test]
    async fn token_is_stored_hashed() {
        let svc = test_service().await;
        let created = svc
            .create_user(&Actor::system(), "a@example.com", "A", Role::Admin)
            .await
            .unwrap();
        let mut rows = svc
            .db()
            .conn()
            .query("SELECT token_hash FROM users WHERE id = ?1", [created.user.id.as_str()])
            .await
            .unwrap();
        let stored: String = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_ne!(stored, created.api_token);
        assert_eq!(stored, hash_token(&created.api_token));
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let svc = test_service().await;
        svc.create_user(&Actor::system(), "dup@example.com", "One", Role::Tester)
            .await
            .unwrap();
        let err = svc
            .create_user(&Actor::system(), "DUP@example.com", "Two", Role::Tester)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Core(_)));
        assert_eq!(svc.list_users(None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_email_rejected() {
        let svc = test_service().await;
        assert!(
            svc.create_user(&Actor::system(), "not-an-email", "X", Role::Tester)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn deactivated_user_cannot_authenticate() {
        let svc = test_service().await;
        let created = svc
            .create_user(&Actor::system(), "gone@example.com", "Gone", Role::DataOwner)
            .await
            .unwrap();
        svc.set_user_active(&Actor::system(), &created.user.id, false)
            .await
            .unwrap();
        assert!(matches!(
            svc.authenticate(&created.api_token).await,
            Err(DatabaseError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn rotate_invalidates_old_token() {
        let svc = test_service().await;
        let created = svc
            .create_user(&Actor::system(), "rot@example.com", "Rot", Role::Tester)
            .await
            .unwrap();
        let rotated = svc.rotate_token(&Actor::system(), &created.user.id).await.unwrap();
        assert!(svc.authenticate(&created.api_token).await.is_err());
        assert_eq!(
            svc.authenticate(&rotated.api_token).await.unwrap().id,
            created.user.id
        );
    }

    #[tokio::test]
    async fn list_filters_by_role() {
        let svc = test_service().await;
        let sys = Actor::system();
        svc.create_user(&sys, "t1@example.com", "T1", Role::Tester).await.unwrap();
        svc.create_user(&sys, "t2@example.com", "T2", Role::Tester).await.unwrap();
        svc.create_user(&sys, "o@example.com", "O", Role::ReportOwner).await.unwrap();
        assert_eq!(svc.list_users(Some(Role::Tester), 10).await.unwrap().len(), 2);
        assert_eq!(svc.list_users(None, 2).await.unwrap().len(), 2);
    }
}
