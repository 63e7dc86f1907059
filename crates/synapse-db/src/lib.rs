//! # synapse-db
//!
//! libSQL persistence for SynapseDTE.
//!
//! Holds users, the RBAC permission table, test cycles, reports and their
//! attributes, the per-report workflow phases and steps, universal
//! assignments, observations, SLA violations, and the audit trail.
//!
//! `SynapseDb` owns the raw connection and transactions. `SynapseService`
//! (in [`service`]) hosts every operation; each mutation runs inside one
//! transaction together with its audit entry.

pub mod error;
pub mod helpers;
mod migrations;
pub mod repos;
pub mod service;
pub mod updates;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;

use error::DatabaseError;
use libsql::Builder;

tokio::task_local! {
    /// Set while a task runs the body of a write transaction.
    static WRITE_SCOPE: ();
}

/// Central database handle.
///
/// Holds two connections to one database file in WAL mode. Write
/// transactions run on `writer`; everything else reads through `reader`
/// and therefore only ever sees committed rows. ID generation and explicit
/// transaction control live here too.
pub struct SynapseDb {
    #[allow(dead_code)]
    db: libsql::Database,
    writer: libsql::Connection,
    reader: libsql::Connection,
    /// Backing directory for `:memory:` databases, removed on drop.
    _scratch: Option<tempfile::TempDir>,
}

impl SynapseDb {
    /// Open a local database at `path`.
    ///
    /// `":memory:"` gives an ephemeral database backed by a temporary file,
    /// since both connections must see the same data.
    ///
    /// Runs migrations automatically on open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        let (file, scratch) = if path == ":memory:" {
            let dir = tempfile::tempdir()
                .map_err(|e| DatabaseError::Migration(format!("scratch directory: {e}")))?;
            (dir.path().join("synapse.db"), Some(dir))
        } else {
            (PathBuf::from(path), None)
        };

        let db = Builder::new_local(&file).build().await?;
        let writer = db.connect()?;
        configure(&writer).await?;
        pragma(&writer, "journal_mode = WAL").await?;

        let synapse_db = Self {
            reader: db.connect()?,
            db,
            writer,
            _scratch: scratch,
        };
        configure(&synapse_db.reader).await?;
        synapse_db.run_migrations().await?;
        tracing::debug!(path, "database opened");
        Ok(synapse_db)
    }

    /// The connection for the current task: the writer inside a write
    /// transaction, the reader everywhere else.
    #[must_use]
    pub fn conn(&self) -> &libsql::Connection {
        if in_write_scope() {
            &self.writer
        } else {
            &self.reader
        }
    }

    /// Generate a prefixed ID via libSQL. Returns e.g. `"cyc-a3f8b2c1"`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or returns no rows.
    pub async fn generate_id(&self, prefix: &str) -> Result<String, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT '{prefix}-' || lower(hex(randomblob(4)))"),
                (),
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        Ok(row.get::<String>(0)?)
    }

    /// Random hex string of `bytes * 2` characters, from `randomblob`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn random_hex(&self, bytes: u32) -> Result<String, DatabaseError> {
        let mut rows = self
            .conn()
            .query(&format!("SELECT lower(hex(randomblob({bytes})))"), ())
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        Ok(row.get::<String>(0)?)
    }

    /// Open a write transaction.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if a transaction is already open.
    pub async fn begin(&self) -> Result<(), DatabaseError> {
        self.writer.execute("BEGIN IMMEDIATE", ()).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `DatabaseError` if the commit fails.
    pub async fn commit(&self) -> Result<(), DatabaseError> {
        self.writer.execute("COMMIT", ()).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `DatabaseError` if the rollback fails.
    pub async fn rollback(&self) -> Result<(), DatabaseError> {
        self.writer.execute("ROLLBACK", ()).await?;
        Ok(())
    }
}

/// Run `work` with [`SynapseDb::conn`] resolving to the writer.
pub(crate) async fn write_scope<F: Future>(work: F) -> F::Output {
    WRITE_SCOPE.scope((), work).await
}

fn in_write_scope() -> bool {
    WRITE_SCOPE.try_with(|()| ()).is_ok()
}

async fn configure(conn: &libsql::Connection) -> Result<(), DatabaseError> {
    // Per-connection in SQLite
    conn.execute("PRAGMA foreign_keys = ON", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("PRAGMA foreign_keys: {e}")))?;
    pragma(conn, "busy_timeout = 5000").await
}

/// Run a PRAGMA that answers with a row.
async fn pragma(conn: &libsql::Connection, setting: &str) -> Result<(), DatabaseError> {
    let step = async {
        let mut rows = conn.query(&format!("PRAGMA {setting}"), ()).await?;
        rows.next().await?;
        Ok::<_, libsql::Error>(())
    };
    step.await
        .map_err(|e| DatabaseError::Migration(format!("PRAGMA {setting}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    async fn test_db() -> SynapseDb {
        SynapseDb::open_local(":memory:").await.unwrap()
    }

    async fn count(db: &SynapseDb, sql: &str) -> i64 {
        let mut rows = db.conn().query(sql, ()).await.unwrap();
        rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap()
    }

    #[tokio::test]
    async fn open_local_creates_schema() {
        let db = test_db().await;
        let tables = [
            "users",
            "role_permissions",
            "test_cycles",
            "reports",
            "cycle_reports",
            "report_attributes",
            "workflow_phases",
            "phase_steps",
            "assignments",
            "observations",
            "sla_violations",
            "audit_trail",
        ];
        for table in &tables {
            let mut rows = db
                .conn()
                .query(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                    [*table],
                )
                .await
                .unwrap();
            let row = rows.next().await.unwrap();
            assert!(row.is_some(), "table '{table}' should exist");
        }
    }

    #[tokio::test]
    async fn generate_id_correct_format() {
        let db = test_db().await;
        let id = db.generate_id("cyc").await.unwrap();
        assert!(synapse_core::ids::has_prefix(&id, "cyc"), "bad id: {id}");
    }

    #[tokio::test]
    async fn generate_id_all_prefixes() {
        let db = test_db().await;
        for prefix in synapse_core::ids::ALL_PREFIXES {
            let id = db.generate_id(prefix).await.unwrap();
            assert!(id.starts_with(&format!("{prefix}-")));
        }
    }

    #[tokio::test]
    async fn generate_id_uniqueness() {
        let db = test_db().await;
        let mut ids = HashSet::new();
        for _ in 0..100 {
            let id = db.generate_id("tst").await.unwrap();
            assert!(ids.insert(id.clone()), "Duplicate ID generated: {id}");
        }
    }

    #[tokio::test]
    async fn idempotent_migrations() {
        let db = test_db().await;
        db.run_migrations().await.unwrap();
    }

    const INSERT_GRANT: &str =
        "INSERT INTO role_permissions (resource, action, role) VALUES ('sla', 'read', 'tester')";

    #[tokio::test]
    async fn rollback_discards_writes() {
        let db = test_db().await;
        db.begin().await.unwrap();
        write_scope(db.conn().execute(INSERT_GRANT, ())).await.unwrap();
        db.rollback().await.unwrap();
        assert_eq!(count(&db, "SELECT COUNT(*) FROM role_permissions").await, 0);

        db.begin().await.unwrap();
        write_scope(db.conn().execute(INSERT_GRANT, ())).await.unwrap();
        db.commit().await.unwrap();
        assert_eq!(count(&db, "SELECT COUNT(*) FROM role_permissions").await, 1);
    }

    #[tokio::test]
    async fn reads_outside_write_scope_see_only_committed_rows() {
        let db = test_db().await;
        db.begin().await.unwrap();
        write_scope(db.conn().execute(INSERT_GRANT, ())).await.unwrap();

        let inside = write_scope(count(&db, "SELECT COUNT(*) FROM role_permissions")).await;
        assert_eq!(inside, 1);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM role_permissions").await, 0);

        db.rollback().await.unwrap();
        assert_eq!(count(&db, "SELECT COUNT(*) FROM role_permissions").await, 0);
    }

    #[tokio::test]
    async fn file_database_reopens_with_committed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synapse.db");
        let path = path.to_str().unwrap();
        {
            let db = SynapseDb::open_local(path).await.unwrap();
            db.begin().await.unwrap();
            write_scope(db.conn().execute(INSERT_GRANT, ())).await.unwrap();
            db.commit().await.unwrap();
        }
        let db = SynapseDb::open_local(path).await.unwrap();
        assert_eq!(count(&db, "SELECT COUNT(*) FROM role_permissions").await, 1);
    }

    #[tokio::test]
    async fn one_open_violation_per_target() {
        let db = test_db().await;
        let insert = "INSERT INTO sla_violations
            (id, target, target_id, threshold_hours, elapsed_hours, detected_at, resolved_at)
            VALUES (?1, 'phase', 'phs-1', 1.0, 2.0, '2026-01-01T00:00:00.000000Z', ?2)";
        db.conn()
            .execute(insert, libsql::params!["sla-1", libsql::Value::Null])
            .await
            .unwrap();
        assert!(
            db.conn()
                .execute(insert, libsql::params!["sla-2", libsql::Value::Null])
                .await
                .is_err()
        );
        db.conn()
            .execute(insert, libsql::params!["sla-3", "2026-01-02T00:00:00.000000Z"])
            .await
            .unwrap();
    }
}
