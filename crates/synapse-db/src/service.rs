//! Service layer orchestrating database mutations with audit.
//!
//! `SynapseService` wraps `SynapseDb` (raw database access) together with a
//! write lock and the cached RBAC matrix. All repo methods are implemented as
//! `impl SynapseService` blocks in [`crate::repos`].

use tokio::sync::{Mutex, MutexGuard, RwLock};

use synapse_core::rbac::PermissionMatrix;

use crate::SynapseDb;
use crate::error::DatabaseError;

/// Orchestrates database mutations with an audit trail.
///
/// Every mutation method follows this protocol:
/// 1. Acquire the write lock
/// 2. Begin transaction
/// 3. Execute SQL
/// 4. Append audit entry (inside transaction)
/// 5. Commit, or roll back if any step failed
///
/// The lock serializes writers on the database's write connection. Reads
/// outside a transaction go through the read connection and never see
/// uncommitted rows.
pub struct SynapseService {
    db: SynapseDb,
    write_lock: Mutex<()>,
    permissions: RwLock<PermissionMatrix>,
}

/// An open write transaction holding the service's write lock.
///
/// The transaction body must run inside [`WriteTxn::run`] so its
/// statements use the write connection. Must be closed with
/// [`WriteTxn::finish`] or [`WriteTxn::finish_held`].
pub(crate) struct WriteTxn<'a> {
    db: &'a SynapseDb,
    guard: MutexGuard<'a, ()>,
}

impl<'a> WriteTxn<'a> {
    /// Run the transaction body on the write connection.
    pub(crate) async fn run<F: Future>(&self, body: F) -> F::Output {
        crate::write_scope(body).await
    }

    /// Commit when `result` is `Ok`, roll back otherwise.
    pub(crate) async fn finish<T>(
        self,
        result: Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        self.finish_held(result).await.map(|(value, _)| value)
    }

    /// Like [`WriteTxn::finish`], but hands back the write lock so state
    /// derived from the committed rows can be updated before other writers
    /// get in.
    pub(crate) async fn finish_held<T>(
        self,
        result: Result<T, DatabaseError>,
    ) -> Result<(T, MutexGuard<'a, ()>), DatabaseError> {
        match result {
            Ok(value) => match self.db.commit().await {
                Ok(()) => Ok((value, self.guard)),
                Err(e) => {
                    self.abort().await;
                    Err(e)
                }
            },
            Err(e) => {
                self.abort().await;
                Err(e)
            }
        }
    }

    async fn abort(&self) {
        if let Err(e) = self.db.rollback().await {
            tracing::warn!(error = %e, "rollback failed");
        }
    }
}

impl SynapseService {
    /// Open a local database and wrap it.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or the
    /// permission table cannot be read.
    pub async fn new_local(db_path: &str) -> Result<Self, DatabaseError> {
        let db = SynapseDb::open_local(db_path).await?;
        Self::from_db(db).await
    }

    /// Wrap an already opened database, loading the permission matrix.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the permission table cannot be read.
    pub async fn from_db(db: SynapseDb) -> Result<Self, DatabaseError> {
        let svc = Self {
            db,
            write_lock: Mutex::new(()),
            permissions: RwLock::new(PermissionMatrix::empty()),
        };
        svc.reload_permissions().await?;
        Ok(svc)
    }

    /// Access the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &SynapseDb {
        &self.db
    }

    pub(crate) async fn begin_write(&self) -> Result<WriteTxn<'_>, DatabaseError> {
        let guard = self.write_lock.lock().await;
        self.db.begin().await?;
        Ok(WriteTxn {
            db: &self.db,
            guard,
        })
    }

    pub(crate) const fn permissions(&self) -> &RwLock<PermissionMatrix> {
        &self.permissions
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::error::DatabaseError;
    use crate::repos::cycle::NewCycle;
    use crate::test_support::helpers::{test_service, users};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_read_does_not_see_rolled_back_write() {
        let svc = Arc::new(test_service().await);
        let u = users(&svc).await;
        let cycle = svc
            .create_cycle(
                &u.executive,
                &NewCycle {
                    name: "2026 Q3".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let tx = svc.begin_write().await.unwrap();
        let renamed = tx
            .run(svc.db().conn().execute(
                "UPDATE test_cycles SET name = 'renamed' WHERE id = ?1",
                [cycle.id.as_str()],
            ))
            .await
            .unwrap();
        assert_eq!(renamed, 1);

        let reader = {
            let svc = Arc::clone(&svc);
            let id = cycle.id.clone();
            tokio::spawn(async move { svc.get_cycle(&id).await })
        };
        assert_eq!(reader.await.unwrap().unwrap().name, "2026 Q3");

        let abandoned: Result<(), DatabaseError> = Err(DatabaseError::validation("abandoned"));
        assert!(tx.finish(abandoned).await.is_err());
        assert_eq!(svc.get_cycle(&cycle.id).await.unwrap().name, "2026 Q3");

        // Lock and connection are usable again after the rollback.
        let tx = svc.begin_write().await.unwrap();
        tx.finish(Ok(())).await.unwrap();
    }

    #[tokio::test]
    async fn reads_inside_transaction_see_its_writes() {
        let svc = test_service().await;
        let u = users(&svc).await;
        let cycle = svc
            .create_cycle(
                &u.executive,
                &NewCycle {
                    name: "2026 Q3".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let tx = svc.begin_write().await.unwrap();
        let result: Result<_, DatabaseError> = tx
            .run(async {
                svc.db()
                    .conn()
                    .execute(
                        "UPDATE test_cycles SET name = 'renamed' WHERE id = ?1",
                        [cycle.id.as_str()],
                    )
                    .await?;
                svc.get_cycle(&cycle.id).await
            })
            .await;
        let inside = tx.finish(result).await.unwrap();
        assert_eq!(inside.name, "renamed");
        assert_eq!(svc.get_cycle(&cycle.id).await.unwrap().name, "renamed");
    }
}
