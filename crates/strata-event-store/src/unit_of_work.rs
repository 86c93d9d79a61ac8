//! Explicit transaction handle threaded through repository and broker calls.

use std::fmt;

use sqlx::{PgPool, Postgres, Transaction};
use strata_core::error::EventStoreError;
use tokio::sync::{Mutex, MutexGuard};

use crate::pg_repository::db_error;

/// One database transaction, shareable by reference.
///
/// Broker handlers for a single event run concurrently and all receive the
/// same `&PgUnitOfWork`; the async mutex serializes their statements on the
/// one underlying connection. Dropping a unit of work without committing
/// rolls it back.
pub struct PgUnitOfWork {
    tx: Mutex<Transaction<'static, Postgres>>,
}

impl PgUnitOfWork {
    /// Begins a transaction on a pooled connection.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Infrastructure` if no connection can be
    /// acquired.
    pub async fn begin(pool: &PgPool) -> Result<Self, EventStoreError> {
        let tx = pool.begin().await.map_err(db_error)?;
        Ok(Self { tx: Mutex::new(tx) })
    }

    /// Exclusive access to the transaction. Use `&mut **guard` as the
    /// executor. Do not hold the guard across a call that locks it again.
    pub async fn connection(&self) -> MutexGuard<'_, Transaction<'static, Postgres>> {
        self.tx.lock().await
    }

    /// Commits every statement issued through this unit of work.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Infrastructure` if the commit fails.
    pub async fn commit(self) -> Result<(), EventStoreError> {
        self.tx.into_inner().commit().await.map_err(db_error)?;
        tracing::debug!("unit of work committed");
        Ok(())
    }

    /// Discards every statement issued through this unit of work.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Infrastructure` if the rollback fails.
    pub async fn rollback(self) -> Result<(), EventStoreError> {
        self.tx.into_inner().rollback().await.map_err(db_error)?;
        tracing::debug!("unit of work rolled back");
        Ok(())
    }
}

impl fmt::Debug for PgUnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgUnitOfWork").finish_non_exhaustive()
    }
}
