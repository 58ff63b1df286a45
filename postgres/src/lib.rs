//! `PostgreSQL` storage for the wallet ledger.
//!
//! This crate implements the ledger's persistence seams on top of sqlx:
//!
//! - [`PgTransactionBackend`]: begins, commits and rolls back the transaction
//!   that one unit of work runs in
//! - Transaction-bound repositories for clients, accounts and transfers,
//!   registered through [`ledger_registry`]
//! - [`PostgresOutbox`]: the failed-publication outbox
//! - [`migrate`]: the ledger schema
//!
//! # Example
//!
//! ```ignore
//! use ledger_postgres::{PgTransactionBackend, ledger_registry, migrate};
//!
//! async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     migrate(&pool).await?;
//!     let uow = UnitOfWork::new(PgTransactionBackend::new(pool), ledger_registry());
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use ledger_core::unit_of_work::BackendFuture;
use ledger_core::{
    AccountRepository, ClientRepository, RepositoryError, RepositoryRegistry, TransactionBackend,
    TransferRepository, UnitOfWorkError,
};
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

pub mod outbox;
pub mod repositories;

pub use outbox::PostgresOutbox;
pub use repositories::{PgAccountRepository, PgClientRepository, PgTransferRepository};

/// Run the ledger migrations.
///
/// # Errors
///
/// Returns the sqlx migration error if any migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Registry with the client, account and transfer repositories.
#[must_use]
pub fn ledger_registry() -> RepositoryRegistry<PgTransaction> {
    RepositoryRegistry::new()
        .with_clients(|tx: &PgTransaction| {
            Arc::new(PgClientRepository::new(tx.clone())) as Arc<dyn ClientRepository>
        })
        .with_accounts(|tx: &PgTransaction| {
            Arc::new(PgAccountRepository::new(tx.clone())) as Arc<dyn AccountRepository>
        })
        .with_transfers(|tx: &PgTransaction| {
            Arc::new(PgTransferRepository::new(tx.clone())) as Arc<dyn TransferRepository>
        })
}

/// Open sqlx transaction shared by the repositories of one unit of work.
///
/// The transaction is taken out on commit or rollback; repositories that
/// still hold the handle afterwards get [`RepositoryError::TransactionClosed`].
#[derive(Clone)]
pub struct PgTransaction {
    inner: Arc<Mutex<Option<Transaction<'static, Postgres>>>>,
}

impl PgTransaction {
    fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Exclusive access to the open transaction.
    pub(crate) async fn lock(
        &self,
    ) -> MutexGuard<'_, Option<Transaction<'static, Postgres>>> {
        self.inner.lock().await
    }

    async fn take(&self) -> Option<Transaction<'static, Postgres>> {
        self.inner.lock().await.take()
    }
}

impl std::fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTransaction").finish_non_exhaustive()
    }
}

/// Unit-of-work backend over a connection pool.
#[derive(Clone, Debug)]
pub struct PgTransactionBackend {
    pool: PgPool,
}

impl PgTransactionBackend {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl TransactionBackend for PgTransactionBackend {
    type Handle = PgTransaction;

    fn begin(&self) -> BackendFuture<'_, Self::Handle> {
        Box::pin(async move {
            let tx = self
                .pool
                .begin()
                .await
                .map_err(|e| UnitOfWorkError::Begin(e.to_string()))?;
            Ok(PgTransaction::new(tx))
        })
    }

    fn commit(&self, handle: Self::Handle) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            let tx = handle
                .take()
                .await
                .ok_or_else(|| UnitOfWorkError::Commit("transaction already finished".to_string()))?;
            tx.commit()
                .await
                .map_err(|e| UnitOfWorkError::Commit(e.to_string()))
        })
    }

    fn rollback(&self, handle: Self::Handle) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            let Some(tx) = handle.take().await else {
                return Ok(());
            };
            tx.rollback()
                .await
                .map_err(|e| UnitOfWorkError::Rollback(e.to_string()))
        })
    }
}

/// Translate a sqlx error into the repository taxonomy.
pub(crate) fn map_sqlx_error(error: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &error {
        if db.is_unique_violation() {
            return RepositoryError::Conflict(db.message().to_string());
        }
        if db.is_foreign_key_violation() {
            return RepositoryError::ForeignKeyViolation(db.message().to_string());
        }
    }
    RepositoryError::Database(error.to_string())
}
