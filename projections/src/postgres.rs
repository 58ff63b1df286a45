//! `PostgreSQL` storage for the balance replica.
//!
//! The replica lives in its own database, separate from the ledger:
//!
//! ```text
//! Write Side (Ledger)               Read Side (Replica)
//! ┌─────────────────────┐          ┌─────────────────────┐
//! │  PostgreSQL DB #1   │          │  PostgreSQL DB #2   │
//! │                     │          │                     │
//! │  clients            │   →→→    │  account_balances   │
//! │  accounts           │ Messages │                     │
//! │  transfers          │          │                     │
//! └─────────────────────┘          └─────────────────────┘
//! ```
//!
//! Every write is a single statement, so each account update commits on its
//! own.

use ledger_core::AccountId;
use ledger_core::projection::{AccountBalance, ApplyOutcome, BalanceStore, ProjectionError, Result};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

/// PostgreSQL-backed [`BalanceStore`].
///
/// # Schema
///
/// ```sql
/// CREATE TABLE account_balances (
///     account_id UUID PRIMARY KEY,
///     balance NUMERIC NOT NULL CHECK (balance >= 0),
///     version BIGINT NOT NULL DEFAULT 0,
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```ignore
/// use ledger_projections::PostgresBalanceStore;
///
/// let store = PostgresBalanceStore::new_with_separate_db("postgres://localhost/balances").await?;
/// store.migrate().await?;
///
/// store.set_balance(account_id, dec!(60)).await?;
/// let row = store.find(account_id).await?;
/// ```
#[derive(Clone, Debug)]
pub struct PostgresBalanceStore {
    pool: PgPool,
}

impl PostgresBalanceStore {
    /// Create a store using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the replica database.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if connection fails.
    pub async fn new_with_separate_db(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| ProjectionError::Storage(format!("Failed to connect: {e}")))?;

        Ok(Self::new(pool))
    }

    /// Create the `account_balances` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl BalanceStore for PostgresBalanceStore {
    async fn find(&self, account_id: AccountId) -> Result<Option<AccountBalance>> {
        let row: Option<(Uuid, Decimal, i64)> = sqlx::query_as(
            "SELECT account_id, balance, version FROM account_balances WHERE account_id = $1",
        )
        .bind(*account_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ProjectionError::Storage(format!("Failed to load balance: {e}")))?;

        Ok(row.map(|(id, balance, version)| AccountBalance {
            account_id: AccountId::from_uuid(id),
            balance,
            version,
        }))
    }

    async fn set_balance(&self, account_id: AccountId, balance: Decimal) -> Result<()> {
        let row = AccountBalance::new(account_id, balance, 0)?;

        sqlx::query(
            "INSERT INTO account_balances (account_id, balance, version, updated_at)
             VALUES ($1, $2, 0, now())
             ON CONFLICT (account_id) DO UPDATE
             SET balance = EXCLUDED.balance, updated_at = now()",
        )
        .bind(*row.account_id.as_uuid())
        .bind(row.balance)
        .execute(&self.pool)
        .await
        .map_err(|e| ProjectionError::Storage(format!("Failed to save balance: {e}")))?;

        Ok(())
    }

    async fn apply_versioned(
        &self,
        account_id: AccountId,
        balance: Decimal,
        version: i64,
    ) -> Result<ApplyOutcome> {
        let row = AccountBalance::new(account_id, balance, version)?;

        // Missing rows count as version zero, so nothing at or below it can win.
        if version <= 0 {
            let stored_version = self.find(account_id).await?.map_or(0, |stored| stored.version);
            return Ok(ApplyOutcome::Stale { stored_version });
        }

        // The conditional upsert returns no row when the stored version is not older.
        let written: Option<(i64,)> = sqlx::query_as(
            "INSERT INTO account_balances (account_id, balance, version, updated_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (account_id) DO UPDATE
             SET balance = EXCLUDED.balance, version = EXCLUDED.version, updated_at = now()
             WHERE account_balances.version < EXCLUDED.version
             RETURNING version",
        )
        .bind(*row.account_id.as_uuid())
        .bind(row.balance)
        .bind(row.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ProjectionError::Storage(format!("Failed to apply balance: {e}")))?;

        if written.is_some() {
            return Ok(ApplyOutcome::Applied);
        }

        let stored_version = self
            .find(account_id)
            .await?
            .map_or(version, |stored| stored.version);
        Ok(ApplyOutcome::Stale { stored_version })
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM account_balances")
            .execute(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(format!("Failed to clear balances: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PostgresBalanceStore>();
    }
}
