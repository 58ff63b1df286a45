//! Balance lookup against the replica.

use ledger_core::AccountId;
use ledger_core::projection::{BalanceStore, ProjectionError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Response body for `GET /balances/{account_id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceOutput {
    /// Account id
    pub account_id: AccountId,
    /// Latest replicated balance
    pub balance: Decimal,
}

/// Failure of a balance lookup.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The replica has never seen this account.
    #[error("balance for account {0} not found")]
    BalanceNotFound(AccountId),

    /// The replica could not be read.
    #[error(transparent)]
    Storage(#[from] ProjectionError),
}

/// Reads one account's replicated balance.
pub struct GetAccountBalance<S: BalanceStore> {
    store: Arc<S>,
}

impl<S: BalanceStore> GetAccountBalance<S> {
    /// Create the query over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Look up the balance of `account_id`.
    ///
    /// # Errors
    ///
    /// - [`QueryError::BalanceNotFound`] when the replica has no row
    /// - [`QueryError::Storage`] when the replica cannot be read
    pub async fn execute(&self, account_id: AccountId) -> Result<BalanceOutput, QueryError> {
        let row = self
            .store
            .find(account_id)
            .await?
            .ok_or(QueryError::BalanceNotFound(account_id))?;

        Ok(BalanceOutput {
            account_id: row.account_id,
            balance: row.balance,
        })
    }
}
