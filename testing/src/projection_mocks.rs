//! In-memory balance replica for projection tests.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use ledger_core::projection::{AccountBalance, ApplyOutcome, BalanceStore, ProjectionError, Result};
use ledger_core::AccountId;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// HashMap-backed [`BalanceStore`].
///
/// Rows are validated like the Postgres store: negative balances are
/// rejected.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBalanceStore {
    rows: Arc<RwLock<HashMap<AccountId, AccountBalance>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryBalanceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail with a storage error.
    pub fn fail_writes(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    /// Stored balance for `account_id`, if any.
    #[must_use]
    pub fn balance(&self, account_id: AccountId) -> Option<Decimal> {
        self.rows.read().unwrap().get(&account_id).map(|row| row.balance)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    /// True when no rows exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().unwrap().is_empty()
    }

    /// Inserts a row directly.
    pub fn seed(&self, row: AccountBalance) {
        self.rows.write().unwrap().insert(row.account_id, row);
    }

    fn check_writable(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProjectionError::Storage("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl BalanceStore for InMemoryBalanceStore {
    async fn find(&self, account_id: AccountId) -> Result<Option<AccountBalance>> {
        Ok(self.rows.read().unwrap().get(&account_id).cloned())
    }

    async fn set_balance(&self, account_id: AccountId, balance: Decimal) -> Result<()> {
        self.check_writable()?;
        let mut rows = self.rows.write().unwrap();
        let version = rows.get(&account_id).map_or(0, |row| row.version);
        rows.insert(account_id, AccountBalance::new(account_id, balance, version)?);
        Ok(())
    }

    async fn apply_versioned(
        &self,
        account_id: AccountId,
        balance: Decimal,
        version: i64,
    ) -> Result<ApplyOutcome> {
        self.check_writable()?;
        let row = AccountBalance::new(account_id, balance, version)?;
        let mut rows = self.rows.write().unwrap();
        let stored_version = rows.get(&account_id).map_or(0, |existing| existing.version);
        if version <= stored_version {
            return Ok(ApplyOutcome::Stale { stored_version });
        }
        rows.insert(account_id, row);
        Ok(ApplyOutcome::Applied)
    }

    async fn clear(&self) -> Result<()> {
        self.rows.write().unwrap().clear();
        Ok(())
    }
}
