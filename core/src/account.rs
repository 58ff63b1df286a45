//! The `Account` aggregate: a balance owned by a client.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::environment::Clock;
use crate::error::DomainError;
use crate::types::{AccountId, Amount, ClientId};

/// A client's account.
///
/// `version` starts at zero and increases by one on every balance change. It
/// travels with `BalanceUpdated` so downstream replicas can discard stale
/// deliveries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    client_id: ClientId,
    balance: Decimal,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Account {
    /// Opens an empty account for `client`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidClient`] when no client is given.
    pub fn open(client: Option<&Client>, clock: &dyn Clock) -> Result<Self, DomainError> {
        let client = client.ok_or(DomainError::InvalidClient)?;
        let now = clock.now();
        Ok(Self {
            id: AccountId::new(),
            client_id: client.id(),
            balance: Decimal::ZERO,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuilds an account from persisted fields without validation.
    #[must_use]
    pub const fn restore(
        id: AccountId,
        client_id: ClientId,
        balance: Decimal,
        version: i64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            client_id,
            balance,
            version,
            created_at,
            updated_at,
        }
    }

    /// Adds `amount` to the balance.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::BalanceOverflow`] when the sum is not
    /// representable. The account is unchanged in that case.
    pub fn credit(&mut self, amount: Amount, clock: &dyn Clock) -> Result<(), DomainError> {
        self.balance = self
            .balance
            .checked_add(amount.value())
            .ok_or(DomainError::BalanceOverflow)?;
        self.touch(clock);
        Ok(())
    }

    /// Removes `amount` from the balance.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InsufficientBalance`] when the balance is lower
    /// than `amount`. The account is unchanged in that case.
    pub fn debit(&mut self, amount: Amount, clock: &dyn Clock) -> Result<(), DomainError> {
        if self.balance < amount.value() {
            return Err(DomainError::InsufficientBalance);
        }
        self.balance -= amount.value();
        self.touch(clock);
        Ok(())
    }

    fn touch(&mut self, clock: &dyn Clock) {
        self.version += 1;
        self.updated_at = clock.now();
    }

    /// Account identifier
    #[must_use]
    pub const fn id(&self) -> AccountId {
        self.id
    }

    /// Owning client
    #[must_use]
    pub const fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Current balance, never negative
    #[must_use]
    pub const fn balance(&self) -> Decimal {
        self.balance
    }

    /// Number of balance changes applied so far
    #[must_use]
    pub const fn version(&self) -> i64 {
        self.version
    }

    /// Creation timestamp
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last modification timestamp
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
