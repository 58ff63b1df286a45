//! The `Transfer` aggregate: an immutable record of money moved between two
//! accounts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::environment::Clock;
use crate::error::DomainError;
use crate::types::{AccountId, Amount, TransferId};

/// A completed transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    id: TransferId,
    account_from: AccountId,
    account_to: AccountId,
    amount: Amount,
    created_at: DateTime<Utc>,
}

impl Transfer {
    /// Validates a transfer and applies it to both accounts.
    ///
    /// Checks run in this order: both accounts present, positive amount,
    /// distinct accounts, sufficient funds, room in `to` for the credit.
    /// Nothing is mutated unless every
    /// check passes; on success `from` is debited and `to` credited.
    ///
    /// # Errors
    ///
    /// - [`DomainError::InvalidAccount`] when either account is `None`
    /// - [`DomainError::InvalidAmount`] when `amount <= 0`
    /// - [`DomainError::InvalidTransaction`] when both sides share an id
    /// - [`DomainError::InsufficientFunds`] when `from` cannot cover `amount`
    /// - [`DomainError::BalanceOverflow`] when `to` cannot hold the credit
    pub fn create(
        from: Option<&mut Account>,
        to: Option<&mut Account>,
        amount: Decimal,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        let (Some(from), Some(to)) = (from, to) else {
            return Err(DomainError::InvalidAccount);
        };
        let amount = Amount::new(amount)?;
        if from.id() == to.id() {
            return Err(DomainError::InvalidTransaction);
        }
        if from.balance() < amount.value() {
            return Err(DomainError::InsufficientFunds);
        }
        if to.balance().checked_add(amount.value()).is_none() {
            return Err(DomainError::BalanceOverflow);
        }

        from.debit(amount, clock)?;
        to.credit(amount, clock)?;

        Ok(Self {
            id: TransferId::new(),
            account_from: from.id(),
            account_to: to.id(),
            amount,
            created_at: clock.now(),
        })
    }

    /// Rebuilds a transfer from persisted fields.
    #[must_use]
    pub const fn restore(
        id: TransferId,
        account_from: AccountId,
        account_to: AccountId,
        amount: Amount,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            account_from,
            account_to,
            amount,
            created_at,
        }
    }

    /// Transfer identifier
    #[must_use]
    pub const fn id(&self) -> TransferId {
        self.id
    }

    /// Debited account
    #[must_use]
    pub const fn account_from(&self) -> AccountId {
        self.account_from
    }

    /// Credited account
    #[must_use]
    pub const fn account_to(&self) -> AccountId {
        self.account_to
    }

    /// Amount moved
    #[must_use]
    pub const fn amount(&self) -> Amount {
        self.amount
    }

    /// Creation timestamp
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
