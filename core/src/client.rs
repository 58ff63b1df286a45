//! The `Client` aggregate: the owner of one or more accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::environment::Clock;
use crate::error::DomainError;
use crate::types::{AccountId, ClientId};

/// A registered ledger client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    id: ClientId,
    name: String,
    email: String,
    accounts: Vec<AccountId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Client {
    /// Creates a client with a fresh identity.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidName`] or [`DomainError::InvalidEmail`]
    /// when either field is blank. Name is checked first.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        let now = clock.now();
        let client = Self {
            id: ClientId::new(),
            name: name.into(),
            email: email.into(),
            accounts: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        client.validate()?;
        Ok(client)
    }

    /// Rebuilds a client from persisted fields without validation.
    #[must_use]
    pub const fn restore(
        id: ClientId,
        name: String,
        email: String,
        accounts: Vec<AccountId>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            email,
            accounts,
            created_at,
            updated_at,
        }
    }

    /// Replaces name and email.
    ///
    /// The client is left untouched when validation fails.
    ///
    /// # Errors
    ///
    /// Same as [`Client::new`].
    pub fn update(
        &mut self,
        name: impl Into<String>,
        email: impl Into<String>,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let mut candidate = self.clone();
        candidate.name = name.into();
        candidate.email = email.into();
        candidate.validate()?;
        candidate.updated_at = clock.now();
        *self = candidate;
        Ok(())
    }

    /// Records an account as belonging to this client.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::AccountMismatch`] when the account is owned by
    /// someone else.
    pub fn add_account(&mut self, account: &Account) -> Result<(), DomainError> {
        if account.client_id() != self.id {
            return Err(DomainError::AccountMismatch);
        }
        if !self.accounts.contains(&account.id()) {
            self.accounts.push(account.id());
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidName);
        }
        if self.email.trim().is_empty() {
            return Err(DomainError::InvalidEmail);
        }
        Ok(())
    }

    /// Client identifier
    #[must_use]
    pub const fn id(&self) -> ClientId {
        self.id
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Contact email
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Accounts attached to this client
    #[must_use]
    pub fn accounts(&self) -> &[AccountId] {
        &self.accounts
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

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::TimeZone;

    struct Fixed(DateTime<Utc>);

    impl Clock for Fixed {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn clock() -> Fixed {
        Fixed(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn new_client_validates_name_before_email() {
        let clock = clock();
        assert_eq!(Client::new("", "", &clock), Err(DomainError::InvalidName));
        assert_eq!(Client::new("Ada", " ", &clock), Err(DomainError::InvalidEmail));

        let client = Client::new("Ada", "ada@example.com", &clock).unwrap();
        assert_eq!(client.name(), "Ada");
        assert_eq!(client.created_at(), clock.now());
        assert!(client.accounts().is_empty());
    }

    #[test]
    fn update_keeps_previous_values_on_failure() {
        let clock = clock();
        let mut client = Client::new("Ada", "ada@example.com", &clock).unwrap();

        assert_eq!(client.update("", "x@example.com", &clock), Err(DomainError::InvalidName));
        assert_eq!(client.email(), "ada@example.com");

        client.update("Grace", "grace@example.com", &clock).unwrap();
        assert_eq!(client.name(), "Grace");
    }

    #[test]
    fn add_account_rejects_foreign_accounts() {
        let clock = clock();
        let mut ada = Client::new("Ada", "ada@example.com", &clock).unwrap();
        let grace = Client::new("Grace", "grace@example.com", &clock).unwrap();

        let own = Account::open(Some(&ada), &clock).unwrap();
        let foreign = Account::open(Some(&grace), &clock).unwrap();

        ada.add_account(&own).unwrap();
        ada.add_account(&own).unwrap();
        assert_eq!(ada.accounts(), &[own.id()]);
        assert_eq!(ada.add_account(&foreign), Err(DomainError::AccountMismatch));
    }
}
