//! Persistence contracts for the ledger aggregates.
//!
//! Implementations are bound to one storage transaction by the unit of work;
//! nothing here commits. Methods take owned ids and clone what they need so
//! the returned futures borrow only `self`.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

use crate::account::Account;
use crate::client::Client;
use crate::transfer::Transfer;
use crate::types::{AccountId, ClientId};

/// Future returned by repository methods.
pub type RepositoryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Errors raised by repository implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Row targeted by an update does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A referenced row does not exist.
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// The bound transaction was already committed or rolled back.
    #[error("transaction is no longer active")]
    TransactionClosed,

    /// Connection, query or mapping failure.
    #[error("database error: {0}")]
    Database(String),
}

/// Storage for [`Client`]s.
pub trait ClientRepository: Send + Sync {
    /// Loads a client by id.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Database`] on storage failure.
    fn get(&self, id: ClientId) -> RepositoryFuture<'_, Option<Client>>;

    /// Inserts a new client.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Conflict`] when the id already exists.
    fn save(&self, client: &Client) -> RepositoryFuture<'_, ()>;
}

/// Storage for [`Account`]s.
pub trait AccountRepository: Send + Sync {
    /// Loads an account by id.
    ///
    /// Implementations backed by a database lock the row for the rest of the
    /// transaction so concurrent transfers on the same account serialize.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Database`] on storage failure.
    fn find_by_id(&self, id: AccountId) -> RepositoryFuture<'_, Option<Account>>;

    /// Inserts a new account.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::ForeignKeyViolation`] when the client does not
    /// exist, [`RepositoryError::Conflict`] when the account does.
    fn save(&self, account: &Account) -> RepositoryFuture<'_, ()>;

    /// Persists the account's balance and version.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] when no row matches the account id.
    fn update_balance(&self, account: &Account) -> RepositoryFuture<'_, ()>;
}

/// Storage for [`Transfer`]s.
pub trait TransferRepository: Send + Sync {
    /// Inserts a transfer row.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::ForeignKeyViolation`] when either account is
    /// missing, [`RepositoryError::Conflict`] on duplicate ids.
    fn create(&self, transfer: &Transfer) -> RepositoryFuture<'_, ()>;
}
