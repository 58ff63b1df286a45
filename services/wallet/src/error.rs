//! Use-case error taxonomy.

use ledger_core::{AccountId, ClientId, DomainError, RepositoryError, UnitOfWorkError};
use thiserror::Error;

/// Failure of a ledger use case.
///
/// Every variant is raised before commit, so the unit of work has rolled
/// back and nothing was persisted. Broker failures after commit never show
/// up here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// An aggregate rejected the input.
    #[error(transparent)]
    Validation(#[from] DomainError),

    /// One side of a transfer does not exist.
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    /// The owning client does not exist.
    #[error("client {0} not found")]
    ClientNotFound(ClientId),

    /// Storage rejected a read or write.
    #[error(transparent)]
    Persistence(#[from] RepositoryError),

    /// The coordinator failed to begin, commit, roll back or finish in time.
    #[error(transparent)]
    UnitOfWork(#[from] UnitOfWorkError),
}

impl TransferError {
    /// Label used on the rejection counter.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::AccountNotFound(_) | Self::ClientNotFound(_) => "not_found",
            Self::Persistence(_) => "persistence",
            Self::UnitOfWork(_) => "unit_of_work",
        }
    }
}
