//! Validation failures raised by the ledger aggregates.

use thiserror::Error;

/// Errors produced by aggregate constructors and mutators.
///
/// These never touch storage; a use case that receives one rolls back its
/// unit of work and reports the failure to the caller unchanged.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainError {
    /// An account was opened without an owning client.
    #[error("client is required to open an account")]
    InvalidClient,

    /// A debit would take the balance below zero.
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Client name is empty.
    #[error("name is required")]
    InvalidName,

    /// Client email is empty.
    #[error("email is required")]
    InvalidEmail,

    /// Account being attached belongs to a different client.
    #[error("account does not belong to client")]
    AccountMismatch,

    /// Source and destination are the same account.
    #[error("source and destination accounts must differ")]
    InvalidTransaction,

    /// Source or destination account is missing.
    #[error("both source and destination accounts are required")]
    InvalidAccount,

    /// Amount is zero or negative.
    #[error("amount must be greater than zero")]
    InvalidAmount,

    /// Source account cannot cover the transfer.
    #[error("insufficient funds in source account")]
    InsufficientFunds,

    /// A credit would exceed the largest representable balance.
    #[error("balance would overflow")]
    BalanceOverflow,
}
