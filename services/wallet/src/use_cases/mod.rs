//! Ledger use cases.
//!
//! Each use case owns a shared [`UnitOfWork`](ledger_core::UnitOfWork) and
//! runs exactly one transaction per call. Only [`CreateTransfer`] emits
//! events, and only after its transaction has committed.

pub mod account;
pub mod client;
pub mod transfer;

pub use account::{AccountOutput, CreateAccount, CreateAccountInput};
pub use client::{ClientOutput, CreateClient, CreateClientInput};
pub use transfer::{CreateTransfer, CreateTransferInput, TransferOutput};
