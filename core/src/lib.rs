//! # Ledger Core
//!
//! Domain model and plumbing for the wallet ledger.
//!
//! This crate holds everything that does not talk to a concrete database or
//! broker: the `Client`, `Account` and `Transfer` aggregates, the unit of work
//! that scopes repositories to one storage transaction, the in-process event
//! dispatcher, and the traits that storage and messaging adapters implement.
//!
//! ## Core Concepts
//!
//! - **Aggregates**: [`Client`](client::Client), [`Account`](account::Account),
//!   [`Transfer`](transfer::Transfer). Validation lives in their constructors.
//! - **Unit of Work**: [`UnitOfWork`](unit_of_work::UnitOfWork) runs one action
//!   inside a transaction and commits or rolls back based on its result.
//! - **Events**: [`LedgerEvent`](event::LedgerEvent) is the closed set of facts
//!   the ledger emits, wrapped in an [`EventEnvelope`](event::EventEnvelope).
//! - **Dispatcher**: [`EventDispatcher`](dispatcher::EventDispatcher) fans an
//!   envelope out to the handlers registered for its name.
//! - **Event Bus**: [`EventBus`](event_bus::EventBus) is the broker seam used by
//!   publishers and projection consumers.
//! - **Environment**: injected dependencies such as the [`Clock`](environment::Clock).
//!
//! ## Example
//!
//! ```ignore
//! use ledger_core::*;
//!
//! let outcome = uow
//!     .run(move |scope| {
//!         Box::pin(async move {
//!             let accounts = scope.accounts()?;
//!             let mut from = accounts.find_by_id(from_id).await?.ok_or(...)?;
//!             let mut to = accounts.find_by_id(to_id).await?.ok_or(...)?;
//!             let transfer = Transfer::create(Some(&mut from), Some(&mut to), amount, clock.as_ref())?;
//!             accounts.update_balance(&from).await?;
//!             accounts.update_balance(&to).await?;
//!             scope.transfers()?.create(&transfer).await?;
//!             Ok(transfer)
//!         })
//!     })
//!     .await?;
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use rust_decimal::Decimal;
pub use serde::{Deserialize, Serialize};

pub mod account;
pub mod client;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod outbox;
pub mod projection;
pub mod repository;
pub mod transfer;
pub mod types;
pub mod unit_of_work;

pub use account::Account;
pub use client::Client;
pub use dispatcher::{
    DispatchReport, DispatcherError, EventDispatcher, EventHandler, HandlerError, HandlerFailure,
};
pub use error::DomainError;
pub use event::{
    BalanceUpdated, DecodeError, EventEnvelope, EventError, EventName, LedgerEvent,
    TransactionCreated,
};
pub use event_bus::{EventBus, EventBusError, InboundMessage, MessageStream};
pub use outbox::{FailedPublication, NewFailedPublication, OutboxError, OutboxStatus, OutboxStore};
pub use projection::{AccountBalance, ApplyOutcome, BalanceStore, Projection, ProjectionError};
pub use repository::{AccountRepository, ClientRepository, RepositoryError, TransferRepository};
pub use transfer::Transfer;
pub use types::{AccountId, Amount, ClientId, TransferId};
pub use unit_of_work::{
    RepositoryKind, RepositoryRegistry, TransactionBackend, UnitOfWork, UnitOfWorkError,
    UnitOfWorkScope,
};

/// Environment module - Dependency injection traits
///
/// All time-dependent code takes a [`Clock`](environment::Clock) so tests can
/// pin timestamps.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, SystemClock};

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
