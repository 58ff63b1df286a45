//! Projection plumbing for the wallet ledger's balance replica.
//!
//! # Overview
//!
//! - [`ProjectionConsumer`]: sequential consume loop that decodes broker
//!   messages and feeds them to a projection, skipping what it cannot decode
//! - [`PostgresBalanceStore`]: `PostgreSQL` storage for replicated balances
//!
//! # CQRS Separation
//!
//! The replica uses its own database. It is fed only by the event bus:
//!
//! ```text
//! Ledger DB (Write)     →  Event Bus  →  Replica DB (Read)
//! ```

pub mod consumer;
pub mod postgres;

pub use consumer::{ConsumerStats, ProjectionConsumer};
pub use postgres::PostgresBalanceStore;
