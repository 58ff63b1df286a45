//! # Balance Service
//!
//! Read-optimised replica of account balances, fed only by `BalanceUpdated`
//! messages from the ledger service.
//!
//! ```text
//! Redpanda ──▶ ProjectionConsumer ──▶ BalanceProjection ──▶ account_balances
//!                                                                │
//!                                     GET /balances/{id} ◀── GetAccountBalance
//! ```
//!
//! The replica is eventually consistent. It may briefly lag behind the
//! ledger, and in [`ProjectionMode::Overwrite`] it can also be left stale by
//! out-of-order delivery.

pub mod config;
pub mod http;
pub mod projection;
pub mod query;

pub use config::Config;
pub use http::{AppState, build_router};
pub use projection::{BalanceProjection, ProjectionMode, UnknownProjectionMode};
pub use query::{BalanceOutput, GetAccountBalance, QueryError};
