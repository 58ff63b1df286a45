//! # Wallet Service
//!
//! System of record for clients, accounts and transfers.
//!
//! ```text
//! HTTP ──▶ use case ──▶ UnitOfWork (Postgres) ──commit──▶ EventDispatcher
//!                                                            │
//!                                           BrokerPublisher ─┤──▶ Redpanda
//!                                                            │      ▲
//!                                              (on failure)  ▼      │
//!                                                         Outbox ──▶ OutboxRelay
//! ```
//!
//! Transfers are at-least-once on the wire: a message may be published by
//! the use case and again by the relay, and consumers must tolerate that.

pub mod config;
pub mod error;
pub mod http;
pub mod publisher;
pub mod relay;
pub mod use_cases;

pub use config::Config;
pub use error::TransferError;
pub use http::{AppState, build_router};
pub use publisher::{BrokerPublisher, register_publishers};
pub use relay::{OutboxRelay, RelayReport};
pub use use_cases::{
    AccountOutput, ClientOutput, CreateAccount, CreateAccountInput, CreateClient,
    CreateClientInput, CreateTransfer, CreateTransferInput, TransferOutput,
};
