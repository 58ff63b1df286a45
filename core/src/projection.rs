//! Read-side contracts for the balance replica.
//!
//! # Overview
//!
//! The balance service keeps its own copy of every account balance, fed by
//! `BalanceUpdated` messages from the broker. It never sees the ledger's
//! database.
//!
//! ```text
//! Ledger (write side):          Replica (read side):
//! ┌─────────────────┐          ┌─────────────────┐
//! │  accounts       │          │ account_balances│
//! │  transfers      │          │                 │
//! └─────────────────┘          └─────────────────┘
//!         │                            ▲
//!         │ BalanceUpdated             │ apply_event
//!         ▼                            │
//! ┌──────────────────────────────────────┐
//! │         Event Bus (Redpanda)         │
//! └──────────────────────────────────────┘
//! ```
//!
//! Each message carries absolute balances, so applying one is a plain write.
//! With versions present the write only lands when it is newer than what the
//! replica holds, which makes redelivery and reordering harmless.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::event::EventEnvelope;
use crate::types::AccountId;

/// Error type for projection operations.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// A balance below zero was offered to the replica
    #[error("Invalid balance {balance} for account {account_id}")]
    InvalidBalance {
        /// Account the balance belongs to
        account_id: AccountId,
        /// Offending value
        balance: Decimal,
    },

    /// Event processing error
    #[error("Event processing error: {0}")]
    EventProcessing(String),
}

impl ProjectionError {
    /// Whether the same message may succeed when applied again.
    ///
    /// Only storage failures qualify; a rejected balance or a malformed event
    /// fails the same way every time.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// A replicated account balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Account identifier
    pub account_id: AccountId,
    /// Latest known balance
    pub balance: Decimal,
    /// Version of the snapshot that produced `balance`; zero when unknown
    pub version: i64,
}

impl AccountBalance {
    /// Validates and builds a replica row.
    ///
    /// # Errors
    ///
    /// [`ProjectionError::InvalidBalance`] when `balance` is negative.
    pub fn new(account_id: AccountId, balance: Decimal, version: i64) -> Result<Self> {
        if balance < Decimal::ZERO {
            return Err(ProjectionError::InvalidBalance {
                account_id,
                balance,
            });
        }
        Ok(Self {
            account_id,
            balance,
            version,
        })
    }
}

/// Result of a versioned write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The snapshot was newer and was stored.
    Applied,
    /// The replica already held this version or a newer one.
    Stale {
        /// Version currently stored
        stored_version: i64,
    },
}

/// A projection builds and maintains a read model from ledger events.
///
/// # Philosophy
///
/// - **Eventually Consistent**: the replica lags behind the ledger
/// - **Tolerant**: events it does not care about are ignored, not errors
/// - **Rebuildable**: can be dropped and rebuilt by replaying the topic
pub trait Projection: Send + Sync {
    /// Unique name for logging and metrics.
    fn name(&self) -> &str;

    /// Apply one decoded event to the projection.
    ///
    /// # Errors
    ///
    /// Returns error if the read model could not be updated.
    fn apply_event(&self, event: &EventEnvelope) -> impl Future<Output = Result<()>> + Send;

    /// Reset the projection so it can be rebuilt from the beginning.
    ///
    /// Default implementation does nothing.
    ///
    /// # Errors
    ///
    /// Returns error if the read model could not be cleared.
    fn rebuild(&self) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

/// Storage for replicated balances.
pub trait BalanceStore: Send + Sync {
    /// Load the replica row for `account_id`.
    ///
    /// # Errors
    ///
    /// [`ProjectionError::Storage`] on backend failure.
    fn find(&self, account_id: AccountId) -> impl Future<Output = Result<Option<AccountBalance>>> + Send;

    /// Overwrite the balance unconditionally, creating the row if needed.
    ///
    /// The stored version is left as is.
    ///
    /// # Errors
    ///
    /// [`ProjectionError::Storage`] on backend failure.
    fn set_balance(
        &self,
        account_id: AccountId,
        balance: Decimal,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Store `balance` only if `version` is greater than the stored version.
    ///
    /// Missing rows count as version zero.
    ///
    /// # Errors
    ///
    /// [`ProjectionError::Storage`] on backend failure.
    fn apply_versioned(
        &self,
        account_id: AccountId,
        balance: Decimal,
        version: i64,
    ) -> impl Future<Output = Result<ApplyOutcome>> + Send;

    /// Remove every row.
    ///
    /// # Errors
    ///
    /// [`ProjectionError::Storage`] on backend failure.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;
}
