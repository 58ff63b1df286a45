//! Ledger events and their wire encoding.
//!
//! Events are facts about things that already happened in the ledger. The set
//! is closed: every event is a variant of [`LedgerEvent`], so handlers match on
//! a concrete payload instead of casting an untyped map.
//!
//! # Wire format
//!
//! Envelopes are encoded as JSON so that services written against the topic
//! contracts (snake_case payload keys) can read them:
//!
//! ```json
//! {
//!   "occurred_at": "2025-01-01T00:00:00Z",
//!   "event": {
//!     "name": "BalanceUpdated",
//!     "payload": {
//!       "account_id_from": "…",
//!       "account_id_to": "…",
//!       "balance_account_id_from": "60",
//!       "balance_account_id_to": "40"
//!     }
//!   }
//! }
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::account::Account;
use crate::transfer::Transfer;
use crate::types::{AccountId, TransferId};

/// Error returned when an envelope cannot be encoded.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),
}

/// Error returned when inbound bytes are not a valid envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Message carried no bytes.
    #[error("Message payload is empty")]
    EmptyPayload,

    /// The `name` tag does not match any known event.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// Bytes are not JSON or do not match the payload shape for the name.
    #[error("Failed to deserialize event: {0}")]
    Malformed(String),
}

/// Stable names under which handlers are registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    /// A transfer was committed.
    TransactionCreated,
    /// Account balances changed as a result of a transfer.
    BalanceUpdated,
}

impl EventName {
    /// Every known event name.
    pub const ALL: [Self; 2] = [Self::TransactionCreated, Self::BalanceUpdated];

    /// Wire representation of the name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TransactionCreated => "TransactionCreated",
            Self::BalanceUpdated => "BalanceUpdated",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == name)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of [`LedgerEvent::TransactionCreated`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCreated {
    /// Transfer identifier
    pub id: TransferId,
    /// Debited account
    pub account_id_from: AccountId,
    /// Credited account
    pub account_id_to: AccountId,
    /// Amount moved
    pub amount: Decimal,
}

impl From<&Transfer> for TransactionCreated {
    fn from(transfer: &Transfer) -> Self {
        Self {
            id: transfer.id(),
            account_id_from: transfer.account_from(),
            account_id_to: transfer.account_to(),
            amount: transfer.amount().value(),
        }
    }
}

/// Payload of [`LedgerEvent::BalanceUpdated`].
///
/// Balances are absolute post-transfer values. The versions are the
/// accounts' change counters at the time of the snapshot; producers that do
/// not track them omit the fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdated {
    /// Debited account
    pub account_id_from: AccountId,
    /// Credited account
    pub account_id_to: AccountId,
    /// Balance of the debited account after the transfer
    pub balance_account_id_from: Decimal,
    /// Balance of the credited account after the transfer
    pub balance_account_id_to: Decimal,
    /// Version of the debited account after the transfer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_account_id_from: Option<i64>,
    /// Version of the credited account after the transfer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_account_id_to: Option<i64>,
}

impl BalanceUpdated {
    /// Snapshot of two accounts after a transfer.
    #[must_use]
    pub const fn from_accounts(from: &Account, to: &Account) -> Self {
        Self {
            account_id_from: from.id(),
            account_id_to: to.id(),
            balance_account_id_from: from.balance(),
            balance_account_id_to: to.balance(),
            version_account_id_from: Some(from.version()),
            version_account_id_to: Some(to.version()),
        }
    }
}

/// Every event the ledger emits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "payload")]
pub enum LedgerEvent {
    /// A transfer was committed.
    TransactionCreated(TransactionCreated),
    /// Account balances changed.
    BalanceUpdated(BalanceUpdated),
}

impl LedgerEvent {
    /// Name used for handler lookup.
    #[must_use]
    pub const fn name(&self) -> EventName {
        match self {
            Self::TransactionCreated(_) => EventName::TransactionCreated,
            Self::BalanceUpdated(_) => EventName::BalanceUpdated,
        }
    }

    /// Broker partition key.
    ///
    /// Transfers are keyed by their own id, balance snapshots by the debited
    /// account so that updates touching the same source stay ordered.
    #[must_use]
    pub fn partition_key(&self) -> String {
        match self {
            Self::TransactionCreated(payload) => payload.id.to_string(),
            Self::BalanceUpdated(payload) => payload.account_id_from.to_string(),
        }
    }
}

/// An event together with the time it was produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// When the event was produced
    pub occurred_at: DateTime<Utc>,
    /// The event itself
    pub event: LedgerEvent,
}

impl EventEnvelope {
    /// Wraps an event.
    #[must_use]
    pub const fn new(event: LedgerEvent, occurred_at: DateTime<Utc>) -> Self {
        Self { occurred_at, event }
    }

    /// Name used for handler lookup.
    #[must_use]
    pub const fn name(&self) -> EventName {
        self.event.name()
    }

    /// Encodes the envelope as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Decodes an envelope from JSON bytes.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::EmptyPayload`] for zero-length input
    /// - [`DecodeError::UnknownEventType`] when the name tag is not recognised
    /// - [`DecodeError::Malformed`] for anything else that does not parse
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }

        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        let name = value
            .get("event")
            .and_then(|event| event.get("name"))
            .and_then(serde_json::Value::as_str);
        if let Some(name) = name {
            if EventName::parse(name).is_none() {
                return Err(DecodeError::UnknownEventType(name.to_string()));
            }
        }

        serde_json::from_value(value).map_err(|e| DecodeError::Malformed(e.to_string()))
    }
}
