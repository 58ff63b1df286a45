//! Failed-publication outbox.
//!
//! Publishing happens after the ledger transaction has committed, so a broker
//! failure cannot undo the transfer. Instead the encoded message is parked
//! here and a relay re-sends it later.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

use crate::event::EventName;

/// Outbox storage errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutboxError {
    /// No entry with this id.
    #[error("outbox entry {0} not found")]
    NotFound(i64),

    /// Stored status string is not recognised.
    #[error("invalid outbox status: {0}")]
    InvalidStatus(String),

    /// Backend failure.
    #[error("outbox storage error: {0}")]
    Storage(String),
}

/// Lifecycle of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    /// Waiting to be re-sent
    Pending,
    /// Re-sent successfully
    Resolved,
    /// Given up on by an operator
    Discarded,
}

impl OutboxStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        }
    }

    /// Parse status from database string representation.
    ///
    /// # Errors
    ///
    /// [`OutboxError::InvalidStatus`] for unknown strings.
    pub fn parse(s: &str) -> Result<Self, OutboxError> {
        match s {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "discarded" => Ok(Self::Discarded),
            _ => Err(OutboxError::InvalidStatus(s.to_string())),
        }
    }
}

/// A message that could not be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFailedPublication {
    /// Destination topic
    pub topic: String,
    /// Partition key
    pub key: String,
    /// Event carried by the message
    pub event_name: EventName,
    /// Encoded envelope
    pub payload: Vec<u8>,
    /// Broker error text
    pub error_message: String,
}

/// A stored outbox entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPublication {
    /// Entry id
    pub id: i64,
    /// Destination topic
    pub topic: String,
    /// Partition key
    pub key: String,
    /// Event name as stored
    pub event_name: String,
    /// Encoded envelope
    pub payload: Vec<u8>,
    /// Most recent error text
    pub error_message: String,
    /// Re-send attempts so far
    pub retry_count: i32,
    /// When the first attempt failed
    pub first_failed_at: DateTime<Utc>,
    /// When the latest attempt failed
    pub last_failed_at: DateTime<Utc>,
    /// Current status
    pub status: OutboxStatus,
    /// When the entry left `Pending`
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Future returned by outbox methods.
pub type OutboxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, OutboxError>> + Send + 'a>>;

/// Storage for failed publications.
pub trait OutboxStore: Send + Sync {
    /// Parks a message and returns its entry id.
    ///
    /// # Errors
    ///
    /// [`OutboxError::Storage`] on backend failure.
    fn record(&self, entry: NewFailedPublication) -> OutboxFuture<'_, i64>;

    /// Oldest pending entries first.
    ///
    /// # Errors
    ///
    /// [`OutboxError::Storage`] on backend failure.
    fn list_pending(&self, limit: usize) -> OutboxFuture<'_, Vec<FailedPublication>>;

    /// Marks an entry as re-sent.
    ///
    /// # Errors
    ///
    /// [`OutboxError::NotFound`] for unknown ids.
    fn mark_resolved(&self, id: i64) -> OutboxFuture<'_, ()>;

    /// Marks an entry as abandoned.
    ///
    /// # Errors
    ///
    /// [`OutboxError::NotFound`] for unknown ids.
    fn mark_discarded(&self, id: i64, reason: &str) -> OutboxFuture<'_, ()>;

    /// Records another failed attempt; the entry stays pending.
    ///
    /// # Errors
    ///
    /// [`OutboxError::NotFound`] for unknown ids.
    fn record_retry_failure(&self, id: i64, error_message: &str) -> OutboxFuture<'_, ()>;

    /// Number of pending entries.
    ///
    /// # Errors
    ///
    /// [`OutboxError::Storage`] on backend failure.
    fn count_pending(&self) -> OutboxFuture<'_, i64>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [OutboxStatus::Pending, OutboxStatus::Resolved, OutboxStatus::Discarded] {
            assert_eq!(OutboxStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(OutboxStatus::parse("processing").is_err());
    }
}
