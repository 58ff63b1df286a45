//! Broker abstraction shared by the outbound publisher and the projection
//! consumer.
//!
//! The ledger publishes only after its unit of work has committed, so the bus
//! sits strictly downstream of the source of truth:
//!
//! ```text
//! ┌──────────────────┐
//! │  CreateTransfer  │
//! └────────┬─────────┘
//!          │ commit
//!          ▼
//! ┌──────────────────┐
//! │    Dispatcher    │
//! └────────┬─────────┘
//!          │ publish(topic, key, payload)
//!          ▼
//! ┌──────────────────┐      subscribe(topics)    ┌──────────────────┐
//! │    Event Bus     │ ─────────────────────────▶│ Balance replica  │
//! └──────────────────┘                           └──────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - **At-least-once delivery**: consumers see duplicates and must tolerate them
//! - **Ordered within partition**: messages sharing a key keep their order
//! - **Raw payloads**: the bus moves bytes; decoding is the consumer's job
//! - **Acknowledge after processing**: a delivered message stays uncommitted
//!   until the consumer calls [`EventBus::acknowledge`], so anything still in
//!   flight when a consumer dies is delivered again
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in `ledger-testing` for tests
//! - `RedpandaEventBus` in `ledger-redpanda` for production

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Consumer group error
    #[error("Consumer group error: {0}")]
    ConsumerGroupError(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// A message as delivered by the broker, before any decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message was read from
    pub topic: String,
    /// Partition within the topic
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    /// Partition key, if the producer set one
    pub key: Option<Vec<u8>>,
    /// Message body; empty when the broker delivered none
    pub payload: Vec<u8>,
}

/// Stream of raw messages from subscriptions.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<InboundMessage, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the bus
/// can be shared as `Arc<dyn EventBus>` between handlers and the outbox relay.
pub trait EventBus: Send + Sync {
    /// Publish `payload` to `topic` under partition `key`.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker does not
    /// acknowledge the message.
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics and receive a stream of raw messages.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, EventBusError>> + Send + '_>>;

    /// Commit `message` for the subscribing consumer group.
    ///
    /// Offsets are positional: acknowledging a message also acknowledges every
    /// earlier message on its partition. Call it only once the message has
    /// been fully handled.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConsumerGroupError`] if no live subscription
    /// covers the message's topic or the offset cannot be committed.
    fn acknowledge(
        &self,
        message: &InboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;
}
