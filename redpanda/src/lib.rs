//! Redpanda event bus for the wallet ledger.
//!
//! Implements the [`EventBus`] trait from `ledger-core` on top of rdkafka, so
//! any Kafka-compatible broker works (Redpanda, Apache Kafka, MSK).
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - Nothing is committed on receipt; the subscriber commits a message with
//!   [`EventBus::acknowledge`] once it has handled it
//! - Messages buffered or in flight when the process dies are redelivered
//! - Subscribers MUST be idempotent
//! - Ordering holds only within a partition. The wallet keys balance
//!   messages by account id so one account's updates stay ordered.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::EventBus;
//! use ledger_redpanda::RedpandaEventBus;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::new("localhost:9092")?;
//!
//! event_bus.publish("balances", "account-1", br#"{"name":"BalanceUpdated"}"#).await?;
//!
//! let mut stream = event_bus.subscribe(&["balances"]).await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(message) => {
//!             println!("offset {}: {} bytes", message.offset, message.payload.len());
//!             event_bus.acknowledge(&message).await?;
//!         },
//!         Err(e) => eprintln!("Error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use ledger_core::{EventBus, EventBusError, InboundMessage, MessageStream};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

/// Redpanda event bus implementation.
///
/// Publishing goes through one shared [`FutureProducer`]. Every call to
/// [`EventBus::subscribe`] creates its own consumer in the configured group.
///
/// # Example
///
/// ```no_run
/// use ledger_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .consumer_group("balance-service")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    /// Kafka producer for publishing messages
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Producer timeout
    timeout: Duration,
    /// Consumer group ID (if explicitly set)
    consumer_group: Option<String>,
    /// Message buffer size for subscribers
    buffer_size: usize,
    /// Auto offset reset policy
    auto_offset_reset: String,
    /// Live consumers by topic, used to commit acknowledged offsets
    consumers: Mutex<HashMap<String, Weak<StreamConsumer>>>,
}

impl RedpandaEventBus {
    /// Create a new Redpanda event bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be
    /// created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    fn consumer_for(&self, topic: &str) -> Option<Arc<StreamConsumer>> {
        self.consumers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .and_then(Weak::upgrade)
    }

    fn group_for(&self, topics: &[String]) -> String {
        self.consumer_group.clone().unwrap_or_else(|| {
            // Sort topics for deterministic consumer group naming
            let mut sorted = topics.to_vec();
            sorted.sort();
            format!("ledger-{}", sorted.join("-"))
        })
    }
}

impl std::fmt::Debug for RedpandaEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedpandaEventBus")
            .field("brokers", &self.brokers)
            .field("timeout", &self.timeout)
            .field("consumer_group", &self.consumer_group)
            .field("buffer_size", &self.buffer_size)
            .field("auto_offset_reset", &self.auto_offset_reset)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default, Debug)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated, e.g. "localhost:9092").
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: "0", "1" or "all".
    ///
    /// Default: "all"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4", "zstd".
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer group ID for subscriptions.
    ///
    /// If not set, the group is derived from the subscribed topics.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set how many messages may wait between the consumer and the subscriber.
    ///
    /// Default: 1000. Zero is treated as 1.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Set where new consumer groups start reading: "earliest", "latest" or "error".
    ///
    /// Default: "earliest"
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are not set or
    /// the producer configuration is rejected.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self.brokers.ok_or_else(|| {
            EventBusError::ConnectionFailed("Brokers not configured".to_string())
        })?;
        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        let buffer_size = self.buffer_size.unwrap_or(1000);
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "earliest".to_string());

        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            buffer_size,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaEventBus created"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout,
            consumer_group: self.consumer_group,
            buffer_size,
            auto_offset_reset,
            consumers: Mutex::new(HashMap::new()),
        })
    }
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let key = key.to_string();
        let payload = payload.to_vec();
        let timeout = self.timeout;

        Box::pin(async move {
            let record = FutureRecord::to(&topic).payload(&payload).key(&key);

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        key = %key,
                        partition,
                        offset,
                        "Message published"
                    );
                    Ok(())
                },
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        key = %key,
                        error = %kafka_error,
                        "Failed to publish message"
                    );
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                },
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();

        Box::pin(async move {
            let group_id = self.group_for(&topics);

            let consumer: Arc<StreamConsumer> = ClientConfig::new()
                .set("bootstrap.servers", &self.brokers)
                .set("group.id", &group_id)
                .set("enable.auto.commit", "false") // Manual commit for at-least-once
                .set("auto.offset.reset", &self.auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map(Arc::new)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %group_id,
                buffer_size = self.buffer_size,
                auto_offset_reset = %self.auto_offset_reset,
                "Subscribed to topics"
            );

            {
                let mut consumers = self.consumers.lock().unwrap_or_else(PoisonError::into_inner);
                for topic in &topics {
                    consumers.insert(topic.clone(), Arc::downgrade(&consumer));
                }
            }

            let (tx, rx) = tokio::sync::mpsc::channel(self.buffer_size);

            // The task owns the consumer and forwards raw messages in receipt
            // order. Offsets are committed by `acknowledge`, never here.
            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = consumer.stream();

                while let Some(msg_result) = stream.next().await {
                    match msg_result {
                        Ok(message) => {
                            let inbound = InboundMessage {
                                topic: message.topic().to_string(),
                                partition: message.partition(),
                                offset: message.offset(),
                                key: message.key().map(<[u8]>::to_vec),
                                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                            };

                            tracing::trace!(
                                topic = %inbound.topic,
                                partition = inbound.partition,
                                offset = inbound.offset,
                                "Received message"
                            );

                            if tx.send(Ok(inbound)).await.is_err() {
                                tracing::debug!("Channel receiver dropped, exiting consumer task");
                                break;
                            }
                        },
                        Err(e) => {
                            let err = EventBusError::TransportError(format!(
                                "Failed to receive message: {e}"
                            ));
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                        },
                    }
                }

                tracing::debug!("Consumer task exiting");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as MessageStream)
        })
    }

    fn acknowledge(
        &self,
        message: &InboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = message.topic.clone();
        let partition = message.partition;
        let offset = message.offset;

        Box::pin(async move {
            use rdkafka::consumer::CommitMode;

            let consumer = self.consumer_for(&topic).ok_or_else(|| {
                EventBusError::ConsumerGroupError(format!("No live subscription for topic '{topic}'"))
            })?;

            // The committed offset is the next one the group should read.
            let mut offsets = TopicPartitionList::new();
            offsets
                .add_partition_offset(&topic, partition, Offset::Offset(offset + 1))
                .map_err(|e| EventBusError::ConsumerGroupError(format!("Invalid offset: {e}")))?;

            consumer.commit(&offsets, CommitMode::Async).map_err(|e| {
                tracing::warn!(
                    topic = %topic,
                    partition,
                    offset,
                    error = %e,
                    "Failed to commit offset (message may be redelivered)"
                );
                EventBusError::ConsumerGroupError(format!("Failed to commit offset: {e}"))
            })?;

            tracing::trace!(topic = %topic, partition, offset, "Offset committed");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn redpanda_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaEventBus>();
        assert_sync::<RedpandaEventBus>();
    }

    #[tokio::test]
    async fn acknowledge_without_subscription_fails() {
        let bus = RedpandaEventBus::new("127.0.0.1:1").unwrap();
        let message = InboundMessage {
            topic: "balances".to_string(),
            partition: 0,
            offset: 7,
            key: None,
            payload: Vec::new(),
        };

        let result = bus.acknowledge(&message).await;

        assert!(matches!(result, Err(EventBusError::ConsumerGroupError(_))));
    }

    #[test]
    fn build_without_brokers_fails() {
        let result = RedpandaEventBus::builder().build();
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));
    }

    #[test]
    fn default_group_is_derived_from_sorted_topics() {
        let bus = RedpandaEventBus::new("localhost:9092").unwrap();
        let topics = vec!["transactions".to_string(), "balances".to_string()];
        assert_eq!(bus.group_for(&topics), "ledger-balances-transactions");

        let bus = RedpandaEventBus::builder()
            .brokers("localhost:9092")
            .consumer_group("balance-service")
            .build()
            .unwrap();
        assert_eq!(bus.group_for(&topics), "balance-service");
    }
}
