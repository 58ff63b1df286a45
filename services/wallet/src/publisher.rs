//! Event handlers that forward dispatched events to the broker.
//!
//! One [`BrokerPublisher`] is registered per event name, each bound to its
//! own topic:
//!
//! | Event                | Topic (default)  | Partition key       |
//! |----------------------|------------------|---------------------|
//! | `TransactionCreated` | `transactions`   | transfer id         |
//! | `BalanceUpdated`     | `balances`       | `account_id_from`   |
//!
//! The payload is the JSON-encoded [`EventEnvelope`]. When the broker
//! rejects a message it is parked in the failed-publication outbox before
//! the error is handed back to the dispatcher.

use ledger_core::{
    DispatcherError, EventBus, EventDispatcher, EventEnvelope, EventHandler, EventName,
    HandlerError, NewFailedPublication, OutboxStore,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Publishes envelopes to one topic.
pub struct BrokerPublisher {
    name: String,
    topic: String,
    event_bus: Arc<dyn EventBus>,
    outbox: Arc<dyn OutboxStore>,
}

impl BrokerPublisher {
    /// Create a publisher for `topic`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        topic: impl Into<String>,
        event_bus: Arc<dyn EventBus>,
        outbox: Arc<dyn OutboxStore>,
    ) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
            event_bus,
            outbox,
        }
    }

    /// Destination topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    async fn park(&self, envelope: &EventEnvelope, key: String, payload: Vec<u8>, reason: String) {
        let entry = NewFailedPublication {
            topic: self.topic.clone(),
            key,
            event_name: envelope.name(),
            payload,
            error_message: reason,
        };
        match self.outbox.record(entry).await {
            Ok(id) => tracing::warn!(
                outbox_id = id,
                topic = %self.topic,
                event = %envelope.name(),
                "Publish failed, message parked in outbox"
            ),
            Err(error) => tracing::error!(
                topic = %self.topic,
                event = %envelope.name(),
                error = %error,
                "Publish failed and the outbox rejected the message"
            ),
        }
    }
}

impl EventHandler for BrokerPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle<'a>(
        &'a self,
        envelope: &'a EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            let key = envelope.event.partition_key();
            let payload = envelope.to_bytes()?;

            match self.event_bus.publish(&self.topic, &key, &payload).await {
                Ok(()) => {
                    tracing::debug!(topic = %self.topic, key = %key, event = %envelope.name(), "Event published");
                    Ok(())
                },
                Err(error) => {
                    metrics::counter!("ledger.publish.failed", "topic" => self.topic.clone())
                        .increment(1);
                    self.park(envelope, key, payload, error.to_string()).await;
                    Err(HandlerError::Publish(error))
                },
            }
        })
    }
}

impl std::fmt::Debug for BrokerPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerPublisher")
            .field("name", &self.name)
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Register both publishers on `dispatcher`.
///
/// # Errors
///
/// Returns [`DispatcherError`] if a publisher is already registered.
pub fn register_publishers(
    dispatcher: &mut EventDispatcher,
    event_bus: &Arc<dyn EventBus>,
    outbox: &Arc<dyn OutboxStore>,
    transactions_topic: &str,
    balances_topic: &str,
) -> Result<(), DispatcherError> {
    dispatcher.register(
        EventName::TransactionCreated,
        Arc::new(BrokerPublisher::new(
            "transaction-publisher",
            transactions_topic,
            Arc::clone(event_bus),
            Arc::clone(outbox),
        )),
    )?;
    dispatcher.register(
        EventName::BalanceUpdated,
        Arc::new(BrokerPublisher::new(
            "balance-publisher",
            balances_topic,
            Arc::clone(event_bus),
            Arc::clone(outbox),
        )),
    )?;
    Ok(())
}
