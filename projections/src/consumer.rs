//! `ProjectionConsumer` drives a projection from an event-bus subscription.
//!
//! # Overview
//!
//! The consumer:
//! - Subscribes to one topic on the event bus (Redpanda/Kafka)
//! - Decodes each raw message into an [`EventEnvelope`]
//! - Applies it to the projection, one message at a time, in receipt order
//! - Acknowledges the message only once it has been handled
//! - Stops on a shutdown signal or when the stream ends
//!
//! ```text
//! ┌─────────────┐
//! │  Event Bus  │ (Redpanda/Kafka)
//! └──────┬──────┘
//!        │ raw messages
//!        ▼
//! ┌──────────────────┐   undecodable   ┌─────────┐
//! │ProjectionConsumer│ ──────────────▶ │  skip   │
//! └────────┬─────────┘                 └─────────┘
//!          │ EventEnvelope
//!          ▼
//!     ┌──────────┐
//!     │Projection│
//!     └──────────┘
//! ```
//!
//! # Ordering
//!
//! Messages are never processed concurrently. This keeps per-partition
//! order, but says nothing about order across partitions or across consumer
//! instances. The ledger keys balance messages by account id so that one
//! account's snapshots always share a partition.
//!
//! # Acknowledgement
//!
//! A message is acknowledged after it was applied, or after it was found
//! undecodable or permanently rejected. A storage failure is retried with
//! exponential backoff, holding the partition, until it succeeds or shutdown
//! is signalled. An interrupted message is left unacknowledged and the group
//! receives it again after a restart.
//!
//! # Example
//!
//! ```ignore
//! use ledger_projections::ProjectionConsumer;
//!
//! let event_bus = Arc::new(RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("balance-service")
//!     .build()?);
//!
//! let (consumer, shutdown) = ProjectionConsumer::new(projection, event_bus, "balances");
//!
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     shutdown.send(true).ok();
//! });
//!
//! let stats = consumer.run().await?;
//! ```

use futures::StreamExt;
use ledger_core::projection::{Projection, ProjectionError, Result};
use ledger_core::{EventBus, EventEnvelope, InboundMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Counters for one consumer run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Messages read from the stream
    pub received: u64,
    /// Messages applied to the projection
    pub applied: u64,
    /// Messages dropped because they could not be decoded
    pub skipped: u64,
    /// Decoded messages the projection rejected for good
    pub failed: u64,
    /// Extra apply attempts after transient failures
    pub retries: u64,
    /// Errors yielded by the stream itself
    pub transport_errors: u64,
}

/// Applies messages from one topic to a projection.
///
/// A message that cannot be decoded is logged and skipped. A message the
/// projection rejects is logged and counted. Neither ends the loop.
pub struct ProjectionConsumer<P>
where
    P: Projection,
{
    projection: Arc<P>,
    event_bus: Arc<dyn EventBus>,
    /// Topic to subscribe to
    topic: String,
    /// Shutdown signal
    shutdown: watch::Receiver<bool>,
    initial_backoff: Duration,
    max_backoff: Duration,
}

/// What became of one message.
enum Handled {
    /// Done with; the next message may be read
    Done,
    /// Shutdown arrived while retrying; the message was not acknowledged
    Interrupted,
}

impl<P> ProjectionConsumer<P>
where
    P: Projection,
{
    /// Create a consumer and the sender that stops it.
    ///
    /// The event bus should already carry the consumer group for this
    /// projection. Send `true` on the returned sender to stop the loop.
    #[must_use]
    pub fn new(
        projection: P,
        event_bus: Arc<dyn EventBus>,
        topic: impl Into<String>,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let consumer = Self {
            projection: Arc::new(projection),
            event_bus,
            topic: topic.into(),
            shutdown: shutdown_rx,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        };

        (consumer, shutdown_tx)
    }

    /// Set the backoff between attempts to apply a message after a storage
    /// failure. The delay doubles per attempt up to `max`.
    ///
    /// Default: 100ms doubling up to 30 seconds.
    #[must_use]
    pub fn with_retry_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    /// The projection being fed.
    #[must_use]
    pub fn projection(&self) -> &Arc<P> {
        &self.projection
    }

    /// Consume until shutdown is signalled or the stream ends.
    ///
    /// A dropped shutdown sender counts as a shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::EventProcessing`] if the subscription
    /// cannot be established. Per-message failures never surface here.
    pub async fn run(&self) -> Result<ConsumerStats> {
        let projection_name = self.projection.name();
        tracing::info!(
            projection = projection_name,
            topic = %self.topic,
            "Starting projection consumer"
        );

        let mut stream = self
            .event_bus
            .subscribe(&[self.topic.as_str()])
            .await
            .map_err(|e| ProjectionError::EventProcessing(format!("Subscription error: {e}")))?;

        let mut shutdown = self.shutdown.clone();
        let mut stats = ConsumerStats::default();

        loop {
            if *shutdown.borrow() {
                tracing::info!(projection = projection_name, "Shutdown signal received");
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        tracing::info!(projection = projection_name, "Shutdown sender dropped");
                        break;
                    }
                }

                next = stream.next() => {
                    match next {
                        Some(Ok(message)) => {
                            if let Handled::Interrupted =
                                self.handle_message(&message, &mut stats, &mut shutdown).await
                            {
                                tracing::info!(
                                    projection = projection_name,
                                    offset = message.offset,
                                    "Shutdown during retry, message left unacknowledged"
                                );
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            stats.transport_errors += 1;
                            tracing::error!(
                                projection = projection_name,
                                error = %e,
                                "Error receiving message from bus"
                            );
                        }
                        None => {
                            tracing::info!(projection = projection_name, "Message stream ended");
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!(
            projection = projection_name,
            received = stats.received,
            applied = stats.applied,
            skipped = stats.skipped,
            failed = stats.failed,
            retries = stats.retries,
            "Projection consumer stopped"
        );
        Ok(stats)
    }

    /// Clear the projection so it can be replayed.
    ///
    /// This does NOT reset the consumer group's committed offsets. To replay
    /// the topic, restart with a new group name or reset the group with
    /// `rpk group seek <group> --to start`.
    ///
    /// # Errors
    ///
    /// Returns the projection's error if its data cannot be cleared.
    pub async fn rebuild(&self) -> Result<()> {
        let projection_name = self.projection.name();
        tracing::info!(projection = projection_name, "Rebuilding projection");
        self.projection.rebuild().await?;
        tracing::info!(
            projection = projection_name,
            "Projection cleared - restart the consumer to replay messages"
        );
        Ok(())
    }

    async fn handle_message(
        &self,
        message: &InboundMessage,
        stats: &mut ConsumerStats,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Handled {
        let projection_name = self.projection.name();
        stats.received += 1;

        let envelope = match EventEnvelope::from_bytes(&message.payload) {
            Ok(envelope) => envelope,
            Err(error) => {
                stats.skipped += 1;
                tracing::warn!(
                    projection = projection_name,
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %error,
                    "Skipping undecodable message"
                );
                metrics::counter!("projection.messages.skipped", "projection" => projection_name.to_string())
                    .increment(1);
                self.acknowledge(message).await;
                return Handled::Done;
            },
        };

        let mut delay = self.initial_backoff;
        loop {
            match self.projection.apply_event(&envelope).await {
                Ok(()) => {
                    stats.applied += 1;
                    tracing::debug!(
                        projection = projection_name,
                        event = %envelope.name(),
                        offset = message.offset,
                        "Message applied"
                    );
                    metrics::counter!("projection.messages.applied", "projection" => projection_name.to_string())
                        .increment(1);
                    break;
                },
                Err(error) if error.is_transient() => {
                    stats.retries += 1;
                    tracing::warn!(
                        projection = projection_name,
                        event = %envelope.name(),
                        offset = message.offset,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Failed to apply message, retrying"
                    );
                    metrics::counter!("projection.messages.retried", "projection" => projection_name.to_string())
                        .increment(1);

                    tokio::select! {
                        biased;

                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                return Handled::Interrupted;
                            }
                        }

                        () = tokio::time::sleep(delay) => {}
                    }
                    delay = delay.saturating_mul(2).min(self.max_backoff);
                },
                Err(error) => {
                    stats.failed += 1;
                    tracing::error!(
                        projection = projection_name,
                        event = %envelope.name(),
                        offset = message.offset,
                        error = %error,
                        "Projection rejected message, skipping"
                    );
                    break;
                },
            }
        }

        self.acknowledge(message).await;
        Handled::Done
    }

    async fn acknowledge(&self, message: &InboundMessage) {
        if let Err(error) = self.event_bus.acknowledge(message).await {
            tracing::warn!(
                projection = self.projection.name(),
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %error,
                "Failed to acknowledge message (it may be redelivered)"
            );
        }
    }
}

impl<P> std::fmt::Debug for ProjectionConsumer<P>
where
    P: Projection,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionConsumer")
            .field("projection", &self.projection.name())
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}
