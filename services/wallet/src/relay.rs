//! Re-sends messages parked in the failed-publication outbox.
//!
//! The relay is the only retry path: use cases never retry a publish
//! themselves. Entries are re-sent with their original topic, key and
//! payload, so consumers see the same message they would have seen the
//! first time.

use ledger_core::{EventBus, OutboxError, OutboxStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Outcome of one relay pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Pending entries picked up
    pub attempted: usize,
    /// Entries the broker accepted
    pub republished: usize,
    /// Entries that failed again and stay pending
    pub failed: usize,
}

/// Drains pending outbox entries back onto the broker.
pub struct OutboxRelay {
    event_bus: Arc<dyn EventBus>,
    outbox: Arc<dyn OutboxStore>,
    batch_size: usize,
}

impl OutboxRelay {
    /// Create a relay that handles up to `batch_size` entries per pass.
    #[must_use]
    pub fn new(event_bus: Arc<dyn EventBus>, outbox: Arc<dyn OutboxStore>, batch_size: usize) -> Self {
        Self {
            event_bus,
            outbox,
            batch_size: batch_size.max(1),
        }
    }

    /// Re-send up to `limit` pending entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError`] if the pending entries cannot be listed.
    /// Failures on individual entries are recorded on the entry instead.
    pub async fn republish_pending(&self, limit: usize) -> Result<RelayReport, OutboxError> {
        let pending = self.outbox.list_pending(limit).await?;
        let mut report = RelayReport {
            attempted: pending.len(),
            ..RelayReport::default()
        };

        for entry in pending {
            match self
                .event_bus
                .publish(&entry.topic, &entry.key, &entry.payload)
                .await
            {
                Ok(()) => {
                    report.republished += 1;
                    metrics::counter!("ledger.outbox.republished", "topic" => entry.topic.clone())
                        .increment(1);
                    if let Err(error) = self.outbox.mark_resolved(entry.id).await {
                        tracing::error!(
                            outbox_id = entry.id,
                            error = %error,
                            "Republished but could not mark entry resolved"
                        );
                    }
                },
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(
                        outbox_id = entry.id,
                        topic = %entry.topic,
                        retry_count = entry.retry_count + 1,
                        error = %error,
                        "Republish failed"
                    );
                    if let Err(outbox_error) =
                        self.outbox.record_retry_failure(entry.id, &error.to_string()).await
                    {
                        tracing::error!(
                            outbox_id = entry.id,
                            error = %outbox_error,
                            "Could not record retry failure"
                        );
                    }
                },
            }
        }

        if report.attempted > 0 {
            tracing::info!(
                attempted = report.attempted,
                republished = report.republished,
                failed = report.failed,
                "Outbox relay pass finished"
            );
        }
        Ok(report)
    }

    /// Run a pass every `interval` until shutdown is signalled.
    ///
    /// A dropped shutdown sender counts as a shutdown signal.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_secs = interval.as_secs(), batch_size = self.batch_size, "Starting outbox relay");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if let Err(error) = self.republish_pending(self.batch_size).await {
                        tracing::error!(error = %error, "Outbox relay pass failed");
                    }
                }
            }
        }

        tracing::info!("Outbox relay stopped");
    }
}

impl std::fmt::Debug for OutboxRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxRelay")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}
