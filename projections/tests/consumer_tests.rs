//! Consume-loop behaviour against the in-memory event bus.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use ledger_core::environment::Clock;
use ledger_core::projection::{Projection, ProjectionError, Result};
use ledger_core::{AccountId, BalanceUpdated, EventBus, EventEnvelope, LedgerEvent};
use ledger_projections::{ConsumerStats, ProjectionConsumer};
use ledger_testing::{InMemoryEventBus, init_test_tracing, test_clock};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TOPIC: &str = "balances";

/// Records every envelope. Rejects balances equal to `poison`; fails with a
/// storage error while `storage_failures` is above zero or `storage_down` is
/// set.
#[derive(Default)]
struct RecordingProjection {
    seen: Mutex<Vec<EventEnvelope>>,
    poison: Option<Decimal>,
    storage_failures: AtomicUsize,
    storage_down: AtomicBool,
    attempts: AtomicUsize,
    cleared: AtomicBool,
}

impl RecordingProjection {
    fn seen_balances(&self) -> Vec<Decimal> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter_map(|envelope| match &envelope.event {
                LedgerEvent::BalanceUpdated(payload) => Some(payload.balance_account_id_from),
                LedgerEvent::TransactionCreated(_) => None,
            })
            .collect()
    }
}

impl Projection for RecordingProjection {
    fn name(&self) -> &str {
        "recording"
    }

    async fn apply_event(&self, event: &EventEnvelope) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.storage_down.load(Ordering::SeqCst)
            || self
                .storage_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(ProjectionError::Storage("connection reset".to_string()));
        }
        if let LedgerEvent::BalanceUpdated(payload) = &event.event {
            if Some(payload.balance_account_id_from) == self.poison {
                return Err(ProjectionError::InvalidBalance {
                    account_id: payload.account_id_from,
                    balance: payload.balance_account_id_from,
                });
            }
        }
        self.seen.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn rebuild(&self) -> Result<()> {
        self.seen.lock().unwrap().clear();
        self.cleared.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn balance_message(from_balance: Decimal) -> Vec<u8> {
    EventEnvelope::new(
        LedgerEvent::BalanceUpdated(BalanceUpdated {
            account_id_from: AccountId::new(),
            account_id_to: AccountId::new(),
            balance_account_id_from: from_balance,
            balance_account_id_to: dec!(0),
            version_account_id_from: Some(1),
            version_account_id_to: Some(1),
        }),
        test_clock().now(),
    )
    .to_bytes()
    .unwrap()
}

#[tokio::test]
async fn test_undecodable_messages_are_skipped_and_next_is_applied() {
    init_test_tracing();
    let bus = InMemoryEventBus::new();
    bus.inject(TOPIC, Some("k"), b"not json");
    bus.inject(TOPIC, None, b"");
    bus.inject(TOPIC, Some("k"), br#"{"occurred_at":"2025-01-01T00:00:00Z","event":{"name":"AccountClosed","payload":{}}}"#);
    bus.publish(TOPIC, "k", &balance_message(dec!(60))).await.unwrap();
    bus.close();

    let (consumer, _shutdown) =
        ProjectionConsumer::new(RecordingProjection::default(), Arc::new(bus), TOPIC);
    let stats = consumer.run().await.unwrap();

    assert_eq!(
        stats,
        ConsumerStats {
            received: 4,
            applied: 1,
            skipped: 3,
            failed: 0,
            retries: 0,
            transport_errors: 0,
        }
    );
    assert_eq!(consumer.projection().seen_balances(), vec![dec!(60)]);
}

#[tokio::test]
async fn test_every_handled_message_is_acknowledged_in_order() {
    let bus = InMemoryEventBus::new();
    bus.inject(TOPIC, Some("k"), b"not json");
    bus.publish(TOPIC, "k", &balance_message(dec!(1))).await.unwrap();
    bus.publish(TOPIC, "k", &balance_message(dec!(2))).await.unwrap();
    bus.close();

    let (consumer, _shutdown) =
        ProjectionConsumer::new(RecordingProjection::default(), Arc::new(bus.clone()), TOPIC);
    consumer.run().await.unwrap();

    assert_eq!(bus.acknowledged(TOPIC), vec![0, 1, 2]);
    assert_eq!(bus.committed_offset(TOPIC), 3);
}

#[tokio::test]
async fn test_rejected_message_does_not_stop_the_loop() {
    let bus = InMemoryEventBus::new();
    for balance in [dec!(1), dec!(2), dec!(3)] {
        bus.publish(TOPIC, "k", &balance_message(balance)).await.unwrap();
    }
    bus.close();

    let projection = RecordingProjection {
        poison: Some(dec!(2)),
        ..RecordingProjection::default()
    };
    let (consumer, _shutdown) = ProjectionConsumer::new(projection, Arc::new(bus.clone()), TOPIC);
    let stats = consumer.run().await.unwrap();

    assert_eq!(stats.applied, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.retries, 0);
    assert_eq!(consumer.projection().seen_balances(), vec![dec!(1), dec!(3)]);
    assert_eq!(bus.acknowledged(TOPIC), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_storage_failure_is_retried_before_acknowledging() {
    let bus = InMemoryEventBus::new();
    bus.publish(TOPIC, "k", &balance_message(dec!(7))).await.unwrap();
    bus.close();

    let projection = RecordingProjection {
        storage_failures: AtomicUsize::new(2),
        ..RecordingProjection::default()
    };
    let (consumer, _shutdown) = ProjectionConsumer::new(projection, Arc::new(bus.clone()), TOPIC);
    let consumer = consumer.with_retry_backoff(Duration::from_millis(1), Duration::from_millis(4));
    let stats = consumer.run().await.unwrap();

    assert_eq!(stats.applied, 1);
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(consumer.projection().attempts.load(Ordering::SeqCst), 3);
    assert_eq!(consumer.projection().seen_balances(), vec![dec!(7)]);
    assert_eq!(bus.acknowledged(TOPIC), vec![0]);
}

#[tokio::test]
async fn test_messages_in_flight_at_shutdown_are_redelivered() {
    let bus = InMemoryEventBus::new();
    bus.publish(TOPIC, "k", &balance_message(dec!(1))).await.unwrap();
    bus.publish(TOPIC, "k", &balance_message(dec!(2))).await.unwrap();

    // Storage is down: the first message keeps failing, the second sits in the stream.
    let projection = RecordingProjection {
        storage_down: AtomicBool::new(true),
        ..RecordingProjection::default()
    };
    let (consumer, shutdown) = ProjectionConsumer::new(projection, Arc::new(bus.clone()), TOPIC);
    let consumer = Arc::new(
        consumer.with_retry_backoff(Duration::from_millis(1), Duration::from_millis(5)),
    );
    let running = {
        let consumer = Arc::clone(&consumer);
        tokio::spawn(async move { consumer.run().await })
    };

    tokio::time::timeout(Duration::from_secs(2), async {
        while consumer.projection().attempts.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("consumer should keep retrying");
    shutdown.send(true).unwrap();
    let stats = running.await.unwrap().unwrap();

    assert_eq!(stats.received, 1);
    assert_eq!(stats.applied, 0);
    assert!(stats.retries >= 2);
    assert!(bus.acknowledged(TOPIC).is_empty());
    assert_eq!(bus.committed_offset(TOPIC), 0);

    // A restarted consumer resumes from the committed offset.
    bus.close();
    let (consumer, _shutdown) =
        ProjectionConsumer::new(RecordingProjection::default(), Arc::new(bus.clone()), TOPIC);
    let stats = consumer.run().await.unwrap();

    assert_eq!(stats.applied, 2);
    assert_eq!(consumer.projection().seen_balances(), vec![dec!(1), dec!(2)]);
    assert_eq!(bus.committed_offset(TOPIC), 2);
}

#[tokio::test]
async fn test_messages_are_applied_in_receipt_order() {
    let bus = InMemoryEventBus::new();
    let (consumer, shutdown) =
        ProjectionConsumer::new(RecordingProjection::default(), Arc::new(bus.clone()), TOPIC);
    let consumer = Arc::new(consumer);

    let running = {
        let consumer = Arc::clone(&consumer);
        tokio::spawn(async move { consumer.run().await })
    };

    for i in 1..=5 {
        bus.publish(TOPIC, "k", &balance_message(Decimal::from(i))).await.unwrap();
    }
    // Messages only reach the projection once the consumer has caught up.
    tokio::time::timeout(Duration::from_secs(2), async {
        while consumer.projection().seen_balances().len() < 5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("consumer should catch up");

    shutdown.send(true).unwrap();
    let stats = running.await.unwrap().unwrap();

    assert_eq!(stats.applied, 5);
    assert_eq!(
        consumer.projection().seen_balances(),
        vec![dec!(1), dec!(2), dec!(3), dec!(4), dec!(5)]
    );
}

#[tokio::test]
async fn test_shutdown_stops_an_idle_consumer() {
    let bus = InMemoryEventBus::new();
    let (consumer, shutdown) =
        ProjectionConsumer::new(RecordingProjection::default(), Arc::new(bus), TOPIC);

    let running = tokio::spawn(async move { consumer.run().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.send(true).unwrap();

    let stats = tokio::time::timeout(Duration::from_secs(1), running)
        .await
        .expect("consumer should stop on shutdown")
        .unwrap()
        .unwrap();
    assert_eq!(stats, ConsumerStats::default());
}

#[tokio::test]
async fn test_dropped_shutdown_sender_stops_the_consumer() {
    let bus = InMemoryEventBus::new();
    let (consumer, shutdown) =
        ProjectionConsumer::new(RecordingProjection::default(), Arc::new(bus), TOPIC);
    drop(shutdown);

    let stats = tokio::time::timeout(Duration::from_secs(1), consumer.run())
        .await
        .expect("consumer should stop")
        .unwrap();
    assert_eq!(stats.received, 0);
}

#[tokio::test]
async fn test_rebuild_clears_the_projection() {
    let bus = InMemoryEventBus::new();
    bus.publish(TOPIC, "k", &balance_message(dec!(9))).await.unwrap();
    bus.close();
    let (consumer, _shutdown) =
        ProjectionConsumer::new(RecordingProjection::default(), Arc::new(bus), TOPIC);
    consumer.run().await.unwrap();

    consumer.rebuild().await.unwrap();

    assert!(consumer.projection().seen_balances().is_empty());
    assert!(consumer.projection().cleared.load(Ordering::SeqCst));
}
