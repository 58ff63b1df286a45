//! Balance projection fed through the consumer loop.

#![allow(clippy::unwrap_used)] // Tests can unwrap

use balance_service::{BalanceProjection, GetAccountBalance, ProjectionMode, QueryError};
use chrono::{DateTime, Utc};
use ledger_core::environment::Clock;
use ledger_core::projection::{AccountBalance, Projection};
use ledger_core::{AccountId, BalanceUpdated, EventBus, EventEnvelope, LedgerEvent, TransactionCreated, TransferId};
use ledger_projections::ProjectionConsumer;
use ledger_testing::{InMemoryBalanceStore, InMemoryEventBus, init_test_tracing, test_clock};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

const TOPIC: &str = "balances";

fn now() -> DateTime<Utc> {
    test_clock().now()
}

fn snapshot(
    from: (AccountId, Decimal, Option<i64>),
    to: (AccountId, Decimal, Option<i64>),
) -> EventEnvelope {
    EventEnvelope::new(
        LedgerEvent::BalanceUpdated(BalanceUpdated {
            account_id_from: from.0,
            account_id_to: to.0,
            balance_account_id_from: from.1,
            balance_account_id_to: to.1,
            version_account_id_from: from.2,
            version_account_id_to: to.2,
        }),
        now(),
    )
}

async fn publish(bus: &InMemoryEventBus, envelope: &EventEnvelope) {
    let key = envelope.event.partition_key();
    bus.publish(TOPIC, &key, &envelope.to_bytes().unwrap()).await.unwrap();
}

async fn drain(bus: InMemoryEventBus, store: &Arc<InMemoryBalanceStore>, mode: ProjectionMode) {
    bus.close();
    let projection = BalanceProjection::new(Arc::clone(store), mode);
    let (consumer, _shutdown) = ProjectionConsumer::new(projection, Arc::new(bus), TOPIC);
    consumer.run().await.unwrap();
}

#[tokio::test]
async fn test_bad_message_is_skipped_and_next_is_applied() {
    init_test_tracing();
    let bus = InMemoryEventBus::new();
    let store = Arc::new(InMemoryBalanceStore::new());
    let (alice, bob) = (AccountId::new(), AccountId::new());

    bus.inject(TOPIC, Some("k"), br#"{"account_id_from": 42}"#);
    publish(&bus, &snapshot((alice, dec!(60), Some(2)), (bob, dec!(40), Some(1)))).await;
    drain(bus, &store, ProjectionMode::Versioned).await;

    assert_eq!(store.balance(alice), Some(dec!(60)));
    assert_eq!(store.balance(bob), Some(dec!(40)));
}

#[tokio::test]
async fn test_duplicate_delivery_is_idempotent() {
    let store = Arc::new(InMemoryBalanceStore::new());
    let (alice, bob) = (AccountId::new(), AccountId::new());
    let message = snapshot((alice, dec!(60), Some(2)), (bob, dec!(40), Some(1)));

    for mode in [ProjectionMode::Overwrite, ProjectionMode::Versioned] {
        let bus = InMemoryEventBus::new();
        publish(&bus, &message).await;
        publish(&bus, &message).await;
        drain(bus, &store, mode).await;

        assert_eq!(store.balance(alice), Some(dec!(60)));
        assert_eq!(store.balance(bob), Some(dec!(40)));
    }
}

#[tokio::test]
async fn test_out_of_order_snapshots_leave_overwrite_stale() {
    let store = Arc::new(InMemoryBalanceStore::new());
    let (alice, bob, carol) = (AccountId::new(), AccountId::new(), AccountId::new());
    // Alice 100 → sends 40 to Bob (v2: 60) → sends 30 to Carol (v3: 30).
    let first = snapshot((alice, dec!(60), Some(2)), (bob, dec!(40), Some(1)));
    let second = snapshot((alice, dec!(30), Some(3)), (carol, dec!(30), Some(1)));

    let bus = InMemoryEventBus::new();
    publish(&bus, &second).await;
    publish(&bus, &first).await;
    drain(bus, &store, ProjectionMode::Overwrite).await;

    assert_eq!(store.balance(alice), Some(dec!(60)), "late snapshot wins under overwrite");
}

#[tokio::test]
async fn test_out_of_order_snapshots_are_rejected_when_versioned() {
    let store = Arc::new(InMemoryBalanceStore::new());
    let (alice, bob, carol) = (AccountId::new(), AccountId::new(), AccountId::new());
    let first = snapshot((alice, dec!(60), Some(2)), (bob, dec!(40), Some(1)));
    let second = snapshot((alice, dec!(30), Some(3)), (carol, dec!(30), Some(1)));

    let bus = InMemoryEventBus::new();
    publish(&bus, &second).await;
    publish(&bus, &first).await;
    drain(bus, &store, ProjectionMode::Versioned).await;

    assert_eq!(store.balance(alice), Some(dec!(30)));
    assert_eq!(store.balance(bob), Some(dec!(40)));
    assert_eq!(store.balance(carol), Some(dec!(30)));
}

#[tokio::test]
async fn test_unversioned_snapshot_falls_back_to_overwrite() {
    let store = InMemoryBalanceStore::new();
    let alice = AccountId::new();
    store.seed(AccountBalance::new(alice, dec!(10), 5).unwrap());
    let projection = BalanceProjection::new(Arc::new(store.clone()), ProjectionMode::Versioned);

    projection
        .apply_event(&snapshot((alice, dec!(7), None), (AccountId::new(), dec!(3), None)))
        .await
        .unwrap();

    assert_eq!(store.balance(alice), Some(dec!(7)));
}

#[tokio::test]
async fn test_transaction_created_is_ignored() {
    let store = Arc::new(InMemoryBalanceStore::new());
    let projection = BalanceProjection::new(Arc::clone(&store), ProjectionMode::Versioned);
    let event = EventEnvelope::new(
        LedgerEvent::TransactionCreated(TransactionCreated {
            id: TransferId::new(),
            account_id_from: AccountId::new(),
            account_id_to: AccountId::new(),
            amount: dec!(5),
        }),
        now(),
    );

    projection.apply_event(&event).await.unwrap();

    assert!(store.is_empty());
}

#[tokio::test]
async fn test_write_failure_is_reported() {
    let store = Arc::new(InMemoryBalanceStore::new());
    store.fail_writes(true);
    let projection = BalanceProjection::new(Arc::clone(&store), ProjectionMode::Overwrite);

    let result = projection
        .apply_event(&snapshot((AccountId::new(), dec!(1), Some(1)), (AccountId::new(), dec!(2), Some(1))))
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_rebuild_clears_the_replica() {
    let store = Arc::new(InMemoryBalanceStore::new());
    let projection = BalanceProjection::new(Arc::clone(&store), ProjectionMode::Versioned);
    projection
        .apply_event(&snapshot((AccountId::new(), dec!(1), Some(1)), (AccountId::new(), dec!(2), Some(1))))
        .await
        .unwrap();

    projection.rebuild().await.unwrap();

    assert!(store.is_empty());
}

#[tokio::test]
async fn test_query_returns_replicated_balance() {
    let store = Arc::new(InMemoryBalanceStore::new());
    let alice = AccountId::new();
    store.seed(AccountBalance::new(alice, dec!(60), 2).unwrap());
    let query = GetAccountBalance::new(Arc::clone(&store));

    let output = query.execute(alice).await.unwrap();
    assert_eq!(output.account_id, alice);
    assert_eq!(output.balance, dec!(60));

    let ghost = AccountId::new();
    assert!(matches!(
        query.execute(ghost).await,
        Err(QueryError::BalanceNotFound(id)) if id == ghost
    ));
}
