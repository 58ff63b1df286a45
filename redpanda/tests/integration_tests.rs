//! Integration tests for [`RedpandaEventBus`] against a real Kafka instance.
//!
//! # Running These Tests
//!
//! These tests are marked as `#[ignore]` by default because they:
//! - Require Docker to be running (for testcontainers)
//! - Take 15-60 seconds per test to spin up Kafka
//!
//! To run explicitly:
//! ```bash
//! cargo test -p ledger-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use futures::StreamExt;
use ledger_core::{
    AccountId, BalanceUpdated, EventBus, EventEnvelope, InboundMessage, LedgerEvent, MessageStream,
};
use ledger_redpanda::RedpandaEventBus;
use rust_decimal_macros::dec;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

const WARMUP: &[u8] = b"warmup";

/// Start Kafka and wait until a publish succeeds.
async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    let brokers = format!("{host}:{port}");

    let max_attempts = 60;
    for attempt in 1..=max_attempts {
        if let Ok(bus) = RedpandaEventBus::new(&brokers) {
            if bus.publish("warmup-topic", "warmup", WARMUP).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(500)).await;
                return (kafka, brokers);
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(
            attempt != max_attempts,
            "Kafka failed to become ready after {max_attempts} attempts"
        );
    }
    unreachable!("loop either returns or asserts")
}

/// Publish a warmup message so the topic is auto-created.
async fn ensure_topic_exists(bus: &RedpandaEventBus, topic: &str) {
    for attempt in 1..=30 {
        if bus.publish(topic, "warmup", WARMUP).await.is_ok() {
            tokio::time::sleep(Duration::from_secs(3)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(attempt != 30, "Failed to create topic {topic}");
    }
}

/// Collect `count` non-warmup messages or panic after `timeout`.
async fn receive(stream: &mut MessageStream, count: usize, timeout: Duration) -> Vec<InboundMessage> {
    let mut received = Vec::new();
    tokio::time::timeout(timeout, async {
        while received.len() < count {
            if let Some(result) = stream.next().await {
                let message = result.expect("Failed to receive message");
                if message.payload != WARMUP {
                    received.push(message);
                }
            }
        }
    })
    .await
    .expect("Timeout waiting for messages");
    received
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_publish_and_subscribe_round_trip() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .consumer_group("round-trip")
        .build()
        .expect("Failed to create event bus");
    ensure_topic_exists(&bus, "balances").await;

    let mut stream = bus.subscribe(&["balances"]).await.expect("Failed to subscribe");
    tokio::time::sleep(Duration::from_secs(2)).await;

    let from = AccountId::new();
    let envelope = EventEnvelope::new(
        LedgerEvent::BalanceUpdated(BalanceUpdated {
            account_id_from: from,
            account_id_to: AccountId::new(),
            balance_account_id_from: dec!(60),
            balance_account_id_to: dec!(40),
            version_account_id_from: Some(1),
            version_account_id_to: Some(1),
        }),
        chrono::Utc::now(),
    );
    let payload = envelope.to_bytes().unwrap();
    bus.publish("balances", &from.to_string(), &payload)
        .await
        .expect("Failed to publish");

    let received = receive(&mut stream, 1, Duration::from_secs(10)).await;

    assert_eq!(received[0].topic, "balances");
    assert_eq!(received[0].key.as_deref(), Some(from.to_string().as_bytes()));
    assert_eq!(EventEnvelope::from_bytes(&received[0].payload).unwrap(), envelope);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_messages_with_same_key_keep_their_order() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .consumer_group("ordering")
        .build()
        .expect("Failed to create event bus");
    ensure_topic_exists(&bus, "ordered").await;

    let mut stream = bus.subscribe(&["ordered"]).await.expect("Failed to subscribe");
    tokio::time::sleep(Duration::from_secs(2)).await;

    for i in 0..20 {
        bus.publish("ordered", "account-1", format!("{i}").as_bytes())
            .await
            .expect("Failed to publish");
    }

    let received = receive(&mut stream, 20, Duration::from_secs(15)).await;
    let payloads: Vec<String> = received
        .iter()
        .map(|m| String::from_utf8(m.payload.clone()).unwrap())
        .collect();
    let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
    assert_eq!(payloads, expected);
    assert!(received.windows(2).all(|w| w[0].offset < w[1].offset));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_acknowledged_offsets_are_not_redelivered_to_the_group() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .consumer_group("commit-group")
        .build()
        .expect("Failed to create event bus");
    ensure_topic_exists(&bus, "committed").await;

    {
        let mut stream = bus.subscribe(&["committed"]).await.expect("Failed to subscribe");
        tokio::time::sleep(Duration::from_secs(2)).await;
        bus.publish("committed", "k", b"first").await.unwrap();
        let received = receive(&mut stream, 1, Duration::from_secs(10)).await;
        assert_eq!(received[0].payload, b"first");
        bus.acknowledge(&received[0]).await.unwrap();
        // Let the async commit land before the consumer is dropped.
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    let mut stream = bus.subscribe(&["committed"]).await.expect("Failed to resubscribe");
    tokio::time::sleep(Duration::from_secs(3)).await;
    bus.publish("committed", "k", b"second").await.unwrap();

    let received = receive(&mut stream, 1, Duration::from_secs(15)).await;
    assert_eq!(received[0].payload, b"second");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_unacknowledged_messages_are_redelivered_to_the_group() {
    let (_kafka, brokers) = start_kafka().await;
    let bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .consumer_group("redelivery-group")
        .build()
        .expect("Failed to create event bus");
    ensure_topic_exists(&bus, "redelivered").await;

    {
        let mut stream = bus.subscribe(&["redelivered"]).await.expect("Failed to subscribe");
        tokio::time::sleep(Duration::from_secs(2)).await;
        bus.publish("redelivered", "k", b"handled").await.unwrap();
        bus.publish("redelivered", "k", b"in flight").await.unwrap();
        let received = receive(&mut stream, 2, Duration::from_secs(10)).await;
        bus.acknowledge(&received[0]).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    let mut stream = bus.subscribe(&["redelivered"]).await.expect("Failed to resubscribe");
    let received = receive(&mut stream, 1, Duration::from_secs(15)).await;
    assert_eq!(received[0].payload, b"in flight");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_publish_to_unreachable_broker_fails() {
    let bus = RedpandaEventBus::builder()
        .brokers("127.0.0.1:1")
        .timeout(Duration::from_millis(500))
        .build()
        .expect("Producer creation does not connect");

    let result = bus.publish("balances", "k", b"payload").await;

    assert!(matches!(
        result,
        Err(ledger_core::EventBusError::PublishFailed { .. })
    ));
}
