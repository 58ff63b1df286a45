//! In-memory event bus.
//!
//! Every publish is appended to a log and forwarded to live subscribers.
//! The bus behaves like a single consumer group: a new subscription first
//! replays the log for its topics from the committed offset (the start, if
//! nothing was acknowledged), so unacknowledged messages are delivered again.
//! [`InMemoryEventBus::close`] ends every subscription stream, current and
//! future.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use ledger_core::{EventBus, EventBusError, InboundMessage, MessageStream};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A message as published, for assertions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Topic
    pub topic: String,
    /// Partition key
    pub key: String,
    /// Body
    pub payload: Vec<u8>,
}

type Subscriber = (
    Vec<String>,
    mpsc::UnboundedSender<Result<InboundMessage, EventBusError>>,
);

#[derive(Default)]
struct BusState {
    log: Vec<InboundMessage>,
    published: Vec<PublishedMessage>,
    subscribers: Vec<Subscriber>,
    acknowledged: Vec<(String, i64)>,
    committed: HashMap<String, i64>,
    failing_topics: HashSet<String>,
    fail_all: bool,
    closed: bool,
}

/// Broker double shared between producers and consumers.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<Mutex<BusState>>,
}

impl InMemoryEventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail.
    pub fn fail_publishes(&self, on: bool) {
        self.state.lock().unwrap().fail_all = on;
    }

    /// Make publishes to `topic` fail.
    pub fn fail_topic(&self, topic: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_topics
            .insert(topic.to_string());
    }

    /// Let publishes to `topic` succeed again.
    pub fn heal_topic(&self, topic: &str) {
        self.state.lock().unwrap().failing_topics.remove(topic);
    }

    /// Successful publishes in order.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().unwrap().published.clone()
    }

    /// Successful publishes to `topic` in order.
    #[must_use]
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published()
            .into_iter()
            .filter(|message| message.topic == topic)
            .collect()
    }

    /// Acknowledged offsets of `topic`, in acknowledgement order.
    #[must_use]
    pub fn acknowledged(&self, topic: &str) -> Vec<i64> {
        self.state
            .lock()
            .unwrap()
            .acknowledged
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, offset)| *offset)
            .collect()
    }

    /// Next offset a new subscription to `topic` starts from.
    #[must_use]
    pub fn committed_offset(&self, topic: &str) -> i64 {
        self.state
            .lock()
            .unwrap()
            .committed
            .get(topic)
            .copied()
            .unwrap_or(0)
    }

    /// Delivers raw bytes to `topic` without going through `publish`.
    ///
    /// Bypasses failure injection; used to feed malformed messages.
    pub fn inject(&self, topic: &str, key: Option<&str>, payload: &[u8]) {
        let mut state = self.state.lock().unwrap();
        Self::deliver(&mut state, topic, key.map(|k| k.as_bytes().to_vec()), payload.to_vec());
    }

    /// Ends every subscription stream.
    ///
    /// Later subscriptions still replay the log, then end.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.subscribers.clear();
    }

    fn deliver(state: &mut BusState, topic: &str, key: Option<Vec<u8>>, payload: Vec<u8>) {
        let offset = state.log.iter().filter(|message| message.topic == topic).count();
        let message = InboundMessage {
            topic: topic.to_string(),
            partition: 0,
            offset: i64::try_from(offset).unwrap_or(i64::MAX),
            key,
            payload,
        };
        state.subscribers.retain(|(topics, sender)| {
            if topics.iter().any(|t| t == topic) {
                sender.send(Ok(message.clone())).is_ok()
            } else {
                !sender.is_closed()
            }
        });
        state.log.push(message);
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let key = key.to_string();
        let payload = payload.to_vec();

        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.fail_all || state.failing_topics.contains(&topic) {
                return Err(EventBusError::PublishFailed {
                    topic,
                    reason: "injected publish failure".to_string(),
                });
            }
            state.published.push(PublishedMessage {
                topic: topic.clone(),
                key: key.clone(),
                payload: payload.clone(),
            });
            Self::deliver(&mut state, &topic, Some(key.into_bytes()), payload);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|t| (*t).to_string()).collect();

        Box::pin(async move {
            let (sender, mut receiver) = mpsc::unbounded_channel();
            {
                let mut state = self.state.lock().unwrap();
                let pending = state.log.iter().filter(|m| {
                    topics.contains(&m.topic)
                        && m.offset >= state.committed.get(&m.topic).copied().unwrap_or(0)
                });
                for message in pending {
                    let _ = sender.send(Ok(message.clone()));
                }
                if !state.closed {
                    state.subscribers.push((topics, sender));
                }
            }

            let stream = async_stream::stream! {
                while let Some(item) = receiver.recv().await {
                    yield item;
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
        let offset = message.offset;

        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.acknowledged.push((topic.clone(), offset));
            let committed = state.committed.entry(topic).or_insert(0);
            *committed = (*committed).max(offset + 1);
            Ok(())
        })
    }
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("InMemoryEventBus")
            .field("published", &state.published.len())
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}
