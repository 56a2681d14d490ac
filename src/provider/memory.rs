//! In-memory broker for development and testing
//!
//! Mirrors the delivery semantics the pipeline relies on: every
//! subscription on a topic gets its own copy of each message, and a
//! negatively acknowledged message is redelivered with its attempt
//! counter bumped.

use super::{EventProvider, PendingMessage, Subscription};
use crate::error::Result;
use crate::types::TopicSubscription;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// In-memory provider
///
/// Cheap to clone; clones share the same topics and queues.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    inner: Arc<MemoryBroker>,
}

#[derive(Default)]
struct MemoryBroker {
    /// topic → subscription name → queue
    topics: tokio::sync::Mutex<HashMap<String, HashMap<String, Arc<SubscriptionQueue>>>>,
    sequence: AtomicU64,
}

#[derive(Debug, Clone)]
struct Delivery {
    payload: Bytes,
    sequence: u64,
    attempt: u64,
}

struct SubscriptionQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>,
    enqueued: AtomicU64,
    delivered: AtomicU64,
    acked: AtomicU64,
    nacked: AtomicU64,
}

/// Delivery counters for one subscription
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Messages published to the topic since the subscription existed
    pub enqueued: u64,
    /// Deliveries handed to a consumer, redeliveries included
    pub delivered: u64,
    pub acked: u64,
    pub nacked: u64,
}

impl SubscriptionQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            enqueued: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            acked: AtomicU64::new(0),
            nacked: AtomicU64::new(0),
        }
    }

    fn send(&self, delivery: Delivery) -> bool {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        match tx.as_ref() {
            Some(tx) => tx.send(delivery).is_ok(),
            None => false,
        }
    }

    fn redeliver(&self, delivery: Delivery) -> bool {
        let (sequence, attempt) = (delivery.sequence, delivery.attempt);
        let sent = self.send(delivery);
        if !sent {
            tracing::debug!(sequence, attempt, "Subscription closed, redelivery dropped");
        }
        sent
    }

    fn close(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued.load(Ordering::SeqCst),
            delivered: self.delivered.load(Ordering::SeqCst),
            acked: self.acked.load(Ordering::SeqCst),
            nacked: self.nacked.load(Ordering::SeqCst),
        }
    }
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the subscription ahead of time so it receives every publish
    ///
    /// Like any pub/sub broker, a topic only fans out to subscriptions
    /// that exist at publish time.
    pub async fn create_subscription(&self, binding: &TopicSubscription) {
        self.queue(binding).await;
    }

    /// Close a subscription; its pull loop sees the end of the stream
    /// once buffered messages are drained
    pub async fn close_subscription(&self, binding: &TopicSubscription) {
        let topics = self.inner.topics.lock().await;
        if let Some(queue) = topics
            .get(&binding.topic)
            .and_then(|subs| subs.get(&binding.subscription))
        {
            queue.close();
        }
    }

    /// Delivery counters for a subscription
    pub async fn stats(&self, binding: &TopicSubscription) -> Option<QueueStats> {
        let topics = self.inner.topics.lock().await;
        topics
            .get(&binding.topic)
            .and_then(|subs| subs.get(&binding.subscription))
            .map(|queue| queue.stats())
    }

    async fn queue(&self, binding: &TopicSubscription) -> Arc<SubscriptionQueue> {
        let mut topics = self.inner.topics.lock().await;
        topics
            .entry(binding.topic.clone())
            .or_default()
            .entry(binding.subscription.clone())
            .or_insert_with(|| Arc::new(SubscriptionQueue::new()))
            .clone()
    }
}

#[async_trait]
impl EventProvider for MemoryProvider {
    async fn subscribe(&self, binding: &TopicSubscription) -> Result<Box<dyn Subscription>> {
        let queue = self.queue(binding).await;
        tracing::debug!(binding = %binding, "Memory subscription opened");
        Ok(Box::new(MemorySubscription { queue }))
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<u64> {
        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let topics = self.inner.topics.lock().await;

        let Some(subscriptions) = topics.get(topic) else {
            tracing::debug!(topic, sequence, "Published to topic without subscriptions");
            return Ok(sequence);
        };

        for (name, queue) in subscriptions {
            let delivery = Delivery {
                payload: payload.clone(),
                sequence,
                attempt: 1,
            };
            if queue.send(delivery) {
                queue.enqueued.fetch_add(1, Ordering::SeqCst);
            } else {
                tracing::debug!(
                    topic,
                    subscription = %name,
                    "Subscription closed, message skipped"
                );
            }
        }

        Ok(sequence)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Pull handle over one in-memory queue
pub struct MemorySubscription {
    queue: Arc<SubscriptionQueue>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Result<Option<PendingMessage>> {
        let delivery = {
            let mut rx = self.queue.rx.lock().await;
            rx.recv().await
        };

        let Some(delivery) = delivery else {
            return Ok(None);
        };
        self.queue.delivered.fetch_add(1, Ordering::SeqCst);

        let ack_queue = self.queue.clone();
        let nak_queue = self.queue.clone();
        let redelivery = Delivery {
            attempt: delivery.attempt + 1,
            ..delivery.clone()
        };

        Ok(Some(PendingMessage::new(
            delivery.payload,
            delivery.sequence,
            delivery.attempt,
            move || {
                Box::pin(async move {
                    ack_queue.acked.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            },
            move |delay| {
                Box::pin(async move {
                    nak_queue.nacked.fetch_add(1, Ordering::SeqCst);
                    match delay {
                        Some(delay) => {
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                nak_queue.redeliver(redelivery);
                            });
                        }
                        None => {
                            nak_queue.redeliver(redelivery);
                        }
                    }
                    Ok(())
                })
            },
        )))
    }
}
