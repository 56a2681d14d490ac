//! Broker provider trait: the core abstraction for message transports
//!
//! All brokers (NATS JetStream, in-memory) implement `EventProvider` so the
//! consumer loop only ever sees raw payloads plus ack/nak handles.

use crate::error::Result;
use crate::types::TopicSubscription;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::time::Duration;

pub mod memory;
pub mod nats;

/// Core trait for message brokers
///
/// Delivery is at-least-once: a message that is not acknowledged is
/// redelivered by the broker after its own timeout, or earlier when
/// negatively acknowledged.
#[async_trait]
pub trait EventProvider: Send + Sync {
    /// Open (or resume) the named subscription on a topic
    ///
    /// Subscriptions are durable: re-subscribing with the same binding
    /// continues where the previous pull loop left off.
    async fn subscribe(&self, binding: &TopicSubscription) -> Result<Box<dyn Subscription>>;

    /// Publish a raw payload to a topic, returning the broker sequence
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<u64>;

    /// Health check: returns true if the provider is connected
    async fn health(&self) -> Result<bool> {
        Ok(true)
    }

    /// Provider name (e.g., "nats", "memory")
    fn name(&self) -> &str;
}

/// Pull handle for one subscription
///
/// `Ok(None)` means the broker closed the subscription for good.
/// Errors are classified with [`crate::AuditLogError::is_transient`].
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message
    async fn next(&mut self) -> Result<Option<PendingMessage>>;
}

type AckFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;
type NakFn = Box<dyn FnOnce(Option<Duration>) -> BoxFuture<'static, Result<()>> + Send>;

/// A message pending acknowledgement
pub struct PendingMessage {
    /// Raw payload as published
    pub payload: Bytes,

    /// Broker-assigned sequence number
    pub sequence: u64,

    /// Delivery attempt, starting at 1
    pub delivery_attempt: u64,

    ack_fn: AckFn,
    nak_fn: NakFn,
}

impl PendingMessage {
    /// Create a new pending message with ack/nak callbacks
    pub fn new(
        payload: Bytes,
        sequence: u64,
        delivery_attempt: u64,
        ack_fn: impl FnOnce() -> BoxFuture<'static, Result<()>> + Send + 'static,
        nak_fn: impl FnOnce(Option<Duration>) -> BoxFuture<'static, Result<()>> + Send + 'static,
    ) -> Self {
        Self {
            payload,
            sequence,
            delivery_attempt,
            ack_fn: Box::new(ack_fn),
            nak_fn: Box::new(nak_fn),
        }
    }

    /// Acknowledge: the broker will not deliver this message again
    pub async fn ack(self) -> Result<()> {
        (self.ack_fn)().await
    }

    /// Negative-acknowledge: request redelivery, optionally after a delay
    pub async fn nak(self, delay: Option<Duration>) -> Result<()> {
        (self.nak_fn)(delay).await
    }
}

impl std::fmt::Debug for PendingMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingMessage")
            .field("sequence", &self.sequence)
            .field("delivery_attempt", &self.delivery_attempt)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
