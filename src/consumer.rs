//! Subscription consumer: one pull loop per (topic, subscription)
//!
//! Each delivered message is decoded, written and then acknowledged. A
//! message is never acknowledged before its record is durable; when the
//! store is unreachable the message is negatively acknowledged and comes
//! back later. Payloads that can never be stored are dead-lettered and
//! acknowledged so they do not block the subscription.

use crate::codec;
use crate::config::ConsumerConfig;
use crate::dlq::{DeadLetter, DlqHandler};
use crate::error::Result;
use crate::provider::{EventProvider, PendingMessage};
use crate::types::TopicSubscription;
use crate::writer::{IdempotentWriter, WriteOutcome};
use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// What happened to one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Written as a new record and acknowledged
    Stored,
    /// Already stored; acknowledged
    Duplicate,
    /// Undecodable payload; dead-lettered and acknowledged
    Dropped,
    /// Decodable but refused by the store; dead-lettered and acknowledged
    Rejected,
    /// Store unavailable; negatively acknowledged for redelivery
    Retry,
}

/// Per-subscription counters
#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    stored: AtomicU64,
    duplicates: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
    retried: AtomicU64,
    resubscribes: AtomicU64,
}

/// Point-in-time copy of [`ConsumerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStatsSnapshot {
    pub received: u64,
    pub stored: u64,
    pub duplicates: u64,
    pub dropped: u64,
    pub rejected: u64,
    pub retried: u64,
    pub resubscribes: u64,
}

impl ConsumerStats {
    fn record(&self, disposition: Disposition) {
        let counter = match disposition {
            Disposition::Stored => &self.stored,
            Disposition::Duplicate => &self.duplicates,
            Disposition::Dropped => &self.dropped,
            Disposition::Rejected => &self.rejected,
            Disposition::Retry => &self.retried,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            resubscribes: self.resubscribes.load(Ordering::Relaxed),
        }
    }
}

/// Final state of a consumer loop
#[derive(Debug, Clone, Serialize)]
pub struct ConsumerReport {
    pub binding: TopicSubscription,
    pub stats: ConsumerStatsSnapshot,
    /// Set when the loop ended on a fatal transport error
    pub error: Option<String>,
}

impl ConsumerReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Decode → write → acknowledge for a single message
#[derive(Clone)]
pub struct MessageHandler {
    writer: IdempotentWriter,
    dlq: Arc<dyn DlqHandler>,
    retry_delay: Option<Duration>,
}

impl MessageHandler {
    pub fn new(
        writer: IdempotentWriter,
        dlq: Arc<dyn DlqHandler>,
        retry_delay: Option<Duration>,
    ) -> Self {
        Self {
            writer,
            dlq,
            retry_delay,
        }
    }

    pub fn dlq(&self) -> &Arc<dyn DlqHandler> {
        &self.dlq
    }

    /// Process one message and settle it with the broker
    pub async fn handle(&self, binding: &TopicSubscription, msg: PendingMessage) -> Disposition {
        let event = match codec::decode(&msg.payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    binding = %binding,
                    sequence = msg.sequence,
                    "Dropping undecodable message: {}",
                    e
                );
                self.dead_letter(
                    binding,
                    msg.payload.clone(),
                    msg.sequence,
                    msg.delivery_attempt,
                    e.to_string(),
                )
                .await;
                settle_ack(binding, msg).await;
                return Disposition::Dropped;
            }
        };

        match self.writer.store(&event).await {
            Ok(outcome) => {
                let disposition = match outcome {
                    WriteOutcome::Inserted(_) => Disposition::Stored,
                    WriteOutcome::Duplicate(_) => Disposition::Duplicate,
                };
                settle_ack(binding, msg).await;
                disposition
            }
            Err(e) if e.is_retryable_write() => {
                tracing::warn!(
                    binding = %binding,
                    sequence = msg.sequence,
                    delivery_attempt = msg.delivery_attempt,
                    retry_delay = ?self.retry_delay,
                    "Write failed, requesting redelivery: {}",
                    e
                );
                let sequence = msg.sequence;
                if let Err(nak_err) = msg.nak(self.retry_delay).await {
                    tracing::warn!(
                        binding = %binding,
                        sequence,
                        "Nak failed, broker will redeliver after ack wait: {}",
                        nak_err
                    );
                }
                Disposition::Retry
            }
            Err(e) => {
                tracing::warn!(
                    binding = %binding,
                    sequence = msg.sequence,
                    user_id = %event.user_id,
                    "Rejecting event: {}",
                    e
                );
                self.dead_letter(
                    binding,
                    msg.payload.clone(),
                    msg.sequence,
                    msg.delivery_attempt,
                    e.to_string(),
                )
                .await;
                settle_ack(binding, msg).await;
                Disposition::Rejected
            }
        }
    }

    async fn dead_letter(
        &self,
        binding: &TopicSubscription,
        payload: Bytes,
        sequence: u64,
        delivery_attempt: u64,
        reason: String,
    ) {
        let letter = DeadLetter::new(binding.clone(), payload, reason, delivery_attempt);
        if let Err(e) = self.dlq.handle(letter).await {
            tracing::error!(binding = %binding, sequence, "Dead-letter failed: {}", e);
        }
    }
}

async fn settle_ack(binding: &TopicSubscription, msg: PendingMessage) {
    let sequence = msg.sequence;
    if let Err(e) = msg.ack().await {
        // The record is durable and the store collapses the redelivery.
        tracing::warn!(binding = %binding, sequence, "Ack failed: {}", e);
    }
}

/// Long-lived pull loop over one subscription
pub struct SubscriptionConsumer {
    binding: TopicSubscription,
    provider: Arc<dyn EventProvider>,
    handler: MessageHandler,
    settings: ConsumerConfig,
    stats: Arc<ConsumerStats>,
}

enum Pulled {
    Cancelled,
    Next(Result<Option<PendingMessage>>),
}

impl SubscriptionConsumer {
    pub fn new(
        binding: TopicSubscription,
        provider: Arc<dyn EventProvider>,
        handler: MessageHandler,
        settings: ConsumerConfig,
    ) -> Self {
        Self {
            binding,
            provider,
            handler,
            settings,
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    /// Live counters, shared with the running loop
    pub fn stats(&self) -> Arc<ConsumerStats> {
        self.stats.clone()
    }

    pub fn binding(&self) -> &TopicSubscription {
        &self.binding
    }

    /// Run until cancelled, closed by the broker, or failed fatally
    ///
    /// Messages already handed to a task are always finished before this
    /// returns, cancellation included.
    pub async fn run(self, cancel: CancellationToken) -> ConsumerReport {
        let max_in_flight = self.settings.max_in_flight.max(1);
        let mut backoff = Backoff::new(self.settings.min_backoff(), self.settings.max_backoff());
        let mut tasks: JoinSet<()> = JoinSet::new();

        tracing::info!(binding = %self.binding, max_in_flight, "Consumer started");

        let error = 'subscribe: loop {
            if cancel.is_cancelled() {
                break None;
            }

            let subscribed = tokio::select! {
                _ = cancel.cancelled() => break 'subscribe None,
                res = self.provider.subscribe(&self.binding) => res,
            };

            let mut subscription = match subscribed {
                Ok(sub) => sub,
                Err(e) if e.is_transient() => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        binding = %self.binding,
                        retry_in_ms = delay.as_millis() as u64,
                        "Subscribe failed, retrying: {}",
                        e
                    );
                    if !pause(&cancel, delay).await {
                        break None;
                    }
                    self.stats.resubscribes.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                Err(e) => {
                    tracing::error!(binding = %self.binding, "Subscribe failed permanently: {}", e);
                    break Some(e.to_string());
                }
            };

            loop {
                while tasks.len() >= max_in_flight {
                    if let Some(Err(e)) = tasks.join_next().await {
                        tracing::error!(binding = %self.binding, "Message task failed: {}", e);
                    }
                }

                let pulled = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Pulled::Cancelled,
                    res = subscription.next() => Pulled::Next(res),
                };

                match pulled {
                    Pulled::Cancelled => break 'subscribe None,
                    Pulled::Next(Ok(Some(msg))) => {
                        backoff.reset();
                        self.stats.received.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(
                            binding = %self.binding,
                            sequence = msg.sequence,
                            delivery_attempt = msg.delivery_attempt,
                            "Message received"
                        );

                        let handler = self.handler.clone();
                        let binding = self.binding.clone();
                        let stats = self.stats.clone();
                        tasks.spawn(async move {
                            let disposition = handler.handle(&binding, msg).await;
                            stats.record(disposition);
                        });
                    }
                    Pulled::Next(Ok(None)) => {
                        tracing::info!(binding = %self.binding, "Subscription closed by broker");
                        break 'subscribe None;
                    }
                    Pulled::Next(Err(e)) if e.is_transient() => {
                        let delay = backoff.next_delay();
                        tracing::warn!(
                            binding = %self.binding,
                            retry_in_ms = delay.as_millis() as u64,
                            "Transport error, re-subscribing: {}",
                            e
                        );
                        if !pause(&cancel, delay).await {
                            break 'subscribe None;
                        }
                        self.stats.resubscribes.fetch_add(1, Ordering::Relaxed);
                        continue 'subscribe;
                    }
                    Pulled::Next(Err(e)) => {
                        tracing::error!(binding = %self.binding, "Fatal transport error: {}", e);
                        break 'subscribe Some(e.to_string());
                    }
                }
            }
        };

        let in_flight = tasks.len();
        if in_flight > 0 {
            tracing::debug!(binding = %self.binding, in_flight, "Draining in-flight messages");
        }
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                tracing::error!(binding = %self.binding, "Message task failed: {}", e);
            }
        }

        let stats = self.stats.snapshot();
        tracing::info!(
            binding = %self.binding,
            received = stats.received,
            stored = stats.stored,
            duplicates = stats.duplicates,
            dropped = stats.dropped,
            rejected = stats.rejected,
            retried = stats.retried,
            failed = error.is_some(),
            "Consumer stopped"
        );

        ConsumerReport {
            binding: self.binding,
            stats,
            error,
        }
    }
}

/// Sleep unless cancelled first; false when cancelled
async fn pause(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Exponential backoff between re-subscribe attempts
#[derive(Debug)]
struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            current: min,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.min;
    }
}
