//! NATS JetStream pull subscription

use crate::error::{AuditLogError, Result};
use crate::provider::{PendingMessage, Subscription};
use async_nats::jetstream;
use async_nats::jetstream::AckKind;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

/// Subscription over a durable JetStream pull consumer
pub struct NatsSubscription {
    messages: jetstream::consumer::pull::Stream,
    consumer: String,
}

impl NatsSubscription {
    pub(crate) fn new(messages: jetstream::consumer::pull::Stream, consumer: String) -> Self {
        Self { messages, consumer }
    }

    /// Durable consumer name backing this subscription
    pub fn consumer(&self) -> &str {
        &self.consumer
    }
}

#[async_trait]
impl Subscription for NatsSubscription {
    async fn next(&mut self) -> Result<Option<PendingMessage>> {
        let msg = match self.messages.next().await {
            None => return Ok(None),
            Some(Err(e)) => {
                return Err(AuditLogError::Transport(format!(
                    "consumer '{}': {}",
                    self.consumer, e
                )))
            }
            Some(Ok(msg)) => msg,
        };

        let (sequence, delivery_attempt) = match msg.info() {
            Ok(info) => (info.stream_sequence, info.delivered.max(1) as u64),
            Err(e) => {
                tracing::warn!(consumer = %self.consumer, "Message metadata unreadable: {}", e);
                (0, 1)
            }
        };

        let payload = msg.payload.clone();
        let msg = Arc::new(msg);
        let ack_msg = msg.clone();
        let nak_msg = msg;

        Ok(Some(PendingMessage::new(
            payload,
            sequence,
            delivery_attempt,
            move || {
                Box::pin(async move {
                    ack_msg
                        .ack()
                        .await
                        .map_err(|e| AuditLogError::Ack(e.to_string()))
                })
            },
            move |delay| {
                Box::pin(async move {
                    nak_msg
                        .ack_with(AckKind::Nak(delay))
                        .await
                        .map_err(|e| AuditLogError::Ack(e.to_string()))
                })
            },
        )))
    }
}
