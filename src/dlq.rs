//! Dead letters: messages dropped as unprocessable
//!
//! A payload that cannot be decoded, or an event the store refuses, is
//! acknowledged so the broker stops redelivering it. Before that it is
//! recorded here with enough context to inspect or replay it by hand.

use crate::error::Result;
use crate::types::TopicSubscription;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A dropped message with the reason it was dropped
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Subscription the message arrived on
    pub binding: TopicSubscription,

    /// Raw payload as delivered
    pub payload: Bytes,

    pub reason: String,

    /// Broker delivery attempt at the time it was dropped
    pub delivery_attempt: u64,

    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(
        binding: TopicSubscription,
        payload: Bytes,
        reason: impl Into<String>,
        delivery_attempt: u64,
    ) -> Self {
        Self {
            binding,
            payload,
            reason: reason.into(),
            delivery_attempt,
            dead_lettered_at: Utc::now(),
        }
    }

    /// Payload as text, lossy for non-UTF-8 bytes
    pub fn payload_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Sink for dead letters
#[async_trait]
pub trait DlqHandler: Send + Sync {
    async fn handle(&self, letter: DeadLetter) -> Result<()>;

    /// Number of dead letters currently held
    async fn count(&self) -> Result<usize>;

    /// Most recent dead letters, newest first
    async fn list(&self, limit: usize) -> Result<Vec<DeadLetter>>;
}

/// In-memory handler bounded to `capacity` letters
///
/// The oldest letter is evicted once capacity is reached. A capacity of 0
/// keeps everything.
#[derive(Clone)]
pub struct MemoryDlqHandler {
    letters: Arc<RwLock<VecDeque<DeadLetter>>>,
    capacity: usize,
}

impl MemoryDlqHandler {
    pub fn new(capacity: usize) -> Self {
        Self {
            letters: Arc::new(RwLock::new(VecDeque::new())),
            capacity,
        }
    }
}

impl Default for MemoryDlqHandler {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl DlqHandler for MemoryDlqHandler {
    async fn handle(&self, letter: DeadLetter) -> Result<()> {
        tracing::warn!(
            binding = %letter.binding,
            delivery_attempt = letter.delivery_attempt,
            payload_len = letter.payload.len(),
            reason = %letter.reason,
            "Message dead-lettered"
        );

        let mut letters = self.letters.write().await;
        letters.push_back(letter);
        if self.capacity > 0 {
            while letters.len() > self.capacity {
                letters.pop_front();
            }
        }

        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.letters.read().await.len())
    }

    async fn list(&self, limit: usize) -> Result<Vec<DeadLetter>> {
        let letters = self.letters.read().await;
        Ok(letters.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letter(n: usize) -> DeadLetter {
        DeadLetter::new(
            TopicSubscription::new("topic-audit", "topic-audit-sub"),
            Bytes::from(format!("payload-{}", n)),
            "invalid payload",
            1,
        )
    }

    #[tokio::test]
    async fn test_handle_and_list_newest_first() {
        let dlq = MemoryDlqHandler::default();
        dlq.handle(letter(1)).await.unwrap();
        dlq.handle(letter(2)).await.unwrap();

        assert_eq!(dlq.count().await.unwrap(), 2);
        let listed = dlq.list(10).await.unwrap();
        assert_eq!(listed[0].payload_lossy(), "payload-2");
        assert_eq!(listed[1].payload_lossy(), "payload-1");
        assert_eq!(dlq.list(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let dlq = MemoryDlqHandler::new(3);
        for n in 0..5 {
            dlq.handle(letter(n)).await.unwrap();
        }

        assert_eq!(dlq.count().await.unwrap(), 3);
        let listed = dlq.list(10).await.unwrap();
        assert_eq!(listed.last().unwrap().payload_lossy(), "payload-2");
    }

    #[tokio::test]
    async fn test_zero_capacity_is_unbounded() {
        let dlq = MemoryDlqHandler::new(0);
        for n in 0..20 {
            dlq.handle(letter(n)).await.unwrap();
        }
        assert_eq!(dlq.count().await.unwrap(), 20);
    }

    #[test]
    fn test_payload_lossy_handles_binary() {
        let letter = DeadLetter::new(
            TopicSubscription::new("t", "s"),
            Bytes::from_static(&[0xff, b'a']),
            "bad",
            3,
        );
        assert!(letter.payload_lossy().ends_with('a'));
    }
}
