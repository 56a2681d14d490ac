//! Lifecycle coordinator: one consumer loop per subscription
//!
//! All loops share a single cancellation token. `shutdown` asks them to
//! stop pulling; `wait` joins them and collects their reports.

use crate::config::ConsumerConfig;
use crate::consumer::{ConsumerReport, ConsumerStats, MessageHandler, SubscriptionConsumer};
use crate::error::{AuditLogError, Result};
use crate::provider::EventProvider;
use crate::types::TopicSubscription;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub struct LifecycleCoordinator {
    provider: Arc<dyn EventProvider>,
    handler: MessageHandler,
    settings: ConsumerConfig,
    cancel: CancellationToken,
    tasks: JoinSet<ConsumerReport>,
    running: HashMap<TopicSubscription, Arc<ConsumerStats>>,
}

impl LifecycleCoordinator {
    pub fn new(
        provider: Arc<dyn EventProvider>,
        handler: MessageHandler,
        settings: ConsumerConfig,
    ) -> Self {
        Self {
            provider,
            handler,
            settings,
            cancel: CancellationToken::new(),
            tasks: JoinSet::new(),
            running: HashMap::new(),
        }
    }

    /// Start a consumer loop for each binding
    ///
    /// Bindings repeated in `bindings`, or already running, are rejected
    /// before any loop starts.
    pub fn start(&mut self, bindings: &[TopicSubscription]) -> Result<usize> {
        let mut seen = HashSet::new();
        for binding in bindings {
            if self.running.contains_key(binding) || !seen.insert(binding) {
                return Err(AuditLogError::Config(format!(
                    "Duplicate subscription: {}",
                    binding
                )));
            }
        }

        for binding in bindings {
            let consumer = SubscriptionConsumer::new(
                binding.clone(),
                self.provider.clone(),
                self.handler.clone(),
                self.settings.clone(),
            );
            self.running.insert(binding.clone(), consumer.stats());
            self.tasks.spawn(consumer.run(self.cancel.child_token()));
        }

        tracing::info!(
            provider = self.provider.name(),
            started = bindings.len(),
            total = self.running.len(),
            "Consumers started"
        );

        Ok(bindings.len())
    }

    /// Token cancelled by [`shutdown`](Self::shutdown)
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ask every loop to stop; in-flight messages still complete
    pub fn shutdown(&self) {
        tracing::info!(consumers = self.running.len(), "Shutting down consumers");
        self.cancel.cancel();
    }

    /// Bindings started so far with their live counters
    pub fn running(&self) -> &HashMap<TopicSubscription, Arc<ConsumerStats>> {
        &self.running
    }

    /// Join every loop, returning one report per subscription
    ///
    /// Returns once all loops have ended on their own or after
    /// [`shutdown`](Self::shutdown).
    pub async fn wait(&mut self) -> Vec<ConsumerReport> {
        let mut reports = Vec::with_capacity(self.tasks.len());

        while let Some(res) = self.tasks.join_next().await {
            match res {
                Ok(report) => {
                    if let Some(ref error) = report.error {
                        tracing::error!(binding = %report.binding, "Consumer failed: {}", error);
                    }
                    reports.push(report);
                }
                Err(e) => tracing::error!("Consumer task panicked: {}", e),
            }
        }

        reports.sort_by(|a, b| a.binding.to_string().cmp(&b.binding.to_string()));
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlq::MemoryDlqHandler;
    use crate::provider::memory::MemoryProvider;
    use crate::storage::memory::MemoryLogStore;
    use crate::writer::IdempotentWriter;
    use bytes::Bytes;
    use std::time::Duration;

    fn coordinator(provider: MemoryProvider, store: Arc<MemoryLogStore>) -> LifecycleCoordinator {
        let handler = MessageHandler::new(
            IdempotentWriter::new(store),
            Arc::new(MemoryDlqHandler::default()),
            None,
        );
        LifecycleCoordinator::new(Arc::new(provider), handler, ConsumerConfig::default())
    }

    #[tokio::test]
    async fn test_rejects_duplicate_bindings() {
        let mut coord = coordinator(MemoryProvider::new(), Arc::new(MemoryLogStore::new()));
        let a = TopicSubscription::new("t", "s");

        let err = coord.start(&[a.clone(), a.clone()]).unwrap_err();
        assert!(matches!(err, AuditLogError::Config(_)));
        assert!(coord.running().is_empty());

        assert_eq!(coord.start(&[a.clone()]).unwrap(), 1);
        assert!(coord.start(&[a]).is_err());

        coord.shutdown();
        assert_eq!(coord.wait().await.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_returns_report_per_subscription() {
        let provider = MemoryProvider::new();
        let store = Arc::new(MemoryLogStore::new());
        let bindings = vec![
            TopicSubscription::new("topic-audit", "sub-a"),
            TopicSubscription::new("topic-audit", "sub-b"),
        ];
        for b in &bindings {
            provider.create_subscription(b).await;
        }

        let mut coord = coordinator(provider.clone(), store.clone());
        assert_eq!(coord.start(&bindings).unwrap(), 2);

        let payload = br#"{"user_id":"u1","action":"login","ip":"i","browser":"b","timestamp":"2024-01-01T00:00:00Z"}"#;
        provider
            .publish("topic-audit", Bytes::from_static(payload))
            .await
            .unwrap();

        for _ in 0..200 {
            let done = coord
                .running()
                .values()
                .all(|s| s.snapshot().received == 1);
            if done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        coord.shutdown();
        assert!(coord.cancellation_token().is_cancelled());
        let reports = tokio::time::timeout(Duration::from_secs(5), coord.wait())
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.is_ok()));
        let stored: u64 = reports.iter().map(|r| r.stats.stored).sum();
        let duplicates: u64 = reports.iter().map(|r| r.stats.duplicates).sum();
        assert_eq!(stored, 1);
        assert_eq!(duplicates, 1);
        assert_eq!(store.len().await, 1);
    }
}
