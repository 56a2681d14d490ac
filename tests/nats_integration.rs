//! NATS JetStream integration tests
//!
//! These tests require a running NATS server with JetStream enabled:
//!   nats-server -js
//!
//! Tests are skipped automatically if NATS is not available.

use a3s_audit_log::config::ConsumerConfig;
use a3s_audit_log::provider::nats::{NatsConfig, NatsProvider, StorageType};
use a3s_audit_log::{
    codec, Event, EventProvider, IdempotentWriter, LifecycleCoordinator, MemoryDlqHandler,
    MemoryLogStore, MessageHandler, TopicSubscription,
};
use std::sync::Arc;
use std::time::Duration;

/// Try to connect to NATS. Returns None if server is unavailable.
async fn try_nats_provider(suffix: &str) -> Option<NatsProvider> {
    let config = NatsConfig {
        url: "nats://127.0.0.1:4222".to_string(),
        stream_name: format!("TEST_AUDIT_{}", suffix.to_uppercase()),
        subject_prefix: format!("test.audit.{}", suffix),
        storage: StorageType::Memory,
        max_age_secs: 60,
        connect_timeout_secs: 2,
        ack_wait_secs: 5,
        ..Default::default()
    };

    match NatsProvider::connect(config).await {
        Ok(provider) => Some(provider),
        Err(_) => {
            eprintln!("NATS not available, skipping integration test");
            None
        }
    }
}

macro_rules! nats_provider {
    ($suffix:expr) => {
        match try_nats_provider($suffix).await {
            Some(p) => p,
            None => return,
        }
    };
}

fn login(ts: &str) -> Event {
    Event::new("u1", "login", "10.0.0.1", "firefox", ts)
}

#[tokio::test]
async fn test_nats_publish_subscribe_ack() {
    let provider = nats_provider!("pubsub");
    let binding = TopicSubscription::new("topic-audit", "pubsub-sub");

    let mut sub = provider.subscribe(&binding).await.unwrap();
    let payload = codec::encode(&login("2024-01-01T00:00:00Z")).unwrap();
    let seq = provider
        .publish("topic-audit", payload.clone().into())
        .await
        .unwrap();
    assert!(seq > 0);

    let msg = tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(&msg.payload[..], &payload[..]);
    assert_eq!(msg.delivery_attempt, 1);
    msg.ack().await.unwrap();

    assert!(provider.health().await.unwrap());
}

#[tokio::test]
async fn test_nats_nak_redelivers() {
    let provider = nats_provider!("nak");
    let binding = TopicSubscription::new("topic-audit", "nak-sub");

    let mut sub = provider.subscribe(&binding).await.unwrap();
    provider
        .publish("topic-audit", codec::encode(&login("2024-01-01T00:00:01Z")).unwrap().into())
        .await
        .unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let sequence = first.sequence;
    first.nak(None).await.unwrap();

    let second = tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(second.sequence, sequence);
    assert_eq!(second.delivery_attempt, 2);
    second.ack().await.unwrap();
}

#[tokio::test]
async fn test_nats_pipeline_stores_and_deduplicates() {
    let provider = Arc::new(nats_provider!("pipeline"));
    let store = Arc::new(MemoryLogStore::new());
    let binding = TopicSubscription::new("topic-audit", "pipeline-sub");

    let handler = MessageHandler::new(
        IdempotentWriter::new(store.clone()),
        Arc::new(MemoryDlqHandler::default()),
        None,
    );
    let mut coordinator =
        LifecycleCoordinator::new(provider.clone(), handler, ConsumerConfig::default());
    coordinator.start(&[binding.clone()]).unwrap();

    let event = login("2024-01-01T00:00:02Z");
    for _ in 0..2 {
        provider
            .publish("topic-audit", codec::encode(&event).unwrap().into())
            .await
            .unwrap();
    }
    provider
        .publish("topic-audit", bytes::Bytes::from_static(b"garbage"))
        .await
        .unwrap();

    let stats = coordinator.running()[&binding].clone();
    for _ in 0..500 {
        if stats.snapshot().received >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    coordinator.shutdown();
    let reports = coordinator.wait().await;
    assert_eq!(reports[0].stats.stored, 1);
    assert_eq!(reports[0].stats.duplicates, 1);
    assert_eq!(reports[0].stats.dropped, 1);
    assert_eq!(store.len().await, 1);
}
