//! NATS JetStream event provider
//!
//! Topics map onto subjects of a single JetStream stream and each
//! subscription becomes a durable pull consumer with explicit acks, so a
//! restarted service resumes from its last acknowledged message.

mod client;
mod config;
mod subscriber;

pub use client::NatsClient;
pub use config::{NatsConfig, StorageType};
pub use subscriber::NatsSubscription;

use crate::error::Result;
use crate::provider::{EventProvider, Subscription};
use crate::types::TopicSubscription;
use async_trait::async_trait;
use bytes::Bytes;

/// NATS JetStream event provider
pub struct NatsProvider {
    client: NatsClient,
}

impl NatsProvider {
    /// Connect to NATS and initialize the JetStream stream
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let client = NatsClient::connect(config).await?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &NatsClient {
        &self.client
    }
}

#[async_trait]
impl EventProvider for NatsProvider {
    async fn subscribe(&self, binding: &TopicSubscription) -> Result<Box<dyn Subscription>> {
        let sub = self.client.subscribe_durable(binding).await?;
        Ok(Box::new(sub))
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<u64> {
        self.client.publish(topic, payload).await
    }

    async fn health(&self) -> Result<bool> {
        Ok(self.client.is_connected())
    }

    fn name(&self) -> &str {
        "nats"
    }
}
