//! NATS JetStream client: connect, publish, durable subscribe

use super::config::{NatsConfig, StorageType};
use super::subscriber::NatsSubscription;
use crate::error::{AuditLogError, Result};
use crate::types::TopicSubscription;
use async_nats::connection::State;
use async_nats::jetstream;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// NATS JetStream client
///
/// Owns the connection and the stream that captures every audit topic.
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    stream: Mutex<jetstream::stream::Stream>,
    config: Arc<NatsConfig>,
}

impl NatsClient {
    /// Connect to NATS and initialize the JetStream stream
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let connect_opts = build_connect_options(&config);

        let client = connect_opts
            .connect(&config.url)
            .await
            .map_err(|e| AuditLogError::Connection(format!("{}: {}", config.url, e)))?;

        tracing::info!(url = %config.url, "Connected to NATS");

        let jetstream = jetstream::new(client.clone());
        let stream = ensure_stream(&jetstream, &config).await?;

        Ok(Self {
            client,
            jetstream,
            stream: Mutex::new(stream),
            config: Arc::new(config),
        })
    }

    /// Publish a raw payload to a topic, returning the stream sequence
    pub async fn publish(&self, topic: &str, payload: Bytes) -> Result<u64> {
        let subject = self.config.subject_for(topic);

        let ack_fut = self
            .jetstream
            .publish(subject.clone(), payload)
            .await
            .map_err(|e| AuditLogError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        let ack = tokio::time::timeout(
            Duration::from_secs(self.config.request_timeout_secs),
            ack_fut,
        )
        .await
        .map_err(|_| {
            AuditLogError::Timeout(format!(
                "Publish ack timed out after {}s for '{}'",
                self.config.request_timeout_secs, subject
            ))
        })?
        .map_err(|e| AuditLogError::Publish {
            topic: topic.to_string(),
            reason: format!("ack failed: {}", e),
        })?;

        tracing::debug!(subject = %subject, sequence = ack.sequence, "Event published");

        Ok(ack.sequence)
    }

    /// Create (or resume) the durable pull consumer for a subscription
    ///
    /// Failing to create the consumer while the connection is up means the
    /// server rejected the request, which retrying will not fix. Failing
    /// while disconnected is reported as a connection error.
    pub async fn subscribe_durable(&self, binding: &TopicSubscription) -> Result<NatsSubscription> {
        let consumer_name = self.config.consumer_name(&binding.subscription);
        let filter_subject = self.config.subject_for(&binding.topic);
        let config = build_consumer_config(&self.config, &consumer_name, &filter_subject);

        let consumer = self
            .stream
            .lock()
            .await
            .get_or_create_consumer(&consumer_name, config)
            .await
            .map_err(|e| self.consumer_error(binding, e.to_string()))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| self.consumer_error(binding, e.to_string()))?;

        tracing::info!(
            consumer = %consumer_name,
            filter = %filter_subject,
            ack_wait_secs = self.config.ack_wait_secs,
            max_deliver = self.config.max_deliver,
            "Durable subscription created"
        );

        Ok(NatsSubscription::new(messages, consumer_name))
    }

    /// Whether the underlying connection is currently up
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == State::Connected
    }

    /// Get the configuration
    pub fn config(&self) -> &NatsConfig {
        &self.config
    }

    fn consumer_error(&self, binding: &TopicSubscription, reason: String) -> AuditLogError {
        if self.is_connected() {
            AuditLogError::Subscribe {
                topic: binding.topic.clone(),
                subscription: binding.subscription.clone(),
                reason,
            }
        } else {
            AuditLogError::Connection(format!("{}: {}", binding, reason))
        }
    }
}

/// Build the durable pull consumer config for one subscription
fn build_consumer_config(
    config: &NatsConfig,
    consumer_name: &str,
    filter_subject: &str,
) -> jetstream::consumer::pull::Config {
    jetstream::consumer::pull::Config {
        durable_name: Some(consumer_name.to_string()),
        filter_subject: filter_subject.to_string(),
        ack_policy: jetstream::consumer::AckPolicy::Explicit,
        deliver_policy: jetstream::consumer::DeliverPolicy::All,
        ack_wait: Duration::from_secs(config.ack_wait_secs),
        max_deliver: config.max_deliver,
        max_ack_pending: config.max_ack_pending,
        ..Default::default()
    }
}

/// Build NATS connect options from config
fn build_connect_options(config: &NatsConfig) -> async_nats::ConnectOptions {
    let mut opts = async_nats::ConnectOptions::new()
        .connection_timeout(Duration::from_secs(config.connect_timeout_secs))
        .request_timeout(Some(Duration::from_secs(config.request_timeout_secs)));

    if let Some(ref token) = config.token {
        opts = opts.token(token.clone());
    }

    opts
}

/// Ensure the JetStream stream exists with the configured limits
async fn ensure_stream(
    js: &jetstream::Context,
    config: &NatsConfig,
) -> Result<jetstream::stream::Stream> {
    let storage = match config.storage {
        StorageType::File => jetstream::stream::StorageType::File,
        StorageType::Memory => jetstream::stream::StorageType::Memory,
    };

    let stream_config = jetstream::stream::Config {
        name: config.stream_name.clone(),
        subjects: config.stream_subjects(),
        storage,
        max_age: Duration::from_secs(config.max_age_secs),
        retention: jetstream::stream::RetentionPolicy::Limits,
        ..Default::default()
    };

    let stream = js.get_or_create_stream(stream_config).await.map_err(|e| {
        AuditLogError::Connection(format!(
            "Failed to create/get stream '{}': {}",
            config.stream_name, e
        ))
    })?;

    tracing::info!(
        stream = %config.stream_name,
        subjects = ?config.stream_subjects(),
        "JetStream stream ready"
    );

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_config_is_durable_and_explicit() {
        let config = NatsConfig {
            max_deliver: 5,
            ack_wait_secs: 12,
            ..Default::default()
        };
        let consumer = build_consumer_config(&config, "topic-audit-sub", "audit.topic-audit");
        assert_eq!(consumer.durable_name.as_deref(), Some("topic-audit-sub"));
        assert_eq!(consumer.filter_subject, "audit.topic-audit");
        assert_eq!(consumer.ack_policy, jetstream::consumer::AckPolicy::Explicit);
        assert_eq!(consumer.ack_wait, Duration::from_secs(12));
        assert_eq!(consumer.max_deliver, 5);
    }
}
