//! NATS JetStream configuration

use serde::{Deserialize, Serialize};

/// Stream storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    File,
    Memory,
}

/// NATS JetStream provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// Server URL (e.g., `nats://127.0.0.1:4222`)
    pub url: String,

    /// Optional auth token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// JetStream stream holding every audit topic
    pub stream_name: String,

    /// Prefix mapping topics onto subjects: `<prefix>.<topic>`
    pub subject_prefix: String,

    pub storage: StorageType,

    /// Message retention in seconds, 0 keeps messages until limits apply
    pub max_age_secs: u64,

    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,

    /// Redelivery timeout for an unacknowledged message
    pub ack_wait_secs: u64,

    /// Outstanding unacknowledged messages per consumer, 0 uses the server default
    pub max_ack_pending: i64,

    /// Delivery attempts before the broker gives up, 0 means unlimited
    pub max_deliver: i64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            token: None,
            stream_name: "AUDIT_EVENTS".to_string(),
            subject_prefix: "audit".to_string(),
            storage: StorageType::File,
            max_age_secs: 0,
            connect_timeout_secs: 5,
            request_timeout_secs: 10,
            ack_wait_secs: 30,
            max_ack_pending: 0,
            max_deliver: 0,
        }
    }
}

impl NatsConfig {
    /// Subject a topic is published on
    pub fn subject_for(&self, topic: &str) -> String {
        format!("{}.{}", self.subject_prefix, topic)
    }

    /// Subjects the stream captures
    pub fn stream_subjects(&self) -> Vec<String> {
        vec![format!("{}.>", self.subject_prefix)]
    }

    /// Durable consumer name for a subscription
    ///
    /// Consumer names may not contain `.`, `*`, `>` or whitespace.
    pub fn consumer_name(&self, subscription: &str) -> String {
        subscription
            .chars()
            .map(|c| match c {
                '.' | '*' | '>' => '-',
                c if c.is_whitespace() => '-',
                c => c,
            })
            .collect()
    }
}
