//! Core types for the audit log pipeline
//!
//! Field names follow the wire format used by producers and by the
//! `/logs` endpoint (snake_case), not Rust-side conventions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An audit event as received from the broker
///
/// Untrusted: every field is producer-supplied and may be duplicated
/// across deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Subject the event belongs to
    pub user_id: String,

    /// Action label (e.g., "login", "vault.read")
    pub action: String,

    /// Origin network address
    pub ip: String,

    /// Client/agent descriptor
    pub browser: String,

    /// Producer-supplied timestamp, parsed by the writer
    pub timestamp: String,
}

impl Event {
    /// Create an event from its wire fields
    pub fn new(
        user_id: impl Into<String>,
        action: impl Into<String>,
        ip: impl Into<String>,
        browser: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            action: action.into(),
            ip: ip.into(),
            browser: browser.into(),
            timestamp: timestamp.into(),
        }
    }
}

/// A persisted audit record
///
/// Immutable once written. `sequence` is assigned by the store and only
/// used to break timestamp ties, so it never leaves the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Writer-assigned record identifier
    pub id: Uuid,

    /// Owning subject
    pub user_id: String,

    pub action: String,

    pub ip: String,

    /// Client descriptor (the event's `browser` field)
    pub client: String,

    pub timestamp: DateTime<Utc>,

    /// Storage-assigned insertion order
    #[serde(skip)]
    pub sequence: i64,
}

/// A record about to be inserted, carrying its de-duplication key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogRecord {
    pub id: Uuid,
    pub user_id: String,
    pub action: String,
    pub ip: String,
    pub client: String,
    pub timestamp: DateTime<Utc>,
    pub dedup_key: String,
}

impl NewLogRecord {
    /// Materialize the stored form once the store has assigned a sequence
    pub fn into_record(self, sequence: i64) -> LogRecord {
        LogRecord {
            id: self.id,
            user_id: self.user_id,
            action: self.action,
            ip: self.ip,
            client: self.client,
            timestamp: self.timestamp,
            sequence,
        }
    }
}

/// A (topic, subscription) pair consumed by one pull loop
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicSubscription {
    /// Topic the producers publish to
    pub topic: String,

    /// Independently-acknowledged delivery stream on that topic
    pub subscription: String,
}

impl TopicSubscription {
    pub fn new(topic: impl Into<String>, subscription: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            subscription: subscription.into(),
        }
    }
}

impl std::fmt::Display for TopicSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.topic, self.subscription)
    }
}
