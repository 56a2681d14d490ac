//! Idempotent writer: validated event → durable log record
//!
//! Every record gets a fresh UUID, but redelivered copies of the same event
//! collapse onto the first record through the de-duplication key.

use crate::error::{AuditLogError, Result};
use crate::storage::{InsertOutcome, LogStore};
use crate::types::{Event, NewLogRecord};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

/// Result of storing one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new record was created
    Inserted(Uuid),
    /// The event was already stored under this record
    Duplicate(Uuid),
}

impl WriteOutcome {
    pub fn record_id(&self) -> Uuid {
        match self {
            WriteOutcome::Inserted(id) | WriteOutcome::Duplicate(id) => *id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, WriteOutcome::Duplicate(_))
    }
}

/// Writer over a shared log store
#[derive(Clone)]
pub struct IdempotentWriter {
    store: Arc<dyn LogStore>,
}

impl IdempotentWriter {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    /// Persist an event
    ///
    /// `ConnectionLost` leaves the decision to retry with the caller;
    /// `ConstraintViolation` means the event can never be stored.
    pub async fn store(&self, event: &Event) -> Result<WriteOutcome> {
        let record = build_record(event)?;
        let id = record.id;

        match self.store.insert(&record).await? {
            InsertOutcome::Inserted => {
                tracing::debug!(record_id = %id, user_id = %record.user_id, "Log record stored");
                Ok(WriteOutcome::Inserted(id))
            }
            InsertOutcome::Duplicate { existing_id } => {
                tracing::debug!(
                    record_id = %existing_id,
                    user_id = %record.user_id,
                    "Duplicate event, keeping existing record"
                );
                Ok(WriteOutcome::Duplicate(existing_id))
            }
        }
    }
}

fn build_record(event: &Event) -> Result<NewLogRecord> {
    if event.user_id.trim().is_empty() {
        return Err(AuditLogError::ConstraintViolation(
            "user_id must not be empty".to_string(),
        ));
    }

    let timestamp = parse_timestamp(&event.timestamp)?;

    Ok(NewLogRecord {
        id: Uuid::new_v4(),
        user_id: event.user_id.clone(),
        action: event.action.clone(),
        ip: event.ip.clone(),
        client: event.browser.clone(),
        timestamp,
        dedup_key: dedup_key(event, &timestamp),
    })
}

/// Parse a producer timestamp into a UTC instant
///
/// Accepts RFC 3339 with any offset, or a naive `YYYY-MM-DD HH:MM:SS[.f]`
/// (space or `T` separated) which is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(AuditLogError::ConstraintViolation(format!(
        "unparseable timestamp '{}'",
        raw
    )))
}

/// De-duplication key of an event
///
/// Hex SHA-256 over the length-prefixed identifying fields, with the
/// timestamp normalized so equivalent spellings of one instant collide.
pub fn dedup_key(event: &Event, timestamp: &DateTime<Utc>) -> String {
    let normalized = timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);

    let mut hasher = Sha256::new();
    for field in [
        event.user_id.as_str(),
        event.action.as_str(),
        event.ip.as_str(),
        event.browser.as_str(),
        normalized.as_str(),
    ] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }

    let digest = hasher.finalize();
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryLogStore;
    use crate::types::LogRecord;
    use async_trait::async_trait;

    fn event(ts: &str) -> Event {
        Event::new("u1", "login", "10.0.0.1", "firefox", ts)
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = parse_timestamp("2024-01-01T10:00:00Z").unwrap();
        assert_eq!(parse_timestamp("2024-01-01 10:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-01T10:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-01T12:00:00+02:00").unwrap(), expected);

        let frac = parse_timestamp("2024-01-01 10:00:00.250").unwrap();
        assert_eq!(frac.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        for raw in ["", "yesterday", "2024-13-01 00:00:00", "1700000000"] {
            assert!(matches!(
                parse_timestamp(raw),
                Err(AuditLogError::ConstraintViolation(_))
            ));
        }
    }

    #[test]
    fn test_dedup_key_normalizes_timestamp() {
        let a = event("2024-01-01T10:00:00Z");
        let b = event("2024-01-01T12:00:00.000+02:00");
        let ta = parse_timestamp(&a.timestamp).unwrap();
        let tb = parse_timestamp(&b.timestamp).unwrap();
        assert_eq!(dedup_key(&a, &ta), dedup_key(&b, &tb));
        assert_eq!(dedup_key(&a, &ta).len(), 64);
    }

    #[test]
    fn test_dedup_key_is_lowercase_hex_digest() {
        let e = event("2024-01-01T10:00:00Z");
        let ts = parse_timestamp(&e.timestamp).unwrap();
        assert_eq!(
            dedup_key(&e, &ts),
            "bb7115cb2078629022cab0694e7afdee392f2ac72644bb1ca4d636bccbd20fdd"
        );
    }

    #[test]
    fn test_dedup_key_separates_fields() {
        let ts = parse_timestamp("2024-01-01T10:00:00Z").unwrap();
        let a = Event::new("ab", "c", "ip", "b", "x");
        let b = Event::new("a", "bc", "ip", "b", "x");
        assert_ne!(dedup_key(&a, &ts), dedup_key(&b, &ts));

        let other_action = Event::new("ab", "logout", "ip", "b", "x");
        assert_ne!(dedup_key(&a, &ts), dedup_key(&other_action, &ts));
    }

    #[tokio::test]
    async fn test_store_is_idempotent() {
        let store = Arc::new(MemoryLogStore::new());
        let writer = IdempotentWriter::new(store.clone());

        let first = writer.store(&event("2024-01-01T10:00:00Z")).await.unwrap();
        let second = writer.store(&event("2024-01-01 10:00:00")).await.unwrap();

        assert!(matches!(first, WriteOutcome::Inserted(_)));
        assert_eq!(second, WriteOutcome::Duplicate(first.record_id()));
        assert!(second.is_duplicate());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_store_maps_browser_to_client() {
        let store = Arc::new(MemoryLogStore::new());
        let writer = IdempotentWriter::new(store.clone());
        writer.store(&event("2024-01-01T10:00:00Z")).await.unwrap();

        let records = store.list_by_subject("u1", 10, 0).await.unwrap();
        assert_eq!(records[0].client, "firefox");
    }

    #[tokio::test]
    async fn test_invalid_timestamp_is_constraint_violation() {
        let writer = IdempotentWriter::new(Arc::new(MemoryLogStore::new()));
        let err = writer.store(&event("not-a-time")).await.unwrap_err();
        assert!(matches!(err, AuditLogError::ConstraintViolation(_)));
        assert!(!err.is_retryable_write());
    }

    struct DownStore;

    #[async_trait]
    impl LogStore for DownStore {
        async fn insert(&self, _record: &NewLogRecord) -> Result<InsertOutcome> {
            Err(AuditLogError::ConnectionLost("connection refused".into()))
        }

        async fn list_by_subject(&self, _: &str, _: u64, _: u64) -> Result<Vec<LogRecord>> {
            Ok(vec![])
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    #[tokio::test]
    async fn test_connection_loss_is_retryable() {
        let writer = IdempotentWriter::new(Arc::new(DownStore));
        let err = writer.store(&event("2024-01-01T10:00:00Z")).await.unwrap_err();
        assert!(err.is_retryable_write());
    }
}
