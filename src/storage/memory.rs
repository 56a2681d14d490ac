//! In-memory log store for development and testing

use super::{InsertOutcome, LogStore};
use crate::error::Result;
use crate::types::{LogRecord, NewLogRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory store
///
/// Inserts are serialized by a single write lock, which gives the same
/// uniqueness guarantee on `dedup_key` as a database unique index.
/// Records are lost on drop.
#[derive(Default)]
pub struct MemoryLogStore {
    inner: RwLock<MemoryLogs>,
}

#[derive(Default)]
struct MemoryLogs {
    records: Vec<LogRecord>,
    by_key: HashMap<String, Uuid>,
    next_sequence: i64,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all subjects
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Record id stored under a de-duplication key
    pub async fn id_for_key(&self, dedup_key: &str) -> Option<Uuid> {
        self.inner.read().await.by_key.get(dedup_key).copied()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn insert(&self, record: &NewLogRecord) -> Result<InsertOutcome> {
        let mut logs = self.inner.write().await;

        if let Some(existing_id) = logs.by_key.get(&record.dedup_key) {
            return Ok(InsertOutcome::Duplicate {
                existing_id: *existing_id,
            });
        }

        logs.next_sequence += 1;
        let sequence = logs.next_sequence;
        logs.by_key.insert(record.dedup_key.clone(), record.id);
        logs.records.push(record.clone().into_record(sequence));

        Ok(InsertOutcome::Inserted)
    }

    async fn list_by_subject(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<LogRecord>> {
        let logs = self.inner.read().await;

        let mut matching: Vec<&LogRecord> = logs
            .records
            .iter()
            .filter(|r| r.user_id == user_id)
            .collect();
        matching.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.sequence.cmp(&b.sequence))
        });

        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        Ok(matching
            .into_iter()
            .skip(offset)
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
