//! Log store trait: the durable storage seam
//!
//! The writer and reader never talk to a database directly; they go
//! through `LogStore` so the pipeline can run against Postgres in
//! production and against memory in tests.

use crate::error::Result;
use crate::types::{LogRecord, NewLogRecord};
use async_trait::async_trait;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

/// Result of an insert attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was written
    Inserted,

    /// A record with the same de-duplication key already exists
    Duplicate { existing_id: Uuid },
}

/// Core trait for durable record storage
///
/// Implementations must enforce uniqueness of `dedup_key` atomically with
/// the insert so concurrent redeliveries cannot both succeed.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Insert a record, or report the record already holding its key
    async fn insert(&self, record: &NewLogRecord) -> Result<InsertOutcome>;

    /// Fetch a subject's records ordered by `(timestamp, sequence)` ascending
    async fn list_by_subject(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<LogRecord>>;

    /// Health check: returns true if the store is reachable
    async fn health(&self) -> Result<bool> {
        Ok(true)
    }

    /// Backend name (e.g., "postgres", "memory")
    fn name(&self) -> &str;
}
