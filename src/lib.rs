//! # a3s-audit-log
//!
//! Audit event ingestion for the A3S ecosystem: consume events from a
//! pub/sub broker, persist them exactly once per logical event, and serve
//! them back to their owners page by page.
//!
//! ## Overview
//!
//! Producers publish small JSON events (`user_id`, `action`, `ip`,
//! `browser`, `timestamp`). One consumer loop per configured subscription
//! pulls them, decodes them, writes them through an idempotent writer and
//! only then acknowledges. Redelivered copies collapse onto the record that
//! was already stored.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use a3s_audit_log::{Event, IdempotentWriter, PageRequest, PaginatedReader, RequestContext};
//! use a3s_audit_log::storage::memory::MemoryLogStore;
//!
//! # async fn example() -> a3s_audit_log::Result<()> {
//! let store = Arc::new(MemoryLogStore::new());
//! let writer = IdempotentWriter::new(store.clone());
//!
//! let event = Event::new("u1", "login", "10.0.0.1", "firefox", "2024-01-01T10:00:00Z");
//! let first = writer.store(&event).await?;
//! let again = writer.store(&event).await?;
//! assert_eq!(first.record_id(), again.record_id());
//!
//! let reader = PaginatedReader::new(store);
//! let ctx = RequestContext::new("u1")?;
//! let page = reader.list_by_subject(&ctx, PageRequest::default()).await?;
//! assert_eq!(page.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Providers
//!
//! - **memory**: in-process broker for tests and single-process use
//! - **nats**: NATS JetStream durable pull consumers
//!
//! ## Architecture
//!
//! - **EventProvider** / **Subscription**: broker seam, raw payloads with ack/nak
//! - **LogStore**: storage seam (Postgres, memory)
//! - **SubscriptionConsumer**: decode → store → acknowledge loop
//! - **LifecycleCoordinator**: runs all loops under one cancellation token
//! - **PaginatedReader**: ordered pages scoped to a verified subject

pub mod bootstrap;
pub mod cli;
pub mod codec;
pub mod config;
pub mod consumer;
pub mod coordinator;
pub mod dlq;
pub mod error;
pub mod identity;
pub mod provider;
pub mod reader;
pub mod server;
pub mod storage;
pub mod types;
pub mod writer;

// Re-export core types
pub use config::AuditLogConfig;
pub use consumer::{
    ConsumerReport, ConsumerStatsSnapshot, Disposition, MessageHandler, SubscriptionConsumer,
};
pub use coordinator::LifecycleCoordinator;
pub use dlq::{DeadLetter, DlqHandler, MemoryDlqHandler};
pub use error::{AuditLogError, Result};
pub use identity::{IdentityVerifier, RemoteIdentityVerifier, StaticTokenVerifier};
pub use provider::{EventProvider, PendingMessage, Subscription};
pub use reader::{PageRequest, PaginatedReader, RequestContext};
pub use storage::{InsertOutcome, LogStore};
pub use types::{Event, LogRecord, NewLogRecord, TopicSubscription};
pub use writer::{IdempotentWriter, WriteOutcome};

// Re-export backends for convenience
pub use provider::memory::MemoryProvider;
pub use provider::nats::{NatsClient, NatsConfig, NatsProvider, NatsSubscription, StorageType};
pub use storage::memory::MemoryLogStore;
pub use storage::postgres::PgLogStore;
